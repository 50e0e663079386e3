//! Bot fleet orchestrator server.
//!
//! Serves the fleet HTTP API over a `FleetManager` backed by PostgreSQL when
//! a database is configured, or by an in-memory store otherwise.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Error;
use fleet_core::{
    FleetManager,
    allocation::PanelAllocationResolver,
    db::{BotRepository, Database, InMemoryBotRepository},
    driver::SimulatedDriver,
};
use fleet_server::{api, config::ServerConfig, logging, metrics};
use pico_args::Arguments;
use tracing::{error, info, warn};

const HELP: &str = "\
Run the bot fleet orchestrator

USAGE:
  fleet_server [OPTIONS]

OPTIONS:
  --bind       IP:PORT     Server socket bind address  [default: env SERVER_BIND or 127.0.0.1:8080]
  --db-url     URL         Database connection string  [default: env DATABASE_URL, in-memory store when unset]

FLAGS:
  -h, --help               Print help information

ENVIRONMENT:
  SERVER_BIND              Server bind address (e.g., 0.0.0.0:8080)
  METRICS_BIND             Prometheus scrape address (disabled when unset)
  DATABASE_URL             PostgreSQL connection string
  PANEL_URL                Hosting panel base URL
  PANEL_API_KEY            Hosting panel client API key
  FLEET_SPAWN_DELAY_MS     Delay between bot connects  [default: 5000]
  FLEET_MAX_BOTS           Largest accepted fleet  [default: 100]
  RUST_LOG                 Log filter  [default: info]
";

struct Args {
    bind: Option<SocketAddr>,
    database_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let args = Args {
        bind: pargs.opt_value_from_str("--bind")?,
        database_url: pargs.opt_value_from_str("--db-url")?,
    };

    logging::init();

    let config = ServerConfig::from_env(args.bind, args.database_url)?;
    config.validate()?;

    if let Some(metrics_bind) = config.metrics_bind {
        metrics::init_metrics(metrics_bind).map_err(|e| anyhow::anyhow!(e))?;
        info!("Prometheus metrics at http://{}/metrics", metrics_bind);
    }

    // Store
    let (database, repository): (Option<Database>, Arc<dyn BotRepository>) =
        match &config.database {
            Some(db_config) => {
                info!("Connecting to database");
                let db = Database::new(db_config)
                    .await
                    .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;
                info!("Database connected successfully");
                let repository: Arc<dyn BotRepository> = Arc::new(db.bot_repository());
                (Some(db), repository)
            }
            None => {
                warn!("DATABASE_URL not set, bot records are kept in memory");
                let repository: Arc<dyn BotRepository> = Arc::new(InMemoryBotRepository::new());
                (None, repository)
            }
        };

    if config.panel.is_none() {
        warn!("Hosting panel not configured, every server resolves to the fallback endpoint");
    }
    let resolver = Arc::new(PanelAllocationResolver::new(config.panel.clone()));

    info!("Using the simulated game client driver");
    let driver = Arc::new(SimulatedDriver::new());

    let fleet = FleetManager::new(config.fleet.clone(), repository, resolver, driver);
    if config.metrics_bind.is_some() {
        tokio::spawn(metrics::track_live_bots(fleet.watch_live_count()));
    }

    // Bots left online by a previous run have no live connection
    match fleet.reconcile_orphans().await {
        Ok(0) => {}
        Ok(count) => info!("Marked {} orphaned bot(s) offline", count),
        Err(e) => error!("Failed to reconcile bot records: {}", e),
    }

    let app = api::create_router(api::AppState::new(fleet.clone(), database.clone()));

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", config.bind, e))?;

    info!(
        "Server is running at http://{}. Press Ctrl+C to stop.",
        config.bind
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    info!("Shutting down server...");
    let stopped = fleet.shutdown().await;
    info!("Disconnected {} bot(s)", stopped);

    if let Some(db) = database {
        db.close().await;
    }

    Ok(())
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}
