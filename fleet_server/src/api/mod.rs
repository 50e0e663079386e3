//! HTTP API for the fleet orchestrator.
//!
//! # Endpoints Overview
//!
//! ```text
//! GET    /health                              - Health check
//! POST   /api/v1/fleets                       - Create fleet (202, spawns in background;
//!                                               ?wait=true answers 201 after the batch)
//! GET    /api/v1/servers/{server_id}/bots     - List bots of a server
//! POST   /api/v1/servers/{server_id}/control  - Control every online bot of a server
//! GET    /api/v1/bots/{bot_id}                - Get one bot
//! POST   /api/v1/bots/{bot_id}/control        - Control one bot
//! DELETE /api/v1/bots/{bot_id}                - Disconnect and mark offline (?purge=true
//!                                               also removes the record)
//! ```
//!
//! Errors are returned as `{"error": "..."}`: 400 for invalid input, 404 for
//! unknown or offline bots, 500 with a sanitized message for store failures.
//!
//! # CORS
//!
//! CORS is configured permissively. In production, put the server behind a
//! proxy restricting origins.

pub mod fleets;
pub mod request_id;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
};
use fleet_core::{FleetManager, db::Database};
use serde_json::json;
use tower_http::cors::CorsLayer;

/// Application state shared across all HTTP handlers.
///
/// Cloned for each request; both fields are cheap handles.
#[derive(Clone)]
pub struct AppState {
    /// Fleet manager owning the live bots
    pub fleet: FleetManager,
    /// PostgreSQL pool when the store is not in memory
    pub database: Option<Database>,
}

impl AppState {
    pub fn new(fleet: FleetManager, database: Option<Database>) -> Self {
        Self { fleet, database }
    }
}

/// Create the complete API router with all endpoints and middleware.
///
/// # Example
///
/// ```rust,no_run
/// # use fleet_server::api::{create_router, AppState};
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// # let state: AppState = unimplemented!();
/// let app = create_router(state);
/// let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
/// axum::serve(listener, app).await?;
/// # Ok(())
/// # }
/// ```
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", create_v1_router())
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// API v1 routes
fn create_v1_router() -> Router<AppState> {
    Router::new()
        .route("/fleets", post(fleets::create_fleet))
        .route("/servers/{server_id}/bots", get(fleets::list_bots))
        .route("/servers/{server_id}/control", post(fleets::control_fleet))
        .route(
            "/bots/{bot_id}",
            get(fleets::get_bot).delete(fleets::delete_bot),
        )
        .route("/bots/{bot_id}/control", post(fleets::control_bot))
}

/// Health check endpoint for monitoring and load balancers.
///
/// Returns `200 OK` when the store is reachable, `503 Service Unavailable`
/// otherwise. The in-memory store is always healthy.
///
/// ```bash
/// curl http://localhost:8080/health
/// # {"status":"healthy","store":"postgres","database":true,"live_bots":12,...}
/// ```
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let (store, db_healthy) = match &state.database {
        Some(database) => ("postgres", database.health_check().await.is_ok()),
        None => ("memory", true),
    };
    let live_bots = state.fleet.live_count().await;

    let status_code = if db_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = json!({
        "status": if db_healthy { "healthy" } else { "unhealthy" },
        "version": env!("CARGO_PKG_VERSION"),
        "store": store,
        "database": db_healthy,
        "live_bots": live_bots,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    (status_code, Json(response))
}
