//! Server configuration management.
//!
//! Consolidates all environment variable reads and provides validated configuration.

use fleet_core::{FleetConfig, allocation::PanelConfig, db::DatabaseConfig};
use std::net::SocketAddr;

/// Complete server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP bind address
    pub bind: SocketAddr,
    /// Prometheus scrape endpoint, disabled when unset
    pub metrics_bind: Option<SocketAddr>,
    /// Database configuration, in-memory store when unset
    pub database: Option<DatabaseConfig>,
    /// Hosting panel, fallback endpoint for every server when unset
    pub panel: Option<PanelConfig>,
    /// Spawn throttling, timers and limits
    pub fleet: FleetConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Arguments
    ///
    /// * `bind_override` - Optional bind address override (from CLI args)
    /// * `database_url_override` - Optional database URL override (from CLI args)
    ///
    /// # Returns
    ///
    /// * `Result<ServerConfig, ConfigError>` - Loaded configuration or error
    ///
    /// # Errors
    ///
    /// Returns error if variables are malformed or the panel is half configured
    pub fn from_env(
        bind_override: Option<SocketAddr>,
        database_url_override: Option<String>,
    ) -> Result<Self, ConfigError> {
        // Bind addresses
        let bind = match bind_override {
            Some(bind) => bind,
            None => parse_addr("SERVER_BIND")?.unwrap_or_else(default_bind),
        };
        let metrics_bind = parse_addr("METRICS_BIND")?;

        // Database configuration (optional)
        let database = database_url_override
            .map(DatabaseConfig::with_url)
            .or_else(DatabaseConfig::from_env);

        // Hosting panel (optional, but URL and key go together)
        let panel = PanelConfig::from_env();
        if panel.is_none() && env_is_set("PANEL_URL") {
            return Err(ConfigError::MissingRequired {
                var: "PANEL_API_KEY".to_string(),
                hint: "Create a client API key in the panel account settings".to_string(),
            });
        }

        Ok(ServerConfig {
            bind,
            metrics_bind,
            database,
            panel,
            fleet: FleetConfig::from_env(),
        })
    }

    /// Validate configuration after loading
    ///
    /// # Returns
    ///
    /// * `Result<(), ConfigError>` - Success or validation error
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Validate fleet limits and timers
        self.fleet.validate().map_err(|e| ConfigError::Invalid {
            var: "FLEET_*".to_string(),
            reason: e.to_string(),
        })?;

        // Validate panel URL
        if let Some(panel) = &self.panel
            && !(panel.base_url.starts_with("http://") || panel.base_url.starts_with("https://"))
        {
            return Err(ConfigError::Invalid {
                var: "PANEL_URL".to_string(),
                reason: "Must start with http:// or https://".to_string(),
            });
        }

        // Validate pool size
        if let Some(database) = &self.database
            && database.min_connections > database.max_connections
        {
            return Err(ConfigError::Invalid {
                var: "DB_MIN_CONNECTIONS".to_string(),
                reason: format!(
                    "Cannot exceed DB_MAX_CONNECTIONS ({})",
                    database.max_connections
                ),
            });
        }

        if self.metrics_bind == Some(self.bind) {
            return Err(ConfigError::Invalid {
                var: "METRICS_BIND".to_string(),
                reason: format!("Must differ from the server bind address ({})", self.bind),
            });
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

/// Default HTTP bind address, 127.0.0.1:8080
fn default_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn env_is_set(key: &str) -> bool {
    std::env::var(key).is_ok_and(|v| !v.is_empty())
}

/// Parse an optional socket address variable
fn parse_addr(key: &str) -> Result<Option<SocketAddr>, ConfigError> {
    match std::env::var(key) {
        Ok(value) if !value.is_empty() => {
            value
                .parse()
                .map(Some)
                .map_err(|_| ConfigError::Invalid {
                    var: key.to_string(),
                    reason: format!("'{value}' is not an IP:PORT address"),
                })
        }
        _ => Ok(None),
    }
}
