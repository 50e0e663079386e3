//! Hosting panel allocation lookup.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use super::{AllocationResolver, ServerEndpoint};

/// Hosting panel connection settings
#[derive(Debug, Clone)]
pub struct PanelConfig {
    /// Panel base URL, e.g. `https://panel.example.com`
    pub base_url: String,

    /// Client API key sent as a bearer token
    pub api_key: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl PanelConfig {
    /// Read `PANEL_URL`, `PANEL_API_KEY` and `PANEL_TIMEOUT_SECS` (default: 5)
    ///
    /// Returns `None` unless both the URL and the key are set.
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("PANEL_URL").ok().filter(|v| !v.is_empty())?;
        let api_key = std::env::var("PANEL_API_KEY").ok().filter(|v| !v.is_empty())?;
        let timeout_secs = std::env::var("PANEL_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5);

        Some(Self {
            base_url,
            api_key,
            timeout_secs,
        })
    }
}

/// Reasons a panel lookup did not produce an endpoint
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Hosting panel is not configured")]
    NotConfigured,

    #[error("Invalid server id: {0}")]
    InvalidServerId(String),

    #[error("Panel request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Panel answered with status {0}")]
    Status(u16),

    #[error("Server {0} has no allocations")]
    NoAllocations(String),
}

/// One network allocation as reported by the panel
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Allocation {
    pub ip: String,
    #[serde(default)]
    pub ip_alias: Option<String>,
    pub port: u16,
    #[serde(default)]
    pub is_default: bool,
}

impl Allocation {
    fn endpoint(&self) -> ServerEndpoint {
        let host = self
            .ip_alias
            .as_deref()
            .filter(|alias| !alias.is_empty())
            .unwrap_or(&self.ip);
        ServerEndpoint::new(host, self.port)
    }
}

#[derive(Debug, Deserialize)]
struct AllocationList {
    data: Vec<AllocationObject>,
}

#[derive(Debug, Deserialize)]
struct AllocationObject {
    attributes: Allocation,
}

/// Default allocation if one is flagged, else the first
pub fn pick_allocation(allocations: &[Allocation]) -> Option<ServerEndpoint> {
    allocations
        .iter()
        .find(|a| a.is_default)
        .or_else(|| allocations.first())
        .map(Allocation::endpoint)
}

/// Resolver backed by the hosting panel's client API
pub struct PanelAllocationResolver {
    config: Option<PanelConfig>,
    client: reqwest::Client,
}

impl PanelAllocationResolver {
    /// Create a resolver; `None` makes every lookup return the fallback
    pub fn new(config: Option<PanelConfig>) -> Self {
        let timeout = config
            .as_ref()
            .map_or(Duration::from_secs(5), |c| Duration::from_secs(c.timeout_secs));
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();

        Self { config, client }
    }

    /// Query the panel without falling back
    pub async fn fetch(&self, server_id: &str) -> Result<ServerEndpoint, ResolveError> {
        let config = self.config.as_ref().ok_or(ResolveError::NotConfigured)?;

        if server_id.is_empty() || !server_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(ResolveError::InvalidServerId(server_id.to_string()));
        }

        let url = format!(
            "{}/api/client/servers/{}/network/allocations",
            config.base_url.trim_end_matches('/'),
            server_id
        );

        let response = self
            .client
            .get(&url)
            .bearer_auth(&config.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ResolveError::Status(response.status().as_u16()));
        }

        let list: AllocationList = response.json().await?;
        let allocations: Vec<Allocation> = list.data.into_iter().map(|o| o.attributes).collect();

        pick_allocation(&allocations).ok_or_else(|| ResolveError::NoAllocations(server_id.to_string()))
    }
}

#[async_trait]
impl AllocationResolver for PanelAllocationResolver {
    async fn resolve(&self, server_id: &str) -> ServerEndpoint {
        match self.fetch(server_id).await {
            Ok(endpoint) => {
                log::info!("Resolved server {} to {}", server_id, endpoint);
                endpoint
            }
            Err(e) => {
                let fallback = ServerEndpoint::fallback();
                log::warn!(
                    "Allocation lookup for server {} failed ({}), using {}",
                    server_id,
                    e,
                    fallback
                );
                fallback
            }
        }
    }
}
