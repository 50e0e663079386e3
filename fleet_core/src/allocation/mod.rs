//! Resolution of a hosted server's reachable network endpoint.
//!
//! Resolution never fails: when the hosting panel cannot answer, bots are
//! pointed at [`ServerEndpoint::fallback`] and simply fail to connect later,
//! which the fleet manager handles like any other connect failure.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod panel;

pub use panel::{PanelAllocationResolver, PanelConfig, ResolveError};

/// Host used when no allocation can be resolved
pub const FALLBACK_HOST: &str = "localhost";

/// Port used when no allocation can be resolved
pub const FALLBACK_PORT: u16 = 25565;

/// Network endpoint bots connect to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerEndpoint {
    pub host: String,
    pub port: u16,
}

impl ServerEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// `localhost:25565`
    pub fn fallback() -> Self {
        Self::new(FALLBACK_HOST, FALLBACK_PORT)
    }
}

impl std::fmt::Display for ServerEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Looks up where a hosted server can be reached
#[async_trait]
pub trait AllocationResolver: Send + Sync {
    /// Endpoint for `server_id`; implementations degrade to a fallback
    /// instead of failing
    async fn resolve(&self, server_id: &str) -> ServerEndpoint;
}

/// Resolver that always answers with one endpoint
#[derive(Debug, Clone)]
pub struct StaticResolver {
    endpoint: ServerEndpoint,
}

impl StaticResolver {
    pub fn new(endpoint: ServerEndpoint) -> Self {
        Self { endpoint }
    }
}

impl Default for StaticResolver {
    fn default() -> Self {
        Self::new(ServerEndpoint::fallback())
    }
}

#[async_trait]
impl AllocationResolver for StaticResolver {
    async fn resolve(&self, _server_id: &str) -> ServerEndpoint {
        self.endpoint.clone()
    }
}
