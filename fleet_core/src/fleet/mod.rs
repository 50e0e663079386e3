//! Fleet orchestration: batch spawning, control fan-out and teardown.

pub mod config;
pub mod errors;
pub mod manager;
pub mod registry;

pub use config::{FleetConfig, MAX_FLEET_SIZE};
pub use errors::{FleetError, FleetResult};
pub use manager::{FleetControlReport, FleetCreation, FleetManager, FleetPlan, FleetRequest};
pub use registry::LiveRegistry;
