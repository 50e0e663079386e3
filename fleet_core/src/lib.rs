//! # Fleet Core
//!
//! Orchestration of simulated players ("bots") on hosted game servers.
//!
//! A caller asks for a fleet of N bots on a server. The crate resolves the
//! server's network endpoint, connects the bots one at a time with a fixed
//! spawn delay, keeps each bot's persisted record in step with its live
//! connection, drives randomized idle movement for bots with AI enabled and
//! disconnects bots whose time-to-live elapses.
//!
//! ## Architecture
//!
//! - **Fleet manager** ([`fleet`]): validates requests, throttles spawning,
//!   owns the registry of live bots and fans out operator controls.
//! - **Bot instance** ([`bot::instance`]): one actor task per bot consuming
//!   its driver events and control inbox.
//! - **Behavior engine** ([`bot::behavior`]): randomized walk, look, jump and
//!   strafe actions on a self-rescheduling timer.
//! - **Allocation resolver** ([`allocation`]): server id to `host:port`
//!   through the hosting panel, with a fallback endpoint.
//! - **Store** ([`db`]): bot records in PostgreSQL or in memory.
//! - **Driver** ([`driver`]): the game-client protocol seam.
//!
//! ## Example
//!
//! ```no_run
//! use fleet_core::{
//!     FleetConfig, FleetManager, FleetRequest,
//!     allocation::StaticResolver,
//!     db::InMemoryBotRepository,
//!     driver::SimulatedDriver,
//! };
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), fleet_core::FleetError> {
//! let manager = FleetManager::new(
//!     FleetConfig::default(),
//!     Arc::new(InMemoryBotRepository::new()),
//!     Arc::new(StaticResolver::default()),
//!     Arc::new(SimulatedDriver::new()),
//! );
//!
//! let creation = manager
//!     .create_fleet(&FleetRequest::new("srv-1", 3, "Bot", "1h"))
//!     .await?;
//! assert_eq!(creation.created.len(), 3);
//! # Ok(())
//! # }
//! ```

/// Server id to network endpoint resolution.
pub mod allocation;

/// Bot records, actors and behavior.
pub mod bot;

/// Persistent bot store.
pub mod db;

/// Game-client driver seam and the simulated driver.
pub mod driver;

/// Fleet manager and live registry.
pub mod fleet;

pub use allocation::{AllocationResolver, ServerEndpoint};
pub use bot::{BotId, BotRecord, BotStatus, ControlAction, DurationToken};
pub use fleet::{
    FleetConfig, FleetControlReport, FleetCreation, FleetError, FleetManager, FleetPlan,
    FleetRequest, FleetResult,
};
