//! HTTP control plane for the bot fleet orchestrator.

pub mod api;
pub mod config;
pub mod logging;
pub mod metrics;
