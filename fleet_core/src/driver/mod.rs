//! Game-client driver seam.
//!
//! The wire protocol lives outside this crate. A driver connects one client
//! per bot and hands back a [`Connection`]: a control handle plus the stream
//! of events the client receives. Each bot actor consumes its own stream, so
//! events of one bot are handled in delivery order.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::{allocation::ServerEndpoint, bot::Position};

pub mod sim;

pub use sim::{ConnectAttempt, SimulatedDriver, SimulatedSession};

/// Movement controls a client can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Control {
    Forward,
    Back,
    Left,
    Right,
    Jump,
    Sprint,
    Sneak,
}

/// Events a connected client reports
#[derive(Debug, Clone, PartialEq)]
pub enum DriverEvent {
    /// Authenticated with the server
    Login,
    /// Joined the world
    Spawn {
        position: Position,
        health: f32,
        food: f32,
    },
    /// Health or food changed
    Health { health: f32, food: f32 },
    /// Client moved
    Move { position: Position },
    /// Server removed the client
    Kicked { reason: String },
    /// Connection-level failure
    Error { message: String },
    /// Connection closed
    End,
}

/// Driver errors
#[derive(Debug, Error)]
pub enum DriverError {
    /// Server or driver refused the connection
    #[error("Connection refused: {0}")]
    Refused(String),

    /// Connect did not complete in time
    #[error("Connect timed out after {0:?}")]
    Timeout(Duration),

    /// Connection was already closed
    #[error("Connection closed")]
    Disconnected,
}

/// Control surface of one live client
///
/// Calls are fire-and-forget; a driver queues them for its connection task.
pub trait ConnectionHandle: Send + Sync {
    fn set_control_state(&self, control: Control, state: bool);

    /// Yaw and pitch in radians; `relative` adds to the current view
    fn look(&self, yaw: f32, pitch: f32, relative: bool);

    fn clear_control_states(&self);

    fn disconnect(&self);
}

/// A connected client
pub struct Connection {
    pub handle: Arc<dyn ConnectionHandle>,
    pub events: mpsc::Receiver<DriverEvent>,
}

/// Factory of client connections
#[async_trait]
pub trait GameClientDriver: Send + Sync {
    async fn connect(
        &self,
        endpoint: &ServerEndpoint,
        username: &str,
    ) -> Result<Connection, DriverError>;
}
