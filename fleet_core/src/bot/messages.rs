//! Bot actor message types.

use tokio::sync::oneshot;

use super::models::{BotStatus, ControlAction};

/// Why a bot is being stopped from the outside
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Operator deleted the bot
    Deleted,
    /// Orchestrator is shutting down
    Shutdown,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::Deleted => write!(f, "deleted"),
            StopReason::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// Messages that can be sent to a bot actor
#[derive(Debug)]
pub enum BotMessage {
    /// Apply an operator directive; answers `false` unless online
    Control {
        action: ControlAction,
        response: oneshot::Sender<bool>,
    },

    /// Disconnect and tear down; answered once teardown completed
    Stop {
        reason: StopReason,
        response: oneshot::Sender<()>,
    },

    /// Current lifecycle state
    GetStatus {
        response: oneshot::Sender<BotStatus>,
    },

    /// Internal: time-to-live elapsed (sent by the expiry timer)
    Expire,
}
