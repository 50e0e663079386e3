//! Fleet error types.

use thiserror::Error;

use crate::bot::BotId;
use crate::db::StoreError;
use crate::driver::DriverError;

/// Fleet errors
#[derive(Debug, Error)]
pub enum FleetError {
    /// Bot count outside the accepted range
    #[error("Bot count must be between 1 and {max}, got {count}")]
    InvalidBotCount { count: i64, max: u32 },

    /// Username prefix empty after trimming
    #[error("Username prefix must not be empty")]
    EmptyPrefix,

    /// Unknown duration token
    #[error("Unknown duration '{0}', expected one of 1m, 5m, 15m, 30m, 1h, 6h, 12h, 1d, never")]
    InvalidDuration(String),

    /// Bot already has a live connection
    #[error("Bot {0} is already connected")]
    AlreadyLive(BotId),

    /// No live bot with this id
    #[error("Bot {0} is not connected")]
    BotNotFound(BotId),

    /// Driver could not connect the bot
    #[error("Bot {id} failed to connect: {source}")]
    Connect {
        id: BotId,
        #[source]
        source: DriverError,
    },

    /// Invalid fleet configuration
    #[error("Invalid fleet configuration: {0}")]
    InvalidConfig(String),

    /// Store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl FleetError {
    /// Get a client-safe error message that doesn't leak internal details
    pub fn client_message(&self) -> String {
        match self {
            // Don't expose SQL or connection details
            FleetError::Store(StoreError::NotFound(_)) => "Bot not found".to_string(),
            FleetError::Store(_) => "Internal server error".to_string(),
            FleetError::Connect { .. } => "Bot failed to connect".to_string(),
            _ => self.to_string(),
        }
    }

    /// Whether the error was caused by invalid caller input
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            FleetError::InvalidBotCount { .. }
                | FleetError::EmptyPrefix
                | FleetError::InvalidDuration(_)
        )
    }
}

/// Result type for fleet operations
pub type FleetResult<T> = Result<T, FleetError>;
