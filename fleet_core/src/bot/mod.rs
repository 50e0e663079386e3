//! Individual bots: records, the per-bot actor and its behavior loop.
//!
//! - [`models`]: persisted record, lifecycle status, duration tokens and
//!   operator control actions
//! - [`instance`]: actor owning one game-client connection
//! - [`behavior`]: randomized idle-movement loop run while online
//! - [`expiry`]: time-to-live timer
//! - [`sync`]: best-effort mirroring of live state into the store

pub mod behavior;
pub mod expiry;
pub mod instance;
pub mod messages;
pub mod models;
pub mod sync;

pub use behavior::{ActionKind, BehaviorAction, BehaviorConfig, BehaviorEngine, BehaviorTask};
pub use instance::{BotActor, BotContext, BotHandle, BotTimings, connect_bot};
pub use messages::{BotMessage, StopReason};
pub use models::{
    BotId, BotRecord, BotStatus, BotUpdate, ControlAction, DurationToken, IDLE_BEHAVIOR,
    MAX_VITAL, NewBotRecord, ParseValueError, Position, bot_username,
};
pub use sync::StateSync;
