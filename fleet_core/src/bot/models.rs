//! Bot record models and value types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Bot record identifier
pub type BotId = i64;

/// Default spawn height used before the first spawn event arrives
pub const DEFAULT_SPAWN_Y: f64 = 64.0;

/// Maximum value of health and food
pub const MAX_VITAL: f32 = 100.0;

/// Label written while a bot is not performing an action
pub const IDLE_BEHAVIOR: &str = "idle";

/// Connection status of a bot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BotStatus {
    Connecting,
    Online,
    Offline,
}

impl std::fmt::Display for BotStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BotStatus::Connecting => write!(f, "connecting"),
            BotStatus::Online => write!(f, "online"),
            BotStatus::Offline => write!(f, "offline"),
        }
    }
}

impl FromStr for BotStatus {
    type Err = ParseValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "connecting" => Ok(BotStatus::Connecting),
            "online" => Ok(BotStatus::Online),
            "offline" => Ok(BotStatus::Offline),
            other => Err(ParseValueError::Status(other.to_string())),
        }
    }
}

/// Errors produced when parsing textual bot values
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseValueError {
    #[error("Unknown bot status: {0}")]
    Status(String),

    #[error("Unknown duration token: {0}")]
    Duration(String),

    #[error("Unknown control action: {0}")]
    Action(String),
}

/// World position reported by the game client
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::new(0.0, DEFAULT_SPAWN_Y, 0.0)
    }
}

/// Fleet time-to-live token
///
/// Tokens are the short strings operators submit (`"5m"`, `"1h"`, `"never"`).
/// Anything else fails to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DurationToken {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "30m")]
    ThirtyMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "6h")]
    SixHours,
    #[serde(rename = "12h")]
    TwelveHours,
    #[serde(rename = "1d")]
    OneDay,
    #[serde(rename = "never")]
    Never,
}

impl DurationToken {
    /// Every accepted token, shortest first
    pub const ALL: [DurationToken; 9] = [
        DurationToken::OneMinute,
        DurationToken::FiveMinutes,
        DurationToken::FifteenMinutes,
        DurationToken::ThirtyMinutes,
        DurationToken::OneHour,
        DurationToken::SixHours,
        DurationToken::TwelveHours,
        DurationToken::OneDay,
        DurationToken::Never,
    ];

    /// Token text as stored and accepted over the API
    pub fn as_str(&self) -> &'static str {
        match self {
            DurationToken::OneMinute => "1m",
            DurationToken::FiveMinutes => "5m",
            DurationToken::FifteenMinutes => "15m",
            DurationToken::ThirtyMinutes => "30m",
            DurationToken::OneHour => "1h",
            DurationToken::SixHours => "6h",
            DurationToken::TwelveHours => "12h",
            DurationToken::OneDay => "1d",
            DurationToken::Never => "never",
        }
    }

    /// Time-to-live of the token, `None` for `never`
    pub fn as_duration(&self) -> Option<chrono::Duration> {
        match self {
            DurationToken::OneMinute => Some(chrono::Duration::minutes(1)),
            DurationToken::FiveMinutes => Some(chrono::Duration::minutes(5)),
            DurationToken::FifteenMinutes => Some(chrono::Duration::minutes(15)),
            DurationToken::ThirtyMinutes => Some(chrono::Duration::minutes(30)),
            DurationToken::OneHour => Some(chrono::Duration::hours(1)),
            DurationToken::SixHours => Some(chrono::Duration::hours(6)),
            DurationToken::TwelveHours => Some(chrono::Duration::hours(12)),
            DurationToken::OneDay => Some(chrono::Duration::days(1)),
            DurationToken::Never => None,
        }
    }

    /// Absolute deadline for a bot created at `created_at`
    pub fn expires_at(&self, created_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.as_duration().map(|ttl| created_at + ttl)
    }
}

impl std::fmt::Display for DurationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DurationToken {
    type Err = ParseValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DurationToken::ALL
            .into_iter()
            .find(|token| token.as_str() == s)
            .ok_or_else(|| ParseValueError::Duration(s.to_string()))
    }
}

/// Directive an operator can send to a live bot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ControlAction {
    Walk,
    Jump,
    StrafeLeft,
    StrafeRight,
    Stop,
}

impl std::fmt::Display for ControlAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControlAction::Walk => write!(f, "walk"),
            ControlAction::Jump => write!(f, "jump"),
            ControlAction::StrafeLeft => write!(f, "strafe-left"),
            ControlAction::StrafeRight => write!(f, "strafe-right"),
            ControlAction::Stop => write!(f, "stop"),
        }
    }
}

impl FromStr for ControlAction {
    type Err = ParseValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "walk" => Ok(ControlAction::Walk),
            "jump" => Ok(ControlAction::Jump),
            "strafe-left" => Ok(ControlAction::StrafeLeft),
            "strafe-right" => Ok(ControlAction::StrafeRight),
            "stop" => Ok(ControlAction::Stop),
            other => Err(ParseValueError::Action(other.to_string())),
        }
    }
}

/// Persisted bot state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotRecord {
    pub id: BotId,
    pub server_id: String,
    pub username: String,
    pub status: BotStatus,
    pub position: Position,
    pub health: f32,
    pub food: f32,
    pub behavior: String,
    pub ai_enabled: bool,
    pub duration: DurationToken,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied when a bot record is first inserted
#[derive(Debug, Clone, PartialEq)]
pub struct NewBotRecord {
    pub server_id: String,
    pub username: String,
    pub ai_enabled: bool,
    pub duration: DurationToken,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl NewBotRecord {
    /// Build the record for the `index`-th (1-based) bot of a fleet
    pub fn for_fleet(
        server_id: &str,
        prefix: &str,
        index: u32,
        ai_enabled: bool,
        duration: DurationToken,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            server_id: server_id.to_string(),
            username: bot_username(prefix, index),
            ai_enabled,
            duration,
            expires_at: duration.expires_at(created_at),
            created_at,
        }
    }

    /// Materialize the stored record with default live fields
    pub fn into_record(self, id: BotId) -> BotRecord {
        BotRecord {
            id,
            server_id: self.server_id,
            username: self.username,
            status: BotStatus::Connecting,
            position: Position::default(),
            health: MAX_VITAL,
            food: MAX_VITAL,
            behavior: IDLE_BEHAVIOR.to_string(),
            ai_enabled: self.ai_enabled,
            duration: self.duration,
            expires_at: self.expires_at,
            created_at: self.created_at,
        }
    }
}

/// Partial update of a bot record; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BotUpdate {
    pub status: Option<BotStatus>,
    pub position: Option<Position>,
    pub health: Option<f32>,
    pub food: Option<f32>,
    pub behavior: Option<String>,
}

impl BotUpdate {
    pub fn status(status: BotStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Terminal update: offline with the behavior label reset
    pub fn offline() -> Self {
        Self {
            status: Some(BotStatus::Offline),
            behavior: Some(IDLE_BEHAVIOR.to_string()),
            ..Default::default()
        }
    }

    pub fn position(position: Position) -> Self {
        Self {
            position: Some(position),
            ..Default::default()
        }
    }

    /// Health and food, clamped to `0..=MAX_VITAL`
    pub fn vitals(health: f32, food: f32) -> Self {
        Self {
            health: Some(health.clamp(0.0, MAX_VITAL)),
            food: Some(food.clamp(0.0, MAX_VITAL)),
            ..Default::default()
        }
    }

    pub fn behavior(label: impl Into<String>) -> Self {
        Self {
            behavior: Some(label.into()),
            ..Default::default()
        }
    }

    /// Full live snapshot written on join and on heartbeats
    pub fn snapshot(status: BotStatus, position: Position, health: f32, food: f32) -> Self {
        Self {
            status: Some(status),
            position: Some(position),
            ..Self::vitals(health, food)
        }
    }

    /// Position and vitals without a status, for writes that may reorder
    pub fn live(position: Position, health: f32, food: f32) -> Self {
        Self {
            position: Some(position),
            ..Self::vitals(health, food)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.position.is_none()
            && self.health.is_none()
            && self.food.is_none()
            && self.behavior.is_none()
    }

    /// Apply the set fields onto a record
    pub fn apply_to(&self, record: &mut BotRecord) {
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(position) = self.position {
            record.position = position;
        }
        if let Some(health) = self.health {
            record.health = health;
        }
        if let Some(food) = self.food {
            record.food = food;
        }
        if let Some(behavior) = &self.behavior {
            record.behavior.clone_from(behavior);
        }
    }
}

/// Username of the `index`-th (1-based) bot of a fleet
pub fn bot_username(prefix: &str, index: u32) -> String {
    format!("{prefix}{index}")
}
