//! Fleet timing and limits.

use std::env;
use std::time::Duration;

use super::errors::{FleetError, FleetResult};
use crate::bot::{BehaviorConfig, BotTimings};

/// Hard cap on bots per fleet request
pub const MAX_FLEET_SIZE: u32 = 100;

/// Fleet manager configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FleetConfig {
    /// Wait between two consecutive connect attempts of a batch
    pub spawn_delay: Duration,

    /// Extra wait before the first connect of a batch
    pub warmup_delay: Duration,

    /// Pause between a bot joining and its behavior engine starting
    pub settle_delay: Duration,

    /// Per-attempt connect timeout
    pub connect_timeout: Duration,

    /// Period of full-state persistence for online bots
    pub heartbeat_interval: Duration,

    /// Largest accepted fleet request (at most [`MAX_FLEET_SIZE`])
    pub max_bots: u32,

    /// Base seed for reproducible behavior, random when `None`
    pub rng_seed: Option<u64>,

    /// Behavior loop timing
    pub behavior: BehaviorConfig,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            spawn_delay: Duration::from_secs(5),
            warmup_delay: Duration::from_secs(3),
            settle_delay: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(30),
            max_bots: MAX_FLEET_SIZE,
            rng_seed: None,
            behavior: BehaviorConfig::default(),
        }
    }
}

impl FleetConfig {
    /// Create configuration from environment variables
    ///
    /// Expected environment variables (all optional):
    /// - `FLEET_SPAWN_DELAY_MS`: Delay between connects (default: 5000)
    /// - `FLEET_WARMUP_DELAY_MS`: Extra delay before the first connect (default: 3000)
    /// - `FLEET_SETTLE_DELAY_MS`: Delay before behavior starts (default: 5000)
    /// - `FLEET_CONNECT_TIMEOUT_SECS`: Connect timeout (default: 30)
    /// - `FLEET_HEARTBEAT_SECS`: State persistence period (default: 30)
    /// - `FLEET_MAX_BOTS`: Largest fleet request (default: 100)
    /// - `FLEET_RNG_SEED`: Behavior seed (default: unset)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            spawn_delay: env_millis("FLEET_SPAWN_DELAY_MS", defaults.spawn_delay),
            warmup_delay: env_millis("FLEET_WARMUP_DELAY_MS", defaults.warmup_delay),
            settle_delay: env_millis("FLEET_SETTLE_DELAY_MS", defaults.settle_delay),
            connect_timeout: env_secs("FLEET_CONNECT_TIMEOUT_SECS", defaults.connect_timeout),
            heartbeat_interval: env_secs("FLEET_HEARTBEAT_SECS", defaults.heartbeat_interval),
            max_bots: parse_env_or("FLEET_MAX_BOTS", defaults.max_bots),
            rng_seed: env::var("FLEET_RNG_SEED").ok().and_then(|v| v.parse().ok()),
            behavior: defaults.behavior,
        }
    }

    /// Check limits and timer ranges
    pub fn validate(&self) -> FleetResult<()> {
        if self.max_bots == 0 || self.max_bots > MAX_FLEET_SIZE {
            return Err(FleetError::InvalidConfig(format!(
                "max_bots must be between 1 and {}, got {}",
                MAX_FLEET_SIZE, self.max_bots
            )));
        }

        if self.connect_timeout.is_zero() {
            return Err(FleetError::InvalidConfig(
                "connect_timeout must be positive".to_string(),
            ));
        }

        if self.heartbeat_interval.is_zero() {
            return Err(FleetError::InvalidConfig(
                "heartbeat_interval must be positive".to_string(),
            ));
        }

        let behavior = &self.behavior;
        if behavior.min_pause > behavior.max_pause {
            return Err(FleetError::InvalidConfig(
                "behavior pause range is empty".to_string(),
            ));
        }
        if behavior.walk_min > behavior.walk_max {
            return Err(FleetError::InvalidConfig(
                "behavior walk range is empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Wait before connect attempt `index` (1-based) of a batch
    pub fn delay_before(&self, index: u32) -> Duration {
        if index <= 1 {
            self.warmup_delay + self.spawn_delay
        } else {
            self.spawn_delay
        }
    }

    /// Timers handed to every bot actor
    pub fn bot_timings(&self) -> BotTimings {
        BotTimings {
            settle_delay: self.settle_delay,
            heartbeat_interval: self.heartbeat_interval,
            behavior: self.behavior.clone(),
            rng_seed: self.rng_seed,
        }
    }
}

fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_millis(key: &str, default: Duration) -> Duration {
    Duration::from_millis(parse_env_or(key, default.as_millis() as u64))
}

fn env_secs(key: &str, default: Duration) -> Duration {
    Duration::from_secs(parse_env_or(key, default.as_secs()))
}
