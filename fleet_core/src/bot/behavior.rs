//! Randomized behavior loop that makes an idle bot look like a player.
//!
//! Each bot with AI enabled runs one engine task. The task sleeps until the
//! next action deadline, draws an action from a fixed table, applies it to
//! the connection and arms a revert deadline for actions that hold a control
//! or a label. Both deadlines are selected over in the same task, so aborting
//! the task cancels every pending timer of the bot at once.
//!
//! | draw          | action | effect                          | lasts   |
//! |---------------|--------|---------------------------------|---------|
//! | `[0.0, 0.4)`  | walk   | hold forward                    | 1-4 s   |
//! | `[0.4, 0.6)`  | look   | random yaw, pitch within ±π/8   | 0.5 s   |
//! | `[0.6, 0.7)`  | jump   | pulse jump                      | 0.1 s   |
//! | `[0.7, 0.8)`  | strafe | hold left or right              | 1 s     |
//! | `[0.8, 1.0)`  | idle   | release every control           | -       |

use rand::{Rng, SeedableRng, rngs::StdRng};
use std::f32::consts::{FRAC_PI_8, TAU};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;
use tokio::{
    task::JoinHandle,
    time::{Instant, sleep_until},
};

use super::{
    models::{BotId, BotStatus, BotUpdate, IDLE_BEHAVIOR},
    sync::StateSync,
};
use crate::driver::{Control, ConnectionHandle};

// Upper bounds of each action's slice of the unit interval
const WALK_UPPER: f64 = 0.40;
const LOOK_UPPER: f64 = 0.60;
const JUMP_UPPER: f64 = 0.70;
const STRAFE_UPPER: f64 = 0.80;

/// Timing of the behavior loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BehaviorConfig {
    /// Delay between activation and the first action
    pub first_action_delay: Duration,

    /// Shortest pause between two actions
    pub min_pause: Duration,

    /// Longest pause between two actions
    pub max_pause: Duration,

    /// Shortest forward walk
    pub walk_min: Duration,

    /// Longest forward walk
    pub walk_max: Duration,

    /// How long the look label stays before reverting to idle
    pub look_hold: Duration,

    /// How long jump is held
    pub jump_pulse: Duration,

    /// How long a strafe is held
    pub strafe_hold: Duration,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            first_action_delay: Duration::from_secs(2),
            min_pause: Duration::from_secs(3),
            max_pause: Duration::from_secs(7),
            walk_min: Duration::from_secs(1),
            walk_max: Duration::from_secs(4),
            look_hold: Duration::from_millis(500),
            jump_pulse: Duration::from_millis(100),
            strafe_hold: Duration::from_secs(1),
        }
    }
}

/// The five mutually exclusive actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Walk,
    Look,
    Jump,
    Strafe,
    Idle,
}

impl ActionKind {
    /// Map a uniform draw in `[0, 1)` onto the action table
    pub fn from_roll(roll: f64) -> Self {
        if roll < WALK_UPPER {
            ActionKind::Walk
        } else if roll < LOOK_UPPER {
            ActionKind::Look
        } else if roll < JUMP_UPPER {
            ActionKind::Jump
        } else if roll < STRAFE_UPPER {
            ActionKind::Strafe
        } else {
            ActionKind::Idle
        }
    }
}

/// A concrete action with its random parameters drawn
#[derive(Debug, Clone, PartialEq)]
pub enum BehaviorAction {
    Walk { duration: Duration },
    Look { yaw: f32, pitch: f32 },
    Jump,
    Strafe { control: Control },
    Idle,
}

impl BehaviorAction {
    /// Draw the next action
    pub fn plan<R: Rng + ?Sized>(rng: &mut R, config: &BehaviorConfig) -> Self {
        match ActionKind::from_roll(rng.random::<f64>()) {
            ActionKind::Walk => BehaviorAction::Walk {
                duration: rng.random_range(config.walk_min..=config.walk_max),
            },
            ActionKind::Look => BehaviorAction::Look {
                yaw: rng.random_range(0.0..TAU),
                pitch: rng.random_range(-FRAC_PI_8..=FRAC_PI_8),
            },
            ActionKind::Jump => BehaviorAction::Jump,
            ActionKind::Strafe => BehaviorAction::Strafe {
                control: if rng.random_bool(0.5) {
                    Control::Left
                } else {
                    Control::Right
                },
            },
            ActionKind::Idle => BehaviorAction::Idle,
        }
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            BehaviorAction::Walk { .. } => ActionKind::Walk,
            BehaviorAction::Look { .. } => ActionKind::Look,
            BehaviorAction::Jump => ActionKind::Jump,
            BehaviorAction::Strafe { .. } => ActionKind::Strafe,
            BehaviorAction::Idle => ActionKind::Idle,
        }
    }

    /// Label persisted while the action runs
    pub fn label(&self) -> &'static str {
        match self {
            BehaviorAction::Walk { .. } => "walking",
            BehaviorAction::Look { .. } => "looking around",
            BehaviorAction::Jump => "jumping",
            BehaviorAction::Strafe {
                control: Control::Left,
            } => "strafing left",
            BehaviorAction::Strafe { .. } => "strafing right",
            BehaviorAction::Idle => IDLE_BEHAVIOR,
        }
    }

    /// Time until the action reverts to idle, `None` if it does not
    pub fn hold(&self, config: &BehaviorConfig) -> Option<Duration> {
        match self {
            BehaviorAction::Walk { duration } => Some(*duration),
            BehaviorAction::Look { .. } => Some(config.look_hold),
            BehaviorAction::Jump => Some(config.jump_pulse),
            BehaviorAction::Strafe { .. } => Some(config.strafe_hold),
            BehaviorAction::Idle => None,
        }
    }

    fn held_control(&self) -> Option<Control> {
        match self {
            BehaviorAction::Walk { .. } => Some(Control::Forward),
            BehaviorAction::Jump => Some(Control::Jump),
            BehaviorAction::Strafe { control } => Some(*control),
            BehaviorAction::Look { .. } | BehaviorAction::Idle => None,
        }
    }
}

/// Running engine task of one bot
pub struct BehaviorTask {
    task: JoinHandle<()>,
}

impl BehaviorTask {
    /// Cancel the loop and wait until it can no longer touch the connection
    pub async fn stop(self) {
        self.task.abort();
        let _ = self.task.await;
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Behavior loop of one bot
pub struct BehaviorEngine {
    id: BotId,
    handle: Arc<dyn ConnectionHandle>,
    sync: StateSync,
    active: Arc<AtomicBool>,
    config: BehaviorConfig,
    rng: StdRng,
}

impl BehaviorEngine {
    /// Create an engine; a `seed` makes the action sequence reproducible
    pub fn new(
        id: BotId,
        handle: Arc<dyn ConnectionHandle>,
        sync: StateSync,
        active: Arc<AtomicBool>,
        config: BehaviorConfig,
        seed: Option<u64>,
    ) -> Self {
        let rng = seed.map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64);
        Self {
            id,
            handle,
            sync,
            active,
            config,
            rng,
        }
    }

    pub fn spawn(self) -> BehaviorTask {
        BehaviorTask {
            task: tokio::spawn(self.run()),
        }
    }

    /// Run until the bot goes inactive or its record reads offline
    pub async fn run(mut self) {
        log::debug!("Bot {} behavior started", self.id);

        let mut next_action = Instant::now() + self.config.first_action_delay;
        let mut pending: Option<(Instant, BehaviorAction)> = None;

        loop {
            let revert_at = pending.as_ref().map(|(at, _)| *at);

            tokio::select! {
                _ = sleep_until(revert_at.unwrap_or(next_action)), if revert_at.is_some() => {
                    if let Some((_, action)) = pending.take() {
                        self.revert(&action);
                    }
                }

                _ = sleep_until(next_action) => {
                    if !self.should_continue().await {
                        break;
                    }

                    // A new action supersedes a still-held one
                    if let Some((_, previous)) = pending.take() {
                        self.release(&previous);
                    }

                    let action = BehaviorAction::plan(&mut self.rng, &self.config);
                    self.perform(&action);
                    if let Some(hold) = action.hold(&self.config) {
                        pending = Some((Instant::now() + hold, action));
                    }

                    next_action = Instant::now() + self.next_pause();
                }
            }
        }

        log::debug!("Bot {} behavior stopped", self.id);
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    async fn should_continue(&self) -> bool {
        if !self.is_active() {
            return false;
        }

        // Only a successful read can stop the loop; an unreachable store must
        // not silence every bot
        match self.sync.repository().get_bot(self.id).await {
            Ok(Some(record)) if record.status == BotStatus::Offline => return false,
            Ok(None) => return false,
            Ok(Some(_)) => {}
            Err(e) => log::debug!("Bot {} status check failed: {}", self.id, e),
        }

        self.is_active()
    }

    fn next_pause(&mut self) -> Duration {
        self.rng
            .random_range(self.config.min_pause..=self.config.max_pause)
    }

    fn perform(&self, action: &BehaviorAction) {
        match action {
            BehaviorAction::Walk { .. } | BehaviorAction::Jump | BehaviorAction::Strafe { .. } => {
                if let Some(control) = action.held_control() {
                    self.handle.set_control_state(control, true);
                }
            }
            BehaviorAction::Look { yaw, pitch } => self.handle.look(*yaw, *pitch, false),
            BehaviorAction::Idle => self.handle.clear_control_states(),
        }

        log::debug!("Bot {} is {}", self.id, action.label());
        self.sync
            .sync_update(self.id, BotUpdate::behavior(action.label()));
    }

    fn release(&self, action: &BehaviorAction) {
        if let Some(control) = action.held_control()
            && self.is_active()
        {
            self.handle.set_control_state(control, false);
        }
    }

    fn revert(&self, action: &BehaviorAction) {
        if !self.is_active() {
            return;
        }
        self.release(action);
        self.sync
            .sync_update(self.id, BotUpdate::behavior(IDLE_BEHAVIOR));
    }
}
