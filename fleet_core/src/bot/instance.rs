//! Bot actor owning one game-client connection.
//!
//! Every live bot is a task consuming two channels: the driver's event
//! stream and its own inbox of [`BotMessage`]s. All state transitions of a
//! bot happen inside that task, so they are serialized without locks. The
//! actor exclusively owns the connection handle, the behavior task and the
//! expiry timer; the fleet only ever holds a [`BotHandle`].

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;
use tokio::{
    sync::{mpsc, oneshot},
    time::{Instant, MissedTickBehavior, interval, sleep_until},
};

use super::{
    behavior::{BehaviorConfig, BehaviorEngine, BehaviorTask},
    expiry::ExpiryTimer,
    messages::{BotMessage, StopReason},
    models::{BotId, BotRecord, BotStatus, BotUpdate, ControlAction, IDLE_BEHAVIOR, MAX_VITAL, Position},
    sync::StateSync,
};
use crate::{
    allocation::ServerEndpoint,
    driver::{Connection, ConnectionHandle, Control, DriverError, DriverEvent, GameClientDriver},
    fleet::{FleetError, FleetResult, LiveRegistry},
};

const INBOX_CAPACITY: usize = 32;

// `interval` rejects a zero period
const MIN_HEARTBEAT: Duration = Duration::from_millis(10);

/// Timers of a bot instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotTimings {
    /// Pause between joining and starting the behavior engine
    pub settle_delay: Duration,

    /// Period of full-state persistence while online
    pub heartbeat_interval: Duration,

    /// Behavior engine timing
    pub behavior: BehaviorConfig,

    /// Base seed for reproducible behavior (mixed with the bot id)
    pub rng_seed: Option<u64>,
}

impl Default for BotTimings {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(30),
            behavior: BehaviorConfig::default(),
            rng_seed: None,
        }
    }
}

/// Shared services every bot actor needs
#[derive(Clone)]
pub struct BotContext {
    pub sync: StateSync,
    pub registry: LiveRegistry,
    pub timings: BotTimings,
}

/// Registry entry for a live bot
#[derive(Clone)]
pub struct BotHandle {
    id: BotId,
    server_id: String,
    username: String,
    sender: mpsc::Sender<BotMessage>,
    active: Arc<AtomicBool>,
}

impl BotHandle {
    /// Create a handle and the inbox its actor will consume
    pub fn new(id: BotId, server_id: &str, username: &str) -> (Self, mpsc::Receiver<BotMessage>) {
        let (sender, inbox) = mpsc::channel(INBOX_CAPACITY);
        let handle = Self {
            id,
            server_id: server_id.to_string(),
            username: username.to_string(),
            sender,
            active: Arc::new(AtomicBool::new(false)),
        };
        (handle, inbox)
    }

    pub fn id(&self) -> BotId {
        self.id
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Whether both handles address the same actor
    ///
    /// A reconnect under the same id gets a new inbox, so a stale handle
    /// never matches its successor.
    pub fn same_actor(&self, other: &BotHandle) -> bool {
        self.sender.same_channel(&other.sender)
    }

    /// Whether the bot has joined and not been torn down
    pub fn is_online(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Send a message to the bot
    pub async fn send(&self, message: BotMessage) -> Result<(), String> {
        self.sender
            .send(message)
            .await
            .map_err(|_| format!("Bot {} is gone", self.id))
    }

    /// Forward an operator directive; `false` when the bot is not online
    pub async fn control(&self, action: ControlAction) -> bool {
        if !self.is_online() {
            return false;
        }

        let (tx, rx) = oneshot::channel();
        if self
            .send(BotMessage::Control {
                action,
                response: tx,
            })
            .await
            .is_err()
        {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Stop the bot and wait for its teardown
    pub async fn stop(&self, reason: StopReason) {
        let (tx, rx) = oneshot::channel();
        if self
            .send(BotMessage::Stop {
                reason,
                response: tx,
            })
            .await
            .is_ok()
        {
            let _ = rx.await;
        }
    }

    /// Lifecycle state as seen by the actor, `None` if it already exited
    pub async fn status(&self) -> Option<BotStatus> {
        let (tx, rx) = oneshot::channel();
        self.send(BotMessage::GetStatus { response: tx }).await.ok()?;
        rx.await.ok()
    }
}

/// Register `record` as live, connect it and start its actor
///
/// The registry slot is taken before the driver is called, so two concurrent
/// connects for one id cannot both proceed. On failure the slot is released
/// and the caller decides how to record the failure.
pub async fn connect_bot(
    record: &BotRecord,
    endpoint: &ServerEndpoint,
    driver: &dyn GameClientDriver,
    connect_timeout: Duration,
    ctx: BotContext,
) -> FleetResult<BotHandle> {
    let (handle, inbox) = BotHandle::new(record.id, &record.server_id, &record.username);
    ctx.registry.insert(handle.clone()).await?;

    let connection =
        match tokio::time::timeout(connect_timeout, driver.connect(endpoint, &record.username)).await {
            Ok(Ok(connection)) => connection,
            Ok(Err(source)) => {
                ctx.registry.remove(record.id).await;
                return Err(FleetError::Connect {
                    id: record.id,
                    source,
                });
            }
            Err(_) => {
                ctx.registry.remove(record.id).await;
                return Err(FleetError::Connect {
                    id: record.id,
                    source: DriverError::Timeout(connect_timeout),
                });
            }
        };

    let actor = BotActor::new(&handle, inbox, connection, record, ctx);
    tokio::spawn(actor.run());

    Ok(handle)
}

/// Actor driving one bot connection
pub struct BotActor {
    id: BotId,
    username: String,
    ai_enabled: bool,

    /// Lifecycle state; `Offline` is terminal
    status: BotStatus,

    /// Last reported position and vitals
    position: Position,
    health: f32,
    food: f32,

    connection: Arc<dyn ConnectionHandle>,
    events: mpsc::Receiver<DriverEvent>,
    inbox: mpsc::Receiver<BotMessage>,

    /// Mirrors `status == Online` for the handle and behavior task
    active: Arc<AtomicBool>,

    /// Behavior start deadline while settling after join
    settle_at: Option<Instant>,

    /// Operator pulse to release
    pending_release: Option<(Instant, Control)>,

    behavior: Option<BehaviorTask>,
    expiry: Option<ExpiryTimer>,

    ctx: BotContext,
}

impl BotActor {
    /// Create the actor for a freshly connected bot and arm its expiry timer
    pub fn new(
        handle: &BotHandle,
        inbox: mpsc::Receiver<BotMessage>,
        connection: Connection,
        record: &BotRecord,
        ctx: BotContext,
    ) -> Self {
        let expiry = ExpiryTimer::schedule(record.expires_at, handle.sender.clone());

        Self {
            id: record.id,
            username: record.username.clone(),
            ai_enabled: record.ai_enabled,
            status: BotStatus::Connecting,
            position: Position::default(),
            health: MAX_VITAL,
            food: MAX_VITAL,
            connection: connection.handle,
            events: connection.events,
            inbox,
            active: handle.active.clone(),
            settle_at: None,
            pending_release: None,
            behavior: None,
            expiry,
            ctx,
        }
    }

    /// Run the actor until the bot goes offline
    pub async fn run(mut self) {
        log::info!("Bot {} ({}) connected", self.id, self.username);

        let mut heartbeat = interval(self.ctx.timings.heartbeat_interval.max(MIN_HEARTBEAT));
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        heartbeat.reset();

        while self.status != BotStatus::Offline {
            let settle_at = self.settle_at;
            let release_at = self.pending_release.map(|(at, _)| at);
            let online = self.status == BotStatus::Online;

            tokio::select! {
                event = self.events.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => self.teardown("event stream closed", false).await,
                },

                message = self.inbox.recv() => match message {
                    Some(message) => self.handle_message(message).await,
                    None => self.teardown("handle dropped", true).await,
                },

                _ = sleep_until(settle_at.unwrap_or_else(Instant::now)), if settle_at.is_some() => {
                    self.settle_at = None;
                    self.start_behavior();
                }

                _ = sleep_until(release_at.unwrap_or_else(Instant::now)), if release_at.is_some() => {
                    if let Some((_, control)) = self.pending_release.take() {
                        self.connection.set_control_state(control, false);
                    }
                }

                // Status only goes through awaited writes so it cannot land after teardown
                _ = heartbeat.tick(), if online => {
                    let snapshot =
                        BotUpdate::snapshot(BotStatus::Online, self.position, self.health, self.food);
                    self.ctx.sync.sync_status(self.id, snapshot).await;
                }
            }
        }

        log::info!("Bot {} ({}) actor finished", self.id, self.username);
    }

    async fn handle_event(&mut self, event: DriverEvent) {
        match event {
            DriverEvent::Login => {
                log::info!("Bot {} ({}) logged in", self.id, self.username);
            }

            DriverEvent::Spawn {
                position,
                health,
                food,
            } => {
                self.position = position;
                self.health = health;
                self.food = food;

                if self.status == BotStatus::Connecting {
                    self.status = BotStatus::Online;
                    self.active.store(true, Ordering::Release);
                    let snapshot = BotUpdate::snapshot(BotStatus::Online, position, health, food);
                    self.ctx.sync.sync_status(self.id, snapshot).await;

                    if self.ai_enabled {
                        self.settle_at = Some(Instant::now() + self.ctx.timings.settle_delay);
                    }
                    log::info!("Bot {} ({}) is online", self.id, self.username);
                } else {
                    // Respawn after death
                    self.ctx.sync.sync_update(self.id, BotUpdate::live(position, health, food));
                }
            }

            DriverEvent::Health { health, food } => {
                self.health = health;
                self.food = food;
                self.ctx.sync.sync_update(self.id, BotUpdate::vitals(health, food));
            }

            DriverEvent::Move { position } => {
                self.position = position;
                self.ctx.sync.sync_update(self.id, BotUpdate::position(position));
            }

            DriverEvent::Kicked { reason } => {
                log::warn!("Bot {} ({}) was kicked: {}", self.id, self.username, reason);
                self.teardown(&format!("kicked: {reason}"), false).await;
            }

            DriverEvent::Error { message } => {
                log::warn!("Bot {} ({}) connection error: {}", self.id, self.username, message);
                self.teardown(&format!("error: {message}"), false).await;
            }

            DriverEvent::End => {
                self.teardown("connection ended", false).await;
            }
        }
    }

    async fn handle_message(&mut self, message: BotMessage) {
        match message {
            BotMessage::Control { action, response } => {
                let applied = self.apply_control(action);
                let _ = response.send(applied);
            }

            BotMessage::Stop { reason, response } => {
                self.teardown(&reason.to_string(), true).await;
                let _ = response.send(());
            }

            BotMessage::GetStatus { response } => {
                let _ = response.send(self.status);
            }

            BotMessage::Expire => {
                log::info!("Bot {} ({}) reached its time-to-live", self.id, self.username);
                self.teardown("expired", true).await;
            }
        }
    }

    fn apply_control(&mut self, action: ControlAction) -> bool {
        if self.status != BotStatus::Online {
            return false;
        }

        let label = match action {
            ControlAction::Walk => {
                self.connection.set_control_state(Control::Forward, true);
                "walking"
            }
            ControlAction::Jump => {
                self.connection.set_control_state(Control::Jump, true);
                self.pending_release =
                    Some((Instant::now() + self.ctx.timings.behavior.jump_pulse, Control::Jump));
                "jumping"
            }
            ControlAction::StrafeLeft => {
                self.connection.set_control_state(Control::Right, false);
                self.connection.set_control_state(Control::Left, true);
                "strafing left"
            }
            ControlAction::StrafeRight => {
                self.connection.set_control_state(Control::Left, false);
                self.connection.set_control_state(Control::Right, true);
                "strafing right"
            }
            ControlAction::Stop => {
                self.pending_release = None;
                self.connection.clear_control_states();
                IDLE_BEHAVIOR
            }
        };

        log::debug!("Bot {} control: {}", self.id, action);
        self.ctx.sync.sync_update(self.id, BotUpdate::behavior(label));
        true
    }

    fn start_behavior(&mut self) {
        if self.status != BotStatus::Online || !self.ai_enabled || self.behavior.is_some() {
            return;
        }

        let seed = self
            .ctx
            .timings
            .rng_seed
            .map(|seed| seed ^ self.id.unsigned_abs());
        let engine = BehaviorEngine::new(
            self.id,
            self.connection.clone(),
            self.ctx.sync.clone(),
            self.active.clone(),
            self.ctx.timings.behavior.clone(),
            seed,
        );
        self.behavior = Some(engine.spawn());
    }

    /// Move to `Offline`, releasing every resource of the bot
    ///
    /// Safe to call more than once. The connection is only closed when the
    /// stop originates here; after a kick, error or end it is already gone.
    async fn teardown(&mut self, reason: &str, close_connection: bool) {
        if self.status == BotStatus::Offline {
            return;
        }
        self.status = BotStatus::Offline;
        self.active.store(false, Ordering::Release);
        self.settle_at = None;
        self.pending_release = None;

        if let Some(behavior) = self.behavior.take() {
            behavior.stop().await;
        }
        if let Some(expiry) = self.expiry.take() {
            expiry.cancel();
        }
        if close_connection {
            self.connection.disconnect();
        }

        self.ctx.sync.sync_status(self.id, BotUpdate::offline()).await;
        self.ctx.registry.remove(self.id).await;

        log::info!("Bot {} ({}) went offline: {}", self.id, self.username, reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::{DurationToken, NewBotRecord};
    use crate::db::{BotRepository, InMemoryBotRepository};
    use crate::driver::SimulatedDriver;
    use chrono::Utc;

    struct Harness {
        repo: InMemoryBotRepository,
        driver: SimulatedDriver,
        ctx: BotContext,
    }

    impl Harness {
        fn new() -> Self {
            let repo = InMemoryBotRepository::new();
            let ctx = BotContext {
                sync: StateSync::new(Arc::new(repo.clone())),
                registry: LiveRegistry::new(),
                timings: BotTimings::default(),
            };
            Self {
                repo,
                driver: SimulatedDriver::new(),
                ctx,
            }
        }

        async fn record(&self, ai_enabled: bool, duration: DurationToken) -> BotRecord {
            let new = NewBotRecord::for_fleet("s1", "Bot", 1, ai_enabled, duration, Utc::now());
            let id = self.repo.create_bot(&new).await.unwrap();
            new.into_record(id)
        }

        async fn connect(&self, record: &BotRecord) -> FleetResult<BotHandle> {
            connect_bot(
                record,
                &ServerEndpoint::fallback(),
                &self.driver,
                Duration::from_secs(30),
                self.ctx.clone(),
            )
            .await
        }

        async fn stored_status(&self, id: BotId) -> BotStatus {
            self.repo.get_bot(id).await.unwrap().unwrap().status
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_event_brings_bot_online() {
        let harness = Harness::new();
        let record = harness.record(false, DurationToken::Never).await;

        let handle = harness.connect(&record).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(handle.is_online());
        assert_eq!(handle.status().await, Some(BotStatus::Online));
        assert_eq!(harness.stored_status(record.id).await, BotStatus::Online);
        assert!(harness.ctx.registry.contains(record.id).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_connect_for_live_bot_is_rejected() {
        let harness = Harness::new();
        let record = harness.record(false, DurationToken::Never).await;

        harness.connect(&record).await.unwrap();
        let result = harness.connect(&record).await;

        assert!(matches!(result, Err(FleetError::AlreadyLive(id)) if id == record.id));
        assert_eq!(harness.driver.attempts().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refused_connect_releases_registry_slot() {
        let harness = Harness::new();
        let record = harness.record(false, DurationToken::Never).await;
        harness.driver.refuse("Bot1");

        let result = harness.connect(&record).await;

        assert!(matches!(result, Err(FleetError::Connect { .. })));
        assert!(harness.ctx.registry.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_kick_tears_down_without_disconnect_call() {
        let harness = Harness::new();
        let record = harness.record(true, DurationToken::Never).await;
        let handle = harness.connect(&record).await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;

        let session = harness.driver.session("Bot1").unwrap();
        session.kick("flying is not enabled").await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(!handle.is_online());
        assert_eq!(harness.stored_status(record.id).await, BotStatus::Offline);
        assert!(harness.ctx.registry.is_empty().await);

        // No behavior timer touches the dead connection afterwards
        let late = session.late_calls();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(session.late_calls(), late);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_disconnects_and_answers() {
        let harness = Harness::new();
        let record = harness.record(false, DurationToken::Never).await;
        let handle = harness.connect(&record).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        handle.stop(StopReason::Deleted).await;

        let session = harness.driver.session("Bot1").unwrap();
        assert!(!session.is_connected());
        assert_eq!(harness.stored_status(record.id).await, BotStatus::Offline);
        assert_eq!(handle.status().await, None);
        assert!(!handle.control(ControlAction::Walk).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_operator_controls() {
        let harness = Harness::new();
        let record = harness.record(false, DurationToken::Never).await;
        let handle = harness.connect(&record).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let session = harness.driver.session("Bot1").unwrap();

        assert!(handle.control(ControlAction::Walk).await);
        assert!(session.is_holding(Control::Forward));

        assert!(handle.control(ControlAction::StrafeLeft).await);
        assert!(handle.control(ControlAction::StrafeRight).await);
        assert!(session.is_holding(Control::Right));
        assert!(!session.is_holding(Control::Left));

        assert!(handle.control(ControlAction::Jump).await);
        assert!(session.is_holding(Control::Jump));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!session.is_holding(Control::Jump));

        assert!(handle.control(ControlAction::Stop).await);
        assert!(!session.is_holding(Control::Forward));
        assert!(!session.is_holding(Control::Right));

        tokio::time::sleep(Duration::from_millis(10)).await;
        let stored = harness.repo.get_bot(record.id).await.unwrap().unwrap();
        assert_eq!(stored.behavior, IDLE_BEHAVIOR);
        assert!(stored.position.z >= 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_health_event_is_persisted() {
        let harness = Harness::new();
        let record = harness.record(false, DurationToken::Never).await;
        harness.connect(&record).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let session = harness.driver.session("Bot1").unwrap();
        session
            .emit(DriverEvent::Health {
                health: 12.5,
                food: 7.0,
            })
            .await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        let stored = harness.repo.get_bot(record.id).await.unwrap().unwrap();
        assert_eq!(stored.health, 12.5);
        assert_eq!(stored.food, 7.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_status_survives_respawn_before_kick() {
        let harness = Harness::new();
        let record = harness.record(false, DurationToken::Never).await;
        let handle = harness.connect(&record).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let session = harness.driver.session("Bot1").unwrap();
        session
            .emit(DriverEvent::Spawn {
                position: Position::new(3.0, 64.0, 3.0),
                health: 20.0,
                food: 20.0,
            })
            .await;
        session.kick("bye").await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!handle.is_online());
        assert!(harness.ctx.registry.is_empty().await);
        let stored = harness.repo.get_bot(record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BotStatus::Offline);
        assert_eq!(stored.behavior, IDLE_BEHAVIOR);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_then_kick_stays_offline() {
        let harness = Harness::new();
        let record = harness.record(false, DurationToken::Never).await;
        harness.connect(&record).await.unwrap();

        // Kick right behind the first heartbeat
        tokio::time::sleep(Duration::from_secs(30)).await;
        harness.driver.session("Bot1").unwrap().kick("bye").await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(harness.stored_status(record.id).await, BotStatus::Offline);
        assert!(harness.ctx.registry.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_disconnects_bot() {
        let harness = Harness::new();
        let record = harness.record(false, DurationToken::OneMinute).await;
        let handle = harness.connect(&record).await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(handle.is_online());

        tokio::time::sleep(Duration::from_secs(31)).await;

        let session = harness.driver.session("Bot1").unwrap();
        assert!(!session.is_connected());
        assert_eq!(harness.stored_status(record.id).await, BotStatus::Offline);
    }
}
