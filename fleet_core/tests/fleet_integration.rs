//! Integration tests for fleet creation, control and teardown.
//!
//! Everything runs against the in-memory store and the simulated driver with
//! tokio's clock paused, so spawn throttling and timers are checked in
//! virtual time.

use async_trait::async_trait;
use fleet_core::{
    BotId, BotRecord, BotStatus, ControlAction, FleetConfig, FleetError, FleetManager,
    FleetRequest, ServerEndpoint,
    allocation::StaticResolver,
    bot::{BotUpdate, NewBotRecord},
    db::{BotRepository, InMemoryBotRepository, StoreError, StoreResult},
    driver::{Control, SimulatedDriver},
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Store wrapper remembering every behavior label written per bot
#[derive(Clone, Default)]
struct RecordingRepository {
    inner: InMemoryBotRepository,
    labels: Arc<Mutex<HashMap<BotId, Vec<String>>>>,
}

impl RecordingRepository {
    fn labels(&self, id: BotId) -> Vec<String> {
        self.labels
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl BotRepository for RecordingRepository {
    async fn create_bot(&self, record: &NewBotRecord) -> StoreResult<BotId> {
        self.inner.create_bot(record).await
    }

    async fn update_bot(&self, id: BotId, update: &BotUpdate) -> StoreResult<()> {
        if let Some(label) = &update.behavior {
            self.labels
                .lock()
                .unwrap()
                .entry(id)
                .or_default()
                .push(label.clone());
        }
        self.inner.update_bot(id, update).await
    }

    async fn get_bot(&self, id: BotId) -> StoreResult<Option<BotRecord>> {
        self.inner.get_bot(id).await
    }

    async fn list_bots(&self, server_id: &str) -> StoreResult<Vec<BotRecord>> {
        self.inner.list_bots(server_id).await
    }

    async fn delete_bot(&self, id: BotId) -> StoreResult<()> {
        self.inner.delete_bot(id).await
    }

    async fn mark_stale_offline(&self, live: &[BotId]) -> StoreResult<u64> {
        self.inner.mark_stale_offline(live).await
    }
}

/// Store that accepts inserts but fails every other call while broken
#[derive(Clone, Default)]
struct FlakyRepository {
    inner: InMemoryBotRepository,
    broken: Arc<AtomicBool>,
}

impl FlakyRepository {
    fn check(&self) -> StoreResult<()> {
        if self.broken.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("connection reset".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl BotRepository for FlakyRepository {
    async fn create_bot(&self, record: &NewBotRecord) -> StoreResult<BotId> {
        self.inner.create_bot(record).await
    }

    async fn update_bot(&self, id: BotId, update: &BotUpdate) -> StoreResult<()> {
        self.check()?;
        self.inner.update_bot(id, update).await
    }

    async fn get_bot(&self, id: BotId) -> StoreResult<Option<BotRecord>> {
        self.check()?;
        self.inner.get_bot(id).await
    }

    async fn list_bots(&self, server_id: &str) -> StoreResult<Vec<BotRecord>> {
        self.check()?;
        self.inner.list_bots(server_id).await
    }

    async fn delete_bot(&self, id: BotId) -> StoreResult<()> {
        self.check()?;
        self.inner.delete_bot(id).await
    }

    async fn mark_stale_offline(&self, live: &[BotId]) -> StoreResult<u64> {
        self.check()?;
        self.inner.mark_stale_offline(live).await
    }
}

fn endpoint() -> ServerEndpoint {
    ServerEndpoint::new("play.example.net", 25566)
}

fn config() -> FleetConfig {
    FleetConfig {
        rng_seed: Some(7),
        ..FleetConfig::default()
    }
}

fn fleet_with(repo: Arc<dyn BotRepository>, driver: &SimulatedDriver) -> FleetManager {
    FleetManager::new(
        config(),
        repo,
        Arc::new(StaticResolver::new(endpoint())),
        Arc::new(driver.clone()),
    )
}

fn fleet() -> (FleetManager, InMemoryBotRepository, SimulatedDriver) {
    let repo = InMemoryBotRepository::new();
    let driver = SimulatedDriver::new();
    let manager = fleet_with(Arc::new(repo.clone()), &driver);
    (manager, repo, driver)
}

async fn stored(repo: &dyn BotRepository, id: BotId) -> BotRecord {
    repo.get_bot(id).await.unwrap().unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_out_of_range_counts_create_nothing() {
    let (manager, repo, driver) = fleet();

    for count in [0, 101] {
        let result = manager
            .create_fleet(&FleetRequest::new("s1", count, "Bot", "never"))
            .await;
        assert!(matches!(result, Err(FleetError::InvalidBotCount { .. })));
    }

    assert!(repo.is_empty().await);
    assert!(driver.attempts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_connect_attempts_are_throttled_through_failures() {
    let (manager, repo, driver) = fleet();
    driver.refuse("Bot2");
    driver.refuse("Bot3");
    let started = Instant::now();

    let creation = manager
        .create_fleet(&FleetRequest::new("s1", 5, "Bot", "never").with_ai(false))
        .await
        .unwrap();

    assert_eq!(creation.created.len(), 5);
    assert_eq!(creation.connected, 3);
    assert_eq!(creation.failed, 2);
    assert_eq!(creation.server_endpoint, endpoint());

    let attempts = driver.attempts();
    assert_eq!(attempts.len(), 5);
    assert!(attempts[0].at - started >= Duration::from_secs(8));
    for pair in attempts.windows(2) {
        assert!(pair[1].at - pair[0].at >= Duration::from_secs(5));
    }
    assert!(attempts.iter().all(|a| a.endpoint == endpoint()));

    let failed = &creation.created[1];
    assert_eq!(failed.username, "Bot2");
    assert_eq!(failed.status, BotStatus::Offline);
    assert_eq!(stored(&repo, failed.id).await.status, BotStatus::Offline);
    assert_eq!(manager.live_count().await, 3);
}

#[tokio::test(start_paused = true)]
async fn test_three_bot_fleet_comes_online_and_moves() {
    let repo = RecordingRepository::default();
    let driver = SimulatedDriver::new();
    let manager = fleet_with(Arc::new(repo.clone()), &driver);

    let creation = manager
        .create_fleet(&FleetRequest::new("s1", 3, "Bot", "never"))
        .await
        .unwrap();
    let usernames: Vec<&str> = creation
        .created
        .iter()
        .map(|r| r.username.as_str())
        .collect();
    assert_eq!(usernames, vec!["Bot1", "Bot2", "Bot3"]);

    // Settle delay, first action and a few more rounds for the last bot
    tokio::time::sleep(Duration::from_secs(60)).await;

    let mut bots = manager.list_bots("s1").await.unwrap();
    bots.sort_by_key(|r| r.id);
    assert_eq!(bots.len(), 3);
    for bot in &bots {
        assert_eq!(bot.status, BotStatus::Online);
        assert!(bot.ai_enabled);
        assert_eq!(bot.expires_at, None);
        assert!(
            repo.labels(bot.id).iter().any(|label| label != "idle"),
            "{} never left idle",
            bot.username
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_bots_without_ai_stay_idle() {
    let repo = RecordingRepository::default();
    let driver = SimulatedDriver::new();
    let manager = fleet_with(Arc::new(repo.clone()), &driver);

    let creation = manager
        .create_fleet(&FleetRequest::new("s1", 1, "Bot", "never").with_ai(false))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(120)).await;

    let id = creation.created[0].id;
    assert!(repo.labels(id).is_empty());
    assert_eq!(driver.session("Bot1").unwrap().control_changes(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_kick_tears_down_only_that_bot() {
    let (manager, repo, driver) = fleet();
    let creation = manager
        .create_fleet(&FleetRequest::new("s1", 2, "Bot", "never"))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(15)).await;

    let bot1 = driver.session("Bot1").unwrap();
    bot1.kick("You have been idle for too long").await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(stored(&repo, creation.created[0].id).await.status, BotStatus::Offline);
    assert_eq!(stored(&repo, creation.created[1].id).await.status, BotStatus::Online);
    assert_eq!(manager.live_count().await, 1);

    let late = bot1.late_calls();
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(bot1.late_calls(), late);
    assert!(driver.session("Bot2").unwrap().is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_connection_error_and_end_mark_offline() {
    let (manager, repo, driver) = fleet();
    let creation = manager
        .create_fleet(&FleetRequest::new("s1", 2, "Bot", "never").with_ai(false))
        .await
        .unwrap();

    driver.session("Bot1").unwrap().fail("ECONNRESET").await;
    driver.session("Bot2").unwrap().end().await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    for record in &creation.created {
        assert_eq!(stored(&repo, record.id).await.status, BotStatus::Offline);
    }
    assert_eq!(manager.live_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_live_count_watch_follows_every_teardown() {
    let (manager, _repo, driver) = fleet();
    let mut live = manager.watch_live_count();
    manager
        .create_fleet(&FleetRequest::new("s1", 3, "Bot", "1m").with_ai(false))
        .await
        .unwrap();
    assert_eq!(*live.borrow_and_update(), 3);

    driver.session("Bot1").unwrap().kick("banned").await;
    driver.session("Bot2").unwrap().fail("ECONNRESET").await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(live.has_changed().unwrap());
    assert_eq!(*live.borrow_and_update(), 1);

    // Bot3 runs out its minute
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(*live.borrow_and_update(), 0);
    assert_eq!(manager.live_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_delete_is_idempotent() {
    let (manager, repo, driver) = fleet();
    let creation = manager
        .create_fleet(&FleetRequest::new("s1", 1, "Bot", "never"))
        .await
        .unwrap();
    let id = creation.created[0].id;
    tokio::time::sleep(Duration::from_secs(20)).await;

    manager.delete_bot(id).await.unwrap();
    let session = driver.session("Bot1").unwrap();
    assert!(!session.is_connected());
    assert_eq!(manager.live_count().await, 0);

    manager.delete_bot(id).await.unwrap();
    let record = stored(&repo, id).await;
    assert_eq!(record.status, BotStatus::Offline);
    assert_eq!(record.behavior, "idle");

    let late = session.late_calls();
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(session.late_calls(), late);
}

#[tokio::test(start_paused = true)]
async fn test_purge_removes_record() {
    let (manager, repo, _driver) = fleet();
    let creation = manager
        .create_fleet(&FleetRequest::new("s1", 1, "Bot", "never"))
        .await
        .unwrap();
    let id = creation.created[0].id;

    manager.purge_bot(id).await.unwrap();

    assert!(repo.get_bot(id).await.unwrap().is_none());
    assert!(matches!(
        manager.delete_bot(id).await,
        Err(FleetError::Store(StoreError::NotFound(_)))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_five_minute_bot_expires_on_time() {
    let (manager, repo, driver) = fleet();
    let creation = manager
        .create_fleet(&FleetRequest::new("s1", 1, "Bot", "5m").with_ai(false))
        .await
        .unwrap();
    let record = &creation.created[0];
    assert_eq!(
        record.expires_at,
        Some(record.created_at + chrono::Duration::minutes(5))
    );

    tokio::time::sleep(Duration::from_secs(280)).await;
    assert_eq!(stored(&repo, record.id).await.status, BotStatus::Online);

    tokio::time::sleep(Duration::from_secs(40)).await;
    assert_eq!(stored(&repo, record.id).await.status, BotStatus::Offline);
    assert!(!driver.session("Bot1").unwrap().is_connected());
    assert_eq!(manager.live_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_never_duration_does_not_expire() {
    let (manager, repo, driver) = fleet();
    let creation = manager
        .create_fleet(&FleetRequest::new("s1", 1, "Bot", "never").with_ai(false))
        .await
        .unwrap();
    let record = &creation.created[0];
    assert_eq!(record.expires_at, None);

    tokio::time::sleep(Duration::from_secs(3 * 24 * 3600)).await;

    assert_eq!(stored(&repo, record.id).await.status, BotStatus::Online);
    assert!(driver.session("Bot1").unwrap().is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_unknown_duration_is_rejected() {
    let (manager, repo, _driver) = fleet();

    let result = manager
        .create_fleet(&FleetRequest::new("s1", 2, "Bot", "forever"))
        .await;

    assert!(matches!(result, Err(FleetError::InvalidDuration(_))));
    assert!(repo.is_empty().await);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_connect_is_rejected() {
    let (manager, _repo, driver) = fleet();
    let creation = manager
        .create_fleet(&FleetRequest::new("s1", 1, "Bot", "never").with_ai(false))
        .await
        .unwrap();

    let result = manager.connect_bot(&creation.created[0], &endpoint()).await;

    assert!(matches!(result, Err(FleetError::AlreadyLive(_))));
    assert_eq!(driver.attempts().len(), 1);
    assert_eq!(manager.live_count().await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_store_outage_does_not_stall_bots() {
    let repo = FlakyRepository::default();
    let driver = SimulatedDriver::new();
    let manager = fleet_with(Arc::new(repo.clone()), &driver);
    repo.broken.store(true, Ordering::SeqCst);

    let creation = manager
        .create_fleet(&FleetRequest::new("s1", 2, "Bot", "never"))
        .await
        .unwrap();
    assert_eq!(creation.connected, 2);

    tokio::time::sleep(Duration::from_secs(90)).await;

    for username in ["Bot1", "Bot2"] {
        let session = driver.session(username).unwrap();
        assert!(session.is_connected());
        assert!(session.control_changes() + session.look_count() > 0);
    }

    let id = creation.created[0].id;
    manager.control_bot(id, ControlAction::Walk).await.unwrap();
    assert!(driver.session("Bot1").unwrap().is_holding(Control::Forward));

    repo.broken.store(false, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(stored(&repo.inner, id).await.status, BotStatus::Online);
}

#[tokio::test(start_paused = true)]
async fn test_control_fleet_reaches_online_bots() {
    let (manager, _repo, driver) = fleet();
    let creation = manager
        .create_fleet(&FleetRequest::new("s1", 3, "Bot", "never").with_ai(false))
        .await
        .unwrap();
    driver.session("Bot3").unwrap().kick("banned").await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let report = manager.control_fleet("s1", ControlAction::Walk).await;
    assert_eq!(report.attempted, 2);
    assert_eq!(report.succeeded, 2);
    assert!(driver.session("Bot1").unwrap().is_holding(Control::Forward));
    assert!(driver.session("Bot2").unwrap().is_holding(Control::Forward));

    let report = manager.control_fleet("other", ControlAction::Walk).await;
    assert_eq!(report.attempted, 0);

    let kicked = creation.created[2].id;
    assert!(matches!(
        manager.control_bot(kicked, ControlAction::Jump).await,
        Err(FleetError::BotNotFound(id)) if id == kicked
    ));
}

#[tokio::test(start_paused = true)]
async fn test_reconcile_marks_orphans_offline() {
    let (manager, repo, _driver) = fleet();
    let mut orphan = NewBotRecord::for_fleet(
        "s1",
        "Old",
        1,
        true,
        fleet_core::DurationToken::Never,
        chrono::Utc::now(),
    )
    .into_record(500);
    orphan.status = BotStatus::Online;
    repo.insert(orphan).await;

    let creation = manager
        .create_fleet(&FleetRequest::new("s1", 1, "Bot", "never").with_ai(false))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(manager.reconcile_orphans().await.unwrap(), 1);
    assert_eq!(stored(&repo, 500).await.status, BotStatus::Offline);
    assert_eq!(
        stored(&repo, creation.created[0].id).await.status,
        BotStatus::Online
    );
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_every_bot() {
    let (manager, repo, driver) = fleet();
    manager
        .create_fleet(&FleetRequest::new("s1", 2, "Bot", "never"))
        .await
        .unwrap();
    manager
        .create_fleet(&FleetRequest::new("s2", 1, "Other", "1h"))
        .await
        .unwrap();
    assert_eq!(manager.live_count().await, 3);

    assert_eq!(manager.shutdown().await, 3);

    assert_eq!(manager.live_count().await, 0);
    for username in ["Bot1", "Bot2", "Other1"] {
        assert!(!driver.session(username).unwrap().is_connected());
    }
    let s1 = manager.list_bots("s1").await.unwrap();
    assert!(s1.iter().all(|r| r.status == BotStatus::Offline));
    assert_eq!(repo.len().await, 3);
}
