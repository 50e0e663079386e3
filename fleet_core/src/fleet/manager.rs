//! Fleet manager for spawning, controlling and tearing down bots.

use chrono::Utc;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tokio::sync::watch;

use super::{
    config::FleetConfig,
    errors::{FleetError, FleetResult},
    registry::LiveRegistry,
};
use crate::{
    allocation::{AllocationResolver, ServerEndpoint},
    bot::{
        BotContext, BotHandle, BotId, BotRecord, BotStatus, BotUpdate, ControlAction,
        DurationToken, NewBotRecord, StateSync, StopReason, bot_username, connect_bot,
    },
    db::{BotRepository, StoreError},
    driver::GameClientDriver,
};

fn default_duration() -> String {
    DurationToken::Never.as_str().to_string()
}

fn default_ai_enabled() -> bool {
    true
}

/// Request to put a fleet of bots on a server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetRequest {
    pub server_id: String,
    pub bot_count: i64,
    pub username_prefix: String,

    /// Duration token, `never` when omitted
    #[serde(default = "default_duration")]
    pub duration: String,

    #[serde(default = "default_ai_enabled")]
    pub ai_enabled: bool,
}

impl FleetRequest {
    pub fn new(server_id: &str, bot_count: i64, username_prefix: &str, duration: &str) -> Self {
        Self {
            server_id: server_id.to_string(),
            bot_count,
            username_prefix: username_prefix.to_string(),
            duration: duration.to_string(),
            ai_enabled: true,
        }
    }

    pub fn with_ai(mut self, ai_enabled: bool) -> Self {
        self.ai_enabled = ai_enabled;
        self
    }
}

/// Validated request with its resolved endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FleetPlan {
    pub server_id: String,
    pub bot_count: u32,
    pub username_prefix: String,
    pub duration: DurationToken,
    pub ai_enabled: bool,
    pub endpoint: ServerEndpoint,
}

impl FleetPlan {
    /// Usernames the batch will use, in spawn order
    pub fn usernames(&self) -> Vec<String> {
        (1..=self.bot_count)
            .map(|index| bot_username(&self.username_prefix, index))
            .collect()
    }
}

/// Outcome of a finished batch
#[derive(Debug, Clone, Serialize)]
pub struct FleetCreation {
    /// Records inserted, with their status as of the connect attempt
    pub created: Vec<BotRecord>,
    pub server_endpoint: ServerEndpoint,
    pub connected: u32,
    pub failed: u32,
}

/// Outcome of a fleet-wide control directive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FleetControlReport {
    /// Online bots the directive was sent to
    pub attempted: usize,
    /// Bots that applied it
    pub succeeded: usize,
}

impl FleetControlReport {
    /// Bots that were addressed but did not apply the directive
    pub fn rejected(&self) -> usize {
        self.attempted.saturating_sub(self.succeeded)
    }
}

/// Fleet manager
///
/// Cheap to clone; clones share the registry and collaborators.
#[derive(Clone)]
pub struct FleetManager {
    /// Timing and limits
    config: Arc<FleetConfig>,

    /// Persistent bot records
    repo: Arc<dyn BotRepository>,

    /// Server id to connection endpoint
    resolver: Arc<dyn AllocationResolver>,

    /// Game-client connection factory
    driver: Arc<dyn GameClientDriver>,

    /// Live bot handles
    registry: LiveRegistry,

    /// Best-effort state writer shared with every bot
    sync: StateSync,
}

impl FleetManager {
    /// Create a new fleet manager
    ///
    /// # Arguments
    ///
    /// * `config` - Fleet timing and limits
    /// * `repo` - Bot record store
    /// * `resolver` - Allocation resolver
    /// * `driver` - Game-client driver
    ///
    /// # Returns
    ///
    /// * `FleetManager` - New fleet manager instance
    pub fn new(
        config: FleetConfig,
        repo: Arc<dyn BotRepository>,
        resolver: Arc<dyn AllocationResolver>,
        driver: Arc<dyn GameClientDriver>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            sync: StateSync::new(repo.clone()),
            repo,
            resolver,
            driver,
            registry: LiveRegistry::new(),
        }
    }

    pub fn config(&self) -> &FleetConfig {
        &self.config
    }

    pub fn repository(&self) -> &Arc<dyn BotRepository> {
        &self.repo
    }

    /// Validate a request and resolve its endpoint
    ///
    /// Nothing is written and nothing is connected; an invalid request fails
    /// here before any side effect.
    ///
    /// # Arguments
    ///
    /// * `request` - Fleet request
    ///
    /// # Returns
    ///
    /// * `FleetResult<FleetPlan>` - Plan to hand to [`spawn_fleet`](Self::spawn_fleet)
    pub async fn plan_fleet(&self, request: &FleetRequest) -> FleetResult<FleetPlan> {
        let max = self.config.max_bots;
        if request.bot_count < 1 || request.bot_count > i64::from(max) {
            return Err(FleetError::InvalidBotCount {
                count: request.bot_count,
                max,
            });
        }

        let username_prefix = request.username_prefix.trim();
        if username_prefix.is_empty() {
            return Err(FleetError::EmptyPrefix);
        }

        let duration: DurationToken = request
            .duration
            .parse()
            .map_err(|_| FleetError::InvalidDuration(request.duration.clone()))?;

        let endpoint = self.resolver.resolve(&request.server_id).await;

        Ok(FleetPlan {
            server_id: request.server_id.clone(),
            bot_count: request.bot_count as u32,
            username_prefix: username_prefix.to_string(),
            duration,
            ai_enabled: request.ai_enabled,
            endpoint,
        })
    }

    /// Insert and connect the bots of a plan, one at a time
    ///
    /// Every connect attempt is preceded by the spawn delay (plus warm-up for
    /// the first), whether or not the previous attempt succeeded. A failing
    /// bot is recorded offline and the batch moves on.
    ///
    /// # Arguments
    ///
    /// * `plan` - Validated plan from [`plan_fleet`](Self::plan_fleet)
    ///
    /// # Returns
    ///
    /// * `FleetCreation` - Inserted records and connect counts
    pub async fn spawn_fleet(&self, plan: FleetPlan) -> FleetCreation {
        log::info!(
            "Spawning {} bots '{}' on server {} via {}",
            plan.bot_count,
            plan.username_prefix,
            plan.server_id,
            plan.endpoint
        );

        let mut created = Vec::with_capacity(plan.bot_count as usize);
        let mut connected = 0;
        let mut failed = 0;

        for index in 1..=plan.bot_count {
            let new_record = NewBotRecord::for_fleet(
                &plan.server_id,
                &plan.username_prefix,
                index,
                plan.ai_enabled,
                plan.duration,
                Utc::now(),
            );
            let username = new_record.username.clone();

            let record = match self.repo.create_bot(&new_record).await {
                Ok(id) => Some(new_record.into_record(id)),
                Err(e) => {
                    log::error!("Failed to create record for {}: {}", username, e);
                    None
                }
            };

            tokio::time::sleep(self.config.delay_before(index)).await;

            let Some(mut record) = record else {
                failed += 1;
                continue;
            };

            match self.connect_bot(&record, &plan.endpoint).await {
                Ok(_) => connected += 1,
                Err(e) => {
                    log::error!("Failed to spawn bot {} ({}): {}", record.id, username, e);
                    self.sync.mark_offline(record.id).await;
                    record.status = BotStatus::Offline;
                    failed += 1;
                }
            }
            created.push(record);
        }

        log::info!(
            "Fleet on server {} finished: {} connected, {} failed",
            plan.server_id,
            connected,
            failed
        );

        FleetCreation {
            created,
            server_endpoint: plan.endpoint,
            connected,
            failed,
        }
    }

    /// Create a fleet and wait for the whole batch
    pub async fn create_fleet(&self, request: &FleetRequest) -> FleetResult<FleetCreation> {
        let plan = self.plan_fleet(request).await?;
        Ok(self.spawn_fleet(plan).await)
    }

    /// Connect one persisted bot and start its actor
    pub async fn connect_bot(
        &self,
        record: &BotRecord,
        endpoint: &ServerEndpoint,
    ) -> FleetResult<BotHandle> {
        connect_bot(
            record,
            endpoint,
            self.driver.as_ref(),
            self.config.connect_timeout,
            self.bot_context(),
        )
        .await
    }

    /// Expected wall-clock time of a batch of `bot_count` bots
    pub fn estimate_spawn_duration(&self, bot_count: u32) -> Duration {
        self.config.warmup_delay + self.config.spawn_delay * bot_count
    }

    /// Persisted bots of a server
    pub async fn list_bots(&self, server_id: &str) -> FleetResult<Vec<BotRecord>> {
        Ok(self.repo.list_bots(server_id).await?)
    }

    /// Persisted record of one bot
    pub async fn get_bot(&self, id: BotId) -> FleetResult<BotRecord> {
        self.repo
            .get_bot(id)
            .await?
            .ok_or(FleetError::Store(StoreError::NotFound(id)))
    }

    /// Apply an operator directive to one online bot
    ///
    /// # Returns
    ///
    /// * `FleetResult<()>` - `BotNotFound` if the bot is not live and online
    pub async fn control_bot(&self, id: BotId, action: ControlAction) -> FleetResult<()> {
        let handle = self
            .registry
            .get(id)
            .await
            .ok_or(FleetError::BotNotFound(id))?;

        if handle.control(action).await {
            log::info!("Bot {} ({}) control: {}", id, handle.username(), action);
            Ok(())
        } else {
            Err(FleetError::BotNotFound(id))
        }
    }

    /// Apply an operator directive to every online bot of a server
    ///
    /// Bots are driven concurrently; the report counts each outcome.
    pub async fn control_fleet(&self, server_id: &str, action: ControlAction) -> FleetControlReport {
        let handles: Vec<BotHandle> = self
            .registry
            .for_server(server_id)
            .await
            .into_iter()
            .filter(BotHandle::is_online)
            .collect();

        let results = join_all(handles.iter().map(|handle| handle.control(action))).await;
        let report = FleetControlReport {
            attempted: handles.len(),
            succeeded: results.into_iter().filter(|applied| *applied).count(),
        };

        log::info!(
            "Fleet control '{}' on server {}: {}/{} applied",
            action,
            server_id,
            report.succeeded,
            report.attempted
        );
        report
    }

    /// Disconnect a bot and mark its record offline
    ///
    /// Waits for the live instance (if any) to finish its teardown. Calling it
    /// again for the same bot only rewrites the offline status.
    ///
    /// # Returns
    ///
    /// * `FleetResult<()>` - Store `NotFound` if no record exists
    pub async fn delete_bot(&self, id: BotId) -> FleetResult<()> {
        if let Some(handle) = self.registry.get(id).await {
            handle.stop(StopReason::Deleted).await;
            // Teardown already released the slot; never touch a reconnect's entry
            self.registry.remove_handle(&handle).await;
        }

        self.repo.update_bot(id, &BotUpdate::offline()).await?;

        log::info!("Bot {} deleted", id);
        Ok(())
    }

    /// Delete a bot and remove its record
    pub async fn purge_bot(&self, id: BotId) -> FleetResult<()> {
        self.delete_bot(id).await?;
        self.repo.delete_bot(id).await?;
        log::info!("Bot {} purged", id);
        Ok(())
    }

    /// Mark persisted bots without a live instance offline
    ///
    /// Meant for startup, when records left `online` by a previous process
    /// have no connection behind them.
    ///
    /// # Returns
    ///
    /// * `FleetResult<u64>` - Number of records corrected
    pub async fn reconcile_orphans(&self) -> FleetResult<u64> {
        let live = self.registry.ids().await;
        let fixed = self.repo.mark_stale_offline(&live).await?;
        if fixed > 0 {
            log::info!("Marked {} orphaned bots offline", fixed);
        }
        Ok(fixed)
    }

    /// Stop every live bot
    ///
    /// # Returns
    ///
    /// * `usize` - Number of bots stopped
    pub async fn shutdown(&self) -> usize {
        let handles = self.registry.all().await;
        log::info!("Stopping {} live bots", handles.len());

        join_all(
            handles
                .iter()
                .map(|handle| handle.stop(StopReason::Shutdown)),
        )
        .await;

        for handle in &handles {
            self.registry.remove_handle(handle).await;
        }
        handles.len()
    }

    /// Number of bots with a live entry
    pub async fn live_count(&self) -> usize {
        self.registry.len().await
    }

    /// Receiver that observes every change of [`FleetManager::live_count`]
    pub fn watch_live_count(&self) -> watch::Receiver<usize> {
        self.registry.watch_len()
    }

    /// Live handle of a bot
    pub async fn live_bot(&self, id: BotId) -> Option<BotHandle> {
        self.registry.get(id).await
    }

    fn bot_context(&self) -> BotContext {
        BotContext {
            sync: self.sync.clone(),
            registry: self.registry.clone(),
            timings: self.config.bot_timings(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::StaticResolver;
    use crate::db::InMemoryBotRepository;
    use crate::driver::SimulatedDriver;

    fn manager() -> (FleetManager, InMemoryBotRepository) {
        let repo = InMemoryBotRepository::new();
        let manager = FleetManager::new(
            FleetConfig::default(),
            Arc::new(repo.clone()),
            Arc::new(StaticResolver::new(ServerEndpoint::new("mc.example", 25570))),
            Arc::new(SimulatedDriver::new()),
        );
        (manager, repo)
    }

    #[tokio::test]
    async fn test_plan_trims_prefix_and_parses_duration() {
        let (manager, _) = manager();
        let plan = manager
            .plan_fleet(&FleetRequest::new("s1", 2, "  Bot ", "5m").with_ai(false))
            .await
            .unwrap();

        assert_eq!(plan.username_prefix, "Bot");
        assert_eq!(plan.duration, DurationToken::FiveMinutes);
        assert!(!plan.ai_enabled);
        assert_eq!(plan.endpoint, ServerEndpoint::new("mc.example", 25570));
        assert_eq!(plan.usernames(), vec!["Bot1", "Bot2"]);
    }

    #[tokio::test]
    async fn test_plan_rejects_invalid_requests() {
        let (manager, repo) = manager();

        for count in [0, -1, 101] {
            let result = manager.plan_fleet(&FleetRequest::new("s1", count, "Bot", "never")).await;
            assert!(matches!(result, Err(FleetError::InvalidBotCount { .. })));
        }

        let result = manager.plan_fleet(&FleetRequest::new("s1", 1, "   ", "never")).await;
        assert!(matches!(result, Err(FleetError::EmptyPrefix)));

        let result = manager.plan_fleet(&FleetRequest::new("s1", 1, "Bot", "2w")).await;
        assert!(matches!(result, Err(FleetError::InvalidDuration(d)) if d == "2w"));

        assert!(repo.is_empty().await);
    }

    #[test]
    fn test_estimate_spawn_duration() {
        let (manager, _) = manager();
        assert_eq!(manager.estimate_spawn_duration(1), Duration::from_secs(8));
        assert_eq!(manager.estimate_spawn_duration(100), Duration::from_secs(503));
    }

    #[tokio::test]
    async fn test_request_defaults_from_json() {
        let request: FleetRequest =
            serde_json::from_str(r#"{"server_id":"s1","bot_count":3,"username_prefix":"Bot"}"#)
                .unwrap();
        assert_eq!(request.duration, "never");
        assert!(request.ai_enabled);
    }

    #[tokio::test]
    async fn test_control_unknown_bot_is_not_found() {
        let (manager, _) = manager();
        let result = manager.control_bot(9, ControlAction::Jump).await;
        assert!(matches!(result, Err(FleetError::BotNotFound(9))));

        let report = manager.control_fleet("s1", ControlAction::Stop).await;
        assert_eq!(report, FleetControlReport::default());
    }

    #[test]
    fn test_control_report_rejected_count() {
        let report = FleetControlReport {
            attempted: 5,
            succeeded: 3,
        };
        assert_eq!(report.rejected(), 2);
        assert_eq!(FleetControlReport::default().rejected(), 0);
    }

    #[tokio::test]
    async fn test_delete_unknown_bot_reports_store_not_found() {
        let (manager, _) = manager();
        let result = manager.delete_bot(77).await;
        assert!(matches!(
            result,
            Err(FleetError::Store(crate::db::StoreError::NotFound(77)))
        ));
    }
}
