//! In-process bot store.
//!
//! Backs the server when no `DATABASE_URL` is configured and the test suites.
//! Records are lost on restart.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{
    errors::{StoreError, StoreResult},
    repository::BotRepository,
};
use crate::bot::{BotId, BotRecord, BotStatus, BotUpdate, IDLE_BEHAVIOR, NewBotRecord};

#[derive(Default)]
struct Inner {
    records: BTreeMap<BotId, BotRecord>,
    next_id: BotId,
}

/// In-memory implementation of `BotRepository`
#[derive(Clone, Default)]
pub struct InMemoryBotRepository {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryBotRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record as-is (keeps its id)
    pub async fn insert(&self, record: BotRecord) {
        let mut inner = self.inner.write().await;
        inner.next_id = inner.next_id.max(record.id);
        inner.records.insert(record.id, record);
    }

    /// Number of stored records across all servers
    pub async fn len(&self) -> usize {
        self.inner.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl BotRepository for InMemoryBotRepository {
    async fn create_bot(&self, record: &NewBotRecord) -> StoreResult<BotId> {
        let mut inner = self.inner.write().await;
        inner.next_id += 1;
        let id = inner.next_id;
        inner.records.insert(id, record.clone().into_record(id));
        Ok(id)
    }

    async fn update_bot(&self, id: BotId, update: &BotUpdate) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let record = inner.records.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        update.apply_to(record);
        Ok(())
    }

    async fn get_bot(&self, id: BotId) -> StoreResult<Option<BotRecord>> {
        Ok(self.inner.read().await.records.get(&id).cloned())
    }

    async fn list_bots(&self, server_id: &str) -> StoreResult<Vec<BotRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .records
            .values()
            .filter(|r| r.server_id == server_id)
            .cloned()
            .collect())
    }

    async fn delete_bot(&self, id: BotId) -> StoreResult<()> {
        self.inner.write().await.records.remove(&id);
        Ok(())
    }

    async fn mark_stale_offline(&self, live: &[BotId]) -> StoreResult<u64> {
        let mut inner = self.inner.write().await;
        let mut changed = 0;
        for record in inner.records.values_mut() {
            if record.status != BotStatus::Offline && !live.contains(&record.id) {
                record.status = BotStatus::Offline;
                record.behavior = IDLE_BEHAVIOR.to_string();
                changed += 1;
            }
        }
        Ok(changed)
    }
}
