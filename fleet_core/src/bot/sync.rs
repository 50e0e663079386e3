//! Best-effort mirroring of live bot state into the store.
//!
//! Nothing here returns an error. A failed write is logged and dropped so a
//! storage outage can never stall or kill a bot's connection loop; the
//! persisted view simply lags until the next successful write.

use std::sync::Arc;

use super::models::{BotId, BotUpdate};
use crate::db::BotRepository;

/// State synchronizer shared by a bot's actor and behavior task
#[derive(Clone)]
pub struct StateSync {
    repo: Arc<dyn BotRepository>,
}

impl StateSync {
    pub fn new(repo: Arc<dyn BotRepository>) -> Self {
        Self { repo }
    }

    /// Store the synchronizer writes through
    pub fn repository(&self) -> &Arc<dyn BotRepository> {
        &self.repo
    }

    /// Fire-and-forget write; the caller never waits on the store
    pub fn sync_update(&self, id: BotId, update: BotUpdate) {
        let repo = self.repo.clone();
        tokio::spawn(async move {
            if let Err(e) = repo.update_bot(id, &update).await {
                log::warn!("Dropped state update for bot {}: {}", id, e);
            }
        });
    }

    /// Status write awaited by the owning actor so one bot's transitions
    /// reach the store in order; failures are still only logged
    pub async fn sync_status(&self, id: BotId, update: BotUpdate) {
        let status = update.status.map_or_else(|| "-".to_string(), |s| s.to_string());
        if let Err(e) = self.repo.update_bot(id, &update).await {
            log::warn!("Dropped status '{}' for bot {}: {}", status, id, e);
        }
    }

    /// Shorthand for marking a bot offline
    pub async fn mark_offline(&self, id: BotId) {
        self.sync_status(id, BotUpdate::offline()).await;
    }
}
