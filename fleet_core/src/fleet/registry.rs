//! Registry of live bot handles.

use std::{collections::HashMap, sync::Arc};
use tokio::sync::{RwLock, watch};

use super::errors::{FleetError, FleetResult};
use crate::bot::{BotHandle, BotId};

/// Live bots by id
///
/// Holds at most one handle per id. An entry is inserted before its
/// connection is opened and removed by the bot's own teardown. Every change
/// publishes the new entry count to [`LiveRegistry::watch_len`] receivers.
#[derive(Clone)]
pub struct LiveRegistry {
    bots: Arc<RwLock<HashMap<BotId, BotHandle>>>,
    count: Arc<watch::Sender<usize>>,
}

impl Default for LiveRegistry {
    fn default() -> Self {
        Self {
            bots: Arc::default(),
            count: Arc::new(watch::Sender::new(0)),
        }
    }
}

impl LiveRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receiver of the entry count, updated on every insert and remove
    pub fn watch_len(&self) -> watch::Receiver<usize> {
        self.count.subscribe()
    }

    /// Reserve the slot of `handle`'s bot
    ///
    /// # Returns
    ///
    /// * `FleetResult<()>` - `AlreadyLive` if the id already has an entry
    pub async fn insert(&self, handle: BotHandle) -> FleetResult<()> {
        let mut bots = self.bots.write().await;
        if bots.contains_key(&handle.id()) {
            return Err(FleetError::AlreadyLive(handle.id()));
        }
        bots.insert(handle.id(), handle);
        self.count.send_replace(bots.len());
        Ok(())
    }

    pub async fn remove(&self, id: BotId) -> Option<BotHandle> {
        let mut bots = self.bots.write().await;
        let removed = bots.remove(&id);
        self.count.send_replace(bots.len());
        removed
    }

    /// Remove the entry of `handle`'s bot only if it still belongs to `handle`
    ///
    /// # Returns
    ///
    /// * `bool` - Whether an entry was removed
    pub async fn remove_handle(&self, handle: &BotHandle) -> bool {
        let mut bots = self.bots.write().await;
        match bots.get(&handle.id()) {
            Some(current) if current.same_actor(handle) => {
                bots.remove(&handle.id());
                self.count.send_replace(bots.len());
                true
            }
            _ => false,
        }
    }

    pub async fn get(&self, id: BotId) -> Option<BotHandle> {
        self.bots.read().await.get(&id).cloned()
    }

    pub async fn contains(&self, id: BotId) -> bool {
        self.bots.read().await.contains_key(&id)
    }

    /// Ids of every live bot, ascending
    pub async fn ids(&self) -> Vec<BotId> {
        let mut ids: Vec<BotId> = self.bots.read().await.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Handles of the live bots on `server_id`
    pub async fn for_server(&self, server_id: &str) -> Vec<BotHandle> {
        self.bots
            .read()
            .await
            .values()
            .filter(|handle| handle.server_id() == server_id)
            .cloned()
            .collect()
    }

    pub async fn all(&self) -> Vec<BotHandle> {
        self.bots.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.bots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.bots.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_duplicate_insert_is_rejected() {
        let registry = LiveRegistry::new();
        let (first, _inbox1) = BotHandle::new(1, "s1", "Bot1");
        let (second, _inbox2) = BotHandle::new(1, "s1", "Bot1");

        registry.insert(first).await.unwrap();
        let result = registry.insert(second).await;

        assert!(matches!(result, Err(FleetError::AlreadyLive(1))));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_filter_by_server() {
        let registry = LiveRegistry::new();
        let mut inboxes = Vec::new();
        for (id, server) in [(3, "s1"), (1, "s1"), (2, "s2")] {
            let (handle, inbox) = BotHandle::new(id, server, &format!("Bot{id}"));
            inboxes.push(inbox);
            registry.insert(handle).await.unwrap();
        }

        let mut s1: Vec<BotId> = registry.for_server("s1").await.iter().map(|h| h.id()).collect();
        s1.sort_unstable();
        assert_eq!(s1, vec![1, 3]);
        assert_eq!(registry.ids().await, vec![1, 2, 3]);

        assert!(registry.remove(2).await.is_some());
        assert!(registry.remove(2).await.is_none());
        assert!(!registry.contains(2).await);
        assert!(registry.for_server("s2").await.is_empty());
    }

    #[tokio::test]
    async fn test_count_follows_inserts_and_removals() {
        let registry = LiveRegistry::new();
        let mut count = registry.watch_len();
        assert_eq!(*count.borrow_and_update(), 0);

        let (first, _inbox1) = BotHandle::new(1, "s1", "Bot1");
        let (second, _inbox2) = BotHandle::new(2, "s1", "Bot2");
        registry.insert(first.clone()).await.unwrap();
        registry.insert(second).await.unwrap();
        assert!(count.has_changed().unwrap());
        assert_eq!(*count.borrow_and_update(), 2);

        registry.remove(2).await;
        assert_eq!(*count.borrow_and_update(), 1);
        registry.remove_handle(&first).await;
        assert_eq!(*count.borrow_and_update(), 0);
    }

    #[tokio::test]
    async fn test_stale_handle_leaves_successor_entry() {
        let registry = LiveRegistry::new();
        let (old, _old_inbox) = BotHandle::new(7, "s1", "Bot7");
        registry.insert(old.clone()).await.unwrap();
        registry.remove(7).await;

        let (new, _new_inbox) = BotHandle::new(7, "s1", "Bot7");
        registry.insert(new.clone()).await.unwrap();

        assert!(!registry.remove_handle(&old).await);
        assert!(registry.contains(7).await);

        assert!(registry.remove_handle(&new).await);
        assert!(!registry.contains(7).await);
        assert!(!registry.remove_handle(&new).await);
    }
}
