//! Process-local correlation store.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use super::{CorrelationRecord, CorrelationStore};
use crate::error::StoreError;

struct Entry {
    record: CorrelationRecord,
    deadline: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now <= self.deadline
    }
}

/// In-memory [`CorrelationStore`] with per-key deadlines.
///
/// Expired entries are never returned; they are physically removed by
/// [`MemoryCorrelationStore::purge_expired`].
#[derive(Clone, Default)]
pub struct MemoryCorrelationStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl MemoryCorrelationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired entry, returning how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }

    /// Number of entries currently held, expired or not.
    pub async fn entry_count(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl CorrelationStore for MemoryCorrelationStore {
    async fn set(
        &self,
        key: &str,
        record: CorrelationRecord,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let deadline = Instant::now() + ttl;
        self.entries
            .write()
            .await
            .insert(key.to_string(), Entry { record, deadline });
        debug!(key = %key, ttl_secs = ttl.as_secs(), "correlation_set");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<CorrelationRecord>, StoreError> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.record.clone()))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        match entries.get_mut(key) {
            Some(entry) if entry.is_live(now) => {
                entry.deadline = now + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// Periodically purge expired records until the task is aborted.
pub fn spawn_sweeper(store: MemoryCorrelationStore, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let removed = store.purge_expired().await;
            if removed > 0 {
                info!(removed = removed, "correlation_records_purged");
            }
        }
    })
}
