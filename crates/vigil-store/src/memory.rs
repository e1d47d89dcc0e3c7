//! In-process counter store.
//!
//! A `BTreeMap` behind a tokio `RwLock`. Expiry is checked lazily on read
//! against the injected clock, so tests can step time forward with
//! [`vigil_core::ManualClock`] instead of sleeping.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use vigil_core::{Clock, SystemClock};

use crate::error::StoreResult;
use crate::store::{CounterStore, Entry};

#[derive(Clone)]
pub struct MemoryStore {
    entries: Arc<RwLock<BTreeMap<String, Entry>>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(BTreeMap::new())),
            clock,
        }
    }

    /// Number of stored entries, expired ones included until purged.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Remaining time to live for `key`, `None` if absent or without expiry.
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let now = self.clock.now_millis();
        let entries = self.entries.read().await;
        let entry = entries.get(key).filter(|e| !e.is_expired(now))?;
        entry
            .expires_at
            .map(|at| Duration::from_millis(at.saturating_sub(now)))
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let entry = Entry::with_ttl(value.to_string(), self.clock.now_millis(), ttl);
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let now = self.clock.now_millis();
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|e| !e.is_expired(now))
            .map(|e| e.value.clone()))
    }

    async fn increment(&self, key: &str) -> StoreResult<i64> {
        let now = self.clock.now_millis();
        let mut entries = self.entries.write().await;
        match entries.get_mut(key) {
            Some(entry) if !entry.is_expired(now) => entry.increment(key),
            _ => {
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: "1".to_string(),
                        expires_at: None,
                    },
                );
                Ok(1)
            }
        }
    }

    async fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<(String, String)>> {
        let now = self.clock.now_millis();
        let entries = self.entries.read().await;
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .filter(|(_, e)| !e.is_expired(now))
            .map(|(k, e)| (k.clone(), e.value.clone()))
            .collect())
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn purge_expired(&self) -> StoreResult<usize> {
        let now = self.clock.now_millis();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired(now));
        let purged = before - entries.len();
        if purged > 0 {
            debug!(purged, "memory store purged expired entries");
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use vigil_core::ManualClock;

    fn store_at(start: u64) -> (MemoryStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start));
        (MemoryStore::with_clock(clock.clone()), clock)
    }

    #[tokio::test]
    async fn set_and_get() {
        let (store, _) = store_at(0);
        store.set("a", "1", Duration::from_secs(10)).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some("1".to_string()));
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn expired_key_reads_as_absent() {
        let (store, clock) = store_at(0);
        store.set("a", "1", Duration::from_secs(10)).await.unwrap();

        clock.advance(Duration::from_secs(9));
        assert!(store.get("a").await.unwrap().is_some());

        clock.advance(Duration::from_secs(1));
        assert!(store.get("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn increment_creates_then_counts() {
        let (store, _) = store_at(0);
        assert_eq!(store.increment("c").await.unwrap(), 1);
        assert_eq!(store.increment("c").await.unwrap(), 2);
        // Created without expiry.
        assert_eq!(store.ttl("c").await, None);
    }

    #[tokio::test]
    async fn increment_keeps_existing_expiry() {
        let (store, clock) = store_at(0);
        store.set("c", "4", Duration::from_secs(60)).await.unwrap();
        clock.advance(Duration::from_secs(10));

        assert_eq!(store.increment("c").await.unwrap(), 5);
        assert_eq!(store.ttl("c").await, Some(Duration::from_secs(50)));
    }

    #[tokio::test]
    async fn increment_after_expiry_restarts() {
        let (store, clock) = store_at(0);
        store.set("c", "9", Duration::from_secs(5)).await.unwrap();
        clock.advance(Duration::from_secs(5));
        assert_eq!(store.increment("c").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn increment_non_integer_fails() {
        let (store, _) = store_at(0);
        store.set("j", "{\"a\":1}", Duration::from_secs(5)).await.unwrap();
        assert!(matches!(
            store.increment("j").await,
            Err(StoreError::NotInteger(_))
        ));
    }

    #[tokio::test]
    async fn scan_prefix_is_ordered_and_skips_expired() {
        let (store, clock) = store_at(0);
        store.set("p:b", "2", Duration::from_secs(100)).await.unwrap();
        store.set("p:a", "1", Duration::from_secs(100)).await.unwrap();
        store.set("p:c", "3", Duration::from_secs(1)).await.unwrap();
        store.set("q:a", "x", Duration::from_secs(100)).await.unwrap();
        clock.advance(Duration::from_secs(2));

        let found = store.scan_prefix("p:").await.unwrap();
        assert_eq!(
            found,
            vec![
                ("p:a".to_string(), "1".to_string()),
                ("p:b".to_string(), "2".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn purge_removes_only_expired() {
        let (store, clock) = store_at(0);
        store.set("short", "1", Duration::from_secs(1)).await.unwrap();
        store.set("long", "1", Duration::from_secs(100)).await.unwrap();
        store.increment("forever").await.unwrap();
        clock.advance(Duration::from_secs(2));

        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert_eq!(store.len().await, 2);
        assert!(store.get("long").await.unwrap().is_some());
    }
}
