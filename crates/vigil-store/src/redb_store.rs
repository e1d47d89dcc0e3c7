//! RedbStore: redb-backed counter store.
//!
//! Values are wrapped in a JSON envelope carrying their absolute expiry,
//! written into a single `&str → &[u8]` table. Expired rows read as absent
//! and are reclaimed by [`CounterStore::purge_expired`]. Supports both an
//! on-disk file and redb's in-memory backend (the latter for testing).

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use vigil_core::{Clock, SystemClock};

use crate::error::{StoreError, StoreResult};
use crate::store::{CounterStore, Entry};
use crate::tables::ENTRIES;

/// Convert any `Display` error into a `StoreError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StoreError::$variant(e.to_string())
    };
}

/// Thread-safe counter store backed by redb.
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
}

impl RedbStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self {
            db: Arc::new(db),
            clock: Arc::new(SystemClock),
        };
        store.ensure_tables()?;
        debug!(?path, "redb counter store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self {
            db: Arc::new(db),
            clock: Arc::new(SystemClock),
        };
        store.ensure_tables()?;
        debug!("in-memory redb counter store opened");
        Ok(store)
    }

    /// Replace the clock used for expiry.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn ensure_tables(&self) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(ENTRIES).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn write_entry(&self, key: &str, entry: &Entry) -> StoreResult<()> {
        let value = serde_json::to_vec(entry).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(ENTRIES).map_err(map_err!(Table))?;
            table
                .insert(key, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn read_entry(&self, key: &str) -> StoreResult<Option<Entry>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ENTRIES).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let entry: Entry =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl CounterStore for RedbStore {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let entry = Entry::with_ttl(value.to_string(), self.clock.now_millis(), ttl);
        self.write_entry(key, &entry)
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let now = self.clock.now_millis();
        Ok(self
            .read_entry(key)?
            .filter(|e| !e.is_expired(now))
            .map(|e| e.value))
    }

    async fn increment(&self, key: &str) -> StoreResult<i64> {
        let now = self.clock.now_millis();
        // Read and write inside one write transaction so increments from
        // this process never interleave.
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let next;
        {
            let mut table = txn.open_table(ENTRIES).map_err(map_err!(Table))?;
            let existing: Option<Entry> = match table.get(key).map_err(map_err!(Read))? {
                Some(guard) => {
                    Some(serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?)
                }
                None => None,
            };
            let entry = match existing {
                Some(mut entry) if !entry.is_expired(now) => {
                    next = entry.increment(key)?;
                    entry
                }
                _ => {
                    next = 1;
                    Entry {
                        value: "1".to_string(),
                        expires_at: None,
                    }
                }
            };
            let value = serde_json::to_vec(&entry).map_err(map_err!(Serialize))?;
            table
                .insert(key, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(next)
    }

    async fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<(String, String)>> {
        let now = self.clock.now_millis();
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ENTRIES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for item in table.range(prefix..).map_err(map_err!(Read))? {
            let (key, value) = item.map_err(map_err!(Read))?;
            let key = key.value();
            if !key.starts_with(prefix) {
                break;
            }
            let entry: Entry =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            if !entry.is_expired(now) {
                results.push((key.to_string(), entry.value));
            }
        }
        Ok(results)
    }

    async fn ping(&self) -> StoreResult<()> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        txn.open_table(ENTRIES).map_err(map_err!(Table))?;
        Ok(())
    }

    async fn purge_expired(&self) -> StoreResult<usize> {
        let now = self.clock.now_millis();
        // Collect keys in a read transaction first.
        let keys: Vec<String> = {
            let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
            let table = txn.open_table(ENTRIES).map_err(map_err!(Table))?;
            table
                .iter()
                .map_err(map_err!(Read))?
                .filter_map(|item| {
                    let (key, value) = item.ok()?;
                    let entry: Entry = serde_json::from_slice(value.value()).ok()?;
                    entry.is_expired(now).then(|| key.value().to_string())
                })
                .collect()
        };
        if keys.is_empty() {
            return Ok(0);
        }
        // Delete in a write transaction, re-checking expiry in case a key
        // was rewritten in between.
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let mut purged = 0;
        {
            let mut table = txn.open_table(ENTRIES).map_err(map_err!(Table))?;
            for key in &keys {
                let still_expired = match table.get(key.as_str()).map_err(map_err!(Read))? {
                    Some(guard) => serde_json::from_slice::<Entry>(guard.value())
                        .map(|e| e.is_expired(now))
                        .unwrap_or(true),
                    None => false,
                };
                if still_expired {
                    table.remove(key.as_str()).map_err(map_err!(Write))?;
                    purged += 1;
                }
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(purged, "redb counter store purged expired entries");
        Ok(purged)
    }
}
