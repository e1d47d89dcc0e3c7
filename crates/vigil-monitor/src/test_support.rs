//! Shared fixtures for unit tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use vigil_core::config::RetentionConfig;
use vigil_core::ManualClock;
use vigil_store::{CounterStore, MemoryStore, StoreError, StoreResult};

use crate::audit::{AuditEntry, AuditError, AuditTrail};
use crate::repository::Repository;

pub const START: u64 = 1_700_000_000_000;

/// Audit trail that keeps entries in memory and can be told to fail.
#[derive(Default)]
pub struct RecordingAuditTrail {
    entries: Mutex<Vec<AuditEntry>>,
    failing: AtomicBool,
}

impl RecordingAuditTrail {
    pub async fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().await.clone()
    }

    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl AuditTrail for RecordingAuditTrail {
    async fn save_audit_log(&self, entry: AuditEntry) -> Result<(), AuditError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AuditError::Unavailable("test sink down".into()));
        }
        self.entries.lock().await.push(entry);
        Ok(())
    }
}

/// A store where every operation fails.
pub struct FailingStore;

fn down() -> StoreError {
    StoreError::Backend("connection refused".into())
}

#[async_trait]
impl CounterStore for FailingStore {
    async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> StoreResult<()> {
        Err(down())
    }

    async fn get(&self, _key: &str) -> StoreResult<Option<String>> {
        Err(down())
    }

    async fn increment(&self, _key: &str) -> StoreResult<i64> {
        Err(down())
    }

    async fn scan_prefix(&self, _prefix: &str) -> StoreResult<Vec<(String, String)>> {
        Err(down())
    }

    async fn ping(&self) -> StoreResult<()> {
        Err(down())
    }
}

pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub store: MemoryStore,
    pub repo: Arc<Repository>,
    pub audit: Arc<RecordingAuditTrail>,
}

pub fn harness() -> Harness {
    let clock = Arc::new(ManualClock::new(START));
    let store = MemoryStore::with_clock(clock.clone());
    let repo = Arc::new(Repository::new(
        Arc::new(store.clone()),
        RetentionConfig::default(),
    ));
    Harness {
        clock,
        store,
        repo,
        audit: Arc::new(RecordingAuditTrail::default()),
    }
}

/// A repository over [`FailingStore`].
pub fn failing_repo() -> Arc<Repository> {
    Arc::new(Repository::new(
        Arc::new(FailingStore),
        RetentionConfig::default(),
    ))
}
