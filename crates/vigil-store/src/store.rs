//! The `CounterStore` trait and the entry envelope shared by the
//! backends that track expiry themselves.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Key/value store with per-key expiry.
///
/// Implementations must treat an expired key exactly like an absent one.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Overwrite `key` with `value`, expiring `ttl` from now.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()>;

    /// Read the live value at `key`.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Add one to the integer at `key` and return the new value.
    ///
    /// An absent key starts from zero and is created without expiry; an
    /// existing key keeps whatever expiry it had.
    async fn increment(&self, key: &str) -> StoreResult<i64>;

    /// All live entries whose key starts with `prefix`, in key order.
    async fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<(String, String)>>;

    /// Cheap reachability check.
    async fn ping(&self) -> StoreResult<()>;

    /// Drop expired entries, returning how many were removed.
    ///
    /// Backends with native expiry have nothing to do.
    async fn purge_expired(&self) -> StoreResult<usize> {
        Ok(0)
    }
}

/// A stored value plus its absolute expiry (unix millis).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Entry {
    pub value: String,
    pub expires_at: Option<u64>,
}

impl Entry {
    pub fn with_ttl(value: String, now: u64, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Some(now.saturating_add(ttl.as_millis() as u64)),
        }
    }

    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Increment the integer value in place.
    pub fn increment(&mut self, key: &str) -> StoreResult<i64> {
        let current: i64 = self
            .value
            .parse()
            .map_err(|_| StoreError::NotInteger(key.to_string()))?;
        let next = current.saturating_add(1);
        self.value = next.to_string();
        Ok(next)
    }
}
