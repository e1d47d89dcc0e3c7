//! Typed access to the counter store.
//!
//! Owns the key schema and retention periods. Every mutation the engine
//! performs is one of the read-modify-write helpers here; none of them are
//! serialized against concurrent writers, so two processes updating the
//! same key race with last-writer-wins semantics.
//!
//! ```text
//! perf:stats:{METHOD}:{route}                  OperationStats    retention.stats
//! perf:sample:{METHOD}:{route}:{ts}:{id}       PerformanceSample retention.stats
//! perf:slow:{METHOD}:{route}                   counter           slow window
//! security:event:{ts}:{id}                     SecurityEvent     retention.events
//! alert:counter:{type}:{subject}               counter           rule window
//! alert:active:{type}:{subject}                Alert             retention.alert
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use vigil_core::config::RetentionConfig;
use vigil_core::{
    Alert, AlertSubject, Operation, OperationStats, PerformanceSample, SecurityEvent,
    SecurityEventType,
};
use vigil_store::CounterStore;

use crate::error::MonitorResult;

pub const STATS_PREFIX: &str = "perf:stats:";
pub const SAMPLE_PREFIX: &str = "perf:sample:";
pub const SLOW_PREFIX: &str = "perf:slow:";
pub const EVENT_PREFIX: &str = "security:event:";
pub const ALERT_COUNTER_PREFIX: &str = "alert:counter:";
pub const ACTIVE_ALERT_PREFIX: &str = "alert:active:";

pub fn stats_key(op: &Operation) -> String {
    format!("{STATS_PREFIX}{}:{}", op.method, op.route)
}

pub fn slow_key(op: &Operation) -> String {
    format!("{SLOW_PREFIX}{}:{}", op.method, op.route)
}

pub fn alert_counter_key(event_type: SecurityEventType, subject: &AlertSubject) -> String {
    format!("{ALERT_COUNTER_PREFIX}{event_type}:{subject}")
}

pub fn active_alert_key(event_type: SecurityEventType, subject: &str) -> String {
    format!("{ACTIVE_ALERT_PREFIX}{event_type}:{subject}")
}

pub struct Repository {
    store: Arc<dyn CounterStore>,
    retention: RetentionConfig,
    /// Disambiguates records written in the same millisecond.
    seq: AtomicU64,
    instance: u32,
}

impl Repository {
    pub fn new(store: Arc<dyn CounterStore>, retention: RetentionConfig) -> Self {
        Self {
            store,
            retention,
            seq: AtomicU64::new(0),
            instance: std::process::id(),
        }
    }

    pub fn store(&self) -> &Arc<dyn CounterStore> {
        &self.store
    }

    fn next_id(&self) -> String {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        format!("{}-{seq:010}", self.instance)
    }

    async fn put_json<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> MonitorResult<()> {
        let json = serde_json::to_string(value)?;
        self.store.set(key, &json, ttl).await?;
        Ok(())
    }

    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> MonitorResult<Option<T>> {
        match self.store.get(key).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Decode every value under `prefix`, skipping (and logging) corrupt ones.
    async fn scan_json<T: DeserializeOwned>(&self, prefix: &str) -> MonitorResult<Vec<T>> {
        let entries = self.store.scan_prefix(prefix).await?;
        let mut results = Vec::with_capacity(entries.len());
        for (key, json) in entries {
            match serde_json::from_str(&json) {
                Ok(value) => results.push(value),
                Err(e) => warn!(%key, error = %e, "skipping undecodable store entry"),
            }
        }
        Ok(results)
    }

    /// Increment a counter, then re-arm its expiry to `window` from now.
    ///
    /// The trailing `set` overwrites any increment that landed in between,
    /// so concurrent callers can under-count.
    async fn bump_counter(&self, key: &str, window: Duration) -> MonitorResult<u64> {
        let count = self.store.increment(key).await?;
        self.store.set(key, &count.to_string(), window).await?;
        Ok(count.max(0) as u64)
    }

    // ── Performance ────────────────────────────────────────────────

    fn stats_ttl(&self) -> Duration {
        Duration::from_secs(self.retention.stats_secs)
    }

    pub async fn load_stats(&self, op: &Operation) -> MonitorResult<Option<OperationStats>> {
        self.get_json(&stats_key(op)).await
    }

    pub async fn save_stats(&self, stats: &OperationStats) -> MonitorResult<()> {
        self.put_json(&stats_key(&stats.operation()), stats, self.stats_ttl())
            .await
    }

    pub async fn save_sample(&self, sample: &PerformanceSample) -> MonitorResult<()> {
        let key = format!(
            "{SAMPLE_PREFIX}{}:{}:{:013}:{}",
            sample.method.to_ascii_uppercase(),
            sample.route,
            sample.timestamp,
            self.next_id()
        );
        self.put_json(&key, sample, self.stats_ttl()).await
    }

    pub async fn bump_slow_counter(&self, op: &Operation, window: Duration) -> MonitorResult<u64> {
        self.bump_counter(&slow_key(op), window).await
    }

    pub async fn scan_stats(&self) -> MonitorResult<Vec<OperationStats>> {
        self.scan_json(STATS_PREFIX).await
    }

    // ── Security events ────────────────────────────────────────────

    pub async fn save_event(&self, event: &SecurityEvent) -> MonitorResult<String> {
        let key = format!("{EVENT_PREFIX}{:013}:{}", event.timestamp, self.next_id());
        let ttl = Duration::from_secs(self.retention.events_secs);
        self.put_json(&key, event, ttl).await?;
        Ok(key)
    }

    /// Stored events, oldest first.
    pub async fn scan_events(&self) -> MonitorResult<Vec<SecurityEvent>> {
        self.scan_json(EVENT_PREFIX).await
    }

    // ── Alerts ─────────────────────────────────────────────────────

    pub async fn bump_alert_counter(
        &self,
        event_type: SecurityEventType,
        subject: &AlertSubject,
        window: Duration,
    ) -> MonitorResult<u64> {
        self.bump_counter(&alert_counter_key(event_type, subject), window)
            .await
    }

    /// Current count within the window, zero when absent or expired.
    pub async fn alert_counter(
        &self,
        event_type: SecurityEventType,
        subject: &AlertSubject,
    ) -> MonitorResult<u64> {
        let raw = self
            .store
            .get(&alert_counter_key(event_type, subject))
            .await?;
        Ok(raw.and_then(|v| v.parse().ok()).unwrap_or(0))
    }

    pub async fn load_alert(
        &self,
        event_type: SecurityEventType,
        subject: &str,
    ) -> MonitorResult<Option<Alert>> {
        self.get_json(&active_alert_key(event_type, subject)).await
    }

    /// Write an alert and re-arm its retention.
    pub async fn save_alert(&self, alert: &Alert) -> MonitorResult<()> {
        let key = active_alert_key(alert.alert_type, &alert.subject);
        let ttl = Duration::from_secs(self.retention.alert_secs);
        self.put_json(&key, alert, ttl).await
    }

    pub async fn scan_alerts(&self) -> MonitorResult<Vec<Alert>> {
        self.scan_json(ACTIVE_ALERT_PREFIX).await
    }

    pub async fn ping(&self) -> MonitorResult<()> {
        self.store.ping().await?;
        Ok(())
    }
}
