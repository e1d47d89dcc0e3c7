//! Aggregate reader: read-only queries over what the recorders wrote.
//!
//! Unlike the recorders, errors here propagate: read callers are dashboards
//! and health probes, not the request being measured.

use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use vigil_core::{
    Alert, AlertSubject, Clock, Operation, OperationStats, SecurityEvent, SecurityEventType,
    Timestamp,
};

use crate::error::MonitorResult;
use crate::repository::Repository;

/// Store reachability at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub store_reachable: bool,
    pub checked_at: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Totals across every recorded operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageSummary {
    pub operations: usize,
    pub total_requests: u64,
    pub total_errors: u64,
    pub error_rate: f64,
    /// Operation with the highest p99, if any were recorded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slowest: Option<SlowestOperation>,
    pub active_alerts: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlowestOperation {
    pub method: String,
    pub route: String,
    pub p99_duration_ms: f64,
}

pub struct AggregateReader {
    repo: Arc<Repository>,
    clock: Arc<dyn Clock>,
}

impl AggregateReader {
    pub fn new(repo: Arc<Repository>, clock: Arc<dyn Clock>) -> Self {
        Self { repo, clock }
    }

    pub async fn get_stats(&self, op: &Operation) -> MonitorResult<Option<OperationStats>> {
        self.repo.load_stats(op).await
    }

    /// All operation statistics, sorted by route then method.
    pub async fn get_all_stats(&self) -> MonitorResult<Vec<OperationStats>> {
        let mut stats = self.repo.scan_stats().await?;
        stats.sort_by(|a, b| (&a.route, &a.method).cmp(&(&b.route, &b.method)));
        Ok(stats)
    }

    /// Alerts still within retention, most recently triggered first.
    pub async fn get_active_alerts(&self) -> MonitorResult<Vec<Alert>> {
        let mut alerts = self.repo.scan_alerts().await?;
        alerts.sort_by(|a, b| b.last_occurrence.cmp(&a.last_occurrence));
        Ok(alerts)
    }

    pub async fn get_alert_counter(
        &self,
        event_type: SecurityEventType,
        subject: &AlertSubject,
    ) -> MonitorResult<u64> {
        self.repo.alert_counter(event_type, subject).await
    }

    /// Up to `limit` stored events, newest first.
    pub async fn get_recent_events(&self, limit: usize) -> MonitorResult<Vec<SecurityEvent>> {
        let events = self.repo.scan_events().await?;
        Ok(events.into_iter().rev().take(limit).collect())
    }

    /// Ping the store. Never fails; an unreachable store is reported.
    pub async fn health(&self) -> HealthReport {
        let checked_at = self.clock.now_millis();
        match self.repo.ping().await {
            Ok(()) => HealthReport {
                store_reachable: true,
                checked_at,
                error: None,
            },
            Err(e) => {
                warn!(error = %e, "counter store health check failed");
                HealthReport {
                    store_reachable: false,
                    checked_at,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    pub async fn summary(&self) -> MonitorResult<UsageSummary> {
        let stats = self.repo.scan_stats().await?;
        let active_alerts = self.repo.scan_alerts().await?.len();

        let total_requests: u64 = stats.iter().map(|s| s.request_count).sum();
        let total_errors: u64 = stats.iter().map(|s| s.error_count).sum();
        let error_rate = if total_requests == 0 {
            0.0
        } else {
            total_errors as f64 / total_requests as f64
        };
        let slowest = stats
            .iter()
            .max_by(|a, b| a.p99_duration_ms.total_cmp(&b.p99_duration_ms))
            .map(|s| SlowestOperation {
                method: s.method.clone(),
                route: s.route.clone(),
                p99_duration_ms: s.p99_duration_ms,
            });

        Ok(UsageSummary {
            operations: stats.len(),
            total_requests,
            total_errors,
            error_rate,
            slowest,
            active_alerts,
        })
    }
}
