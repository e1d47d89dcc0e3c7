//! The [`Monitor`] facade wiring recorders, alert engine and reader over one
//! shared store.

use std::sync::Arc;

use tracing::info;

use vigil_core::{Alert, Clock, Operation, OperationStats, SecurityEvent, VigilConfig};
use vigil_store::CounterStore;

use crate::alerts::{AlertEngine, RuleTable};
use crate::audit::AuditTrail;
use crate::error::MonitorResult;
use crate::events::EventRecorder;
use crate::metrics::MetricRecorder;
use crate::prometheus::render_prometheus;
use crate::reader::AggregateReader;
use crate::repository::Repository;

pub struct Monitor {
    repo: Arc<Repository>,
    metrics: MetricRecorder,
    events: EventRecorder,
    reader: AggregateReader,
}

impl Monitor {
    pub fn new(
        config: &VigilConfig,
        store: Arc<dyn CounterStore>,
        audit: Arc<dyn AuditTrail>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let repo = Arc::new(Repository::new(store, config.retention.clone()));
        let rules = RuleTable::new(&config.alerts.rules);
        let engine = AlertEngine::new(repo.clone(), rules, audit.clone());

        info!(
            rules = config.alerts.rules.len(),
            slow_request_ms = config.performance.slow_request_ms,
            "monitor initialised"
        );

        Self {
            metrics: MetricRecorder::new(repo.clone(), config.performance.clone(), clock.clone()),
            events: EventRecorder::new(repo.clone(), audit, engine, clock.clone()),
            reader: AggregateReader::new(repo.clone(), clock),
            repo,
        }
    }

    pub fn metrics(&self) -> &MetricRecorder {
        &self.metrics
    }

    pub fn events(&self) -> &EventRecorder {
        &self.events
    }

    pub fn reader(&self) -> &AggregateReader {
        &self.reader
    }

    /// Record one completed request. Never fails.
    pub async fn record_metric(
        &self,
        method: &str,
        route: &str,
        duration_ms: f64,
        status_code: u16,
        user_id: Option<&str>,
    ) {
        let op = Operation::new(method, route);
        self.metrics
            .record(&op, duration_ms, status_code, user_id)
            .await;
    }

    /// Record a security event. Never fails.
    pub async fn record_event(&self, event: SecurityEvent) {
        self.events.record(event).await;
    }

    pub async fn get_stats(&self, method: &str, route: &str) -> MonitorResult<Option<OperationStats>> {
        self.reader.get_stats(&Operation::new(method, route)).await
    }

    pub async fn get_active_alerts(&self) -> MonitorResult<Vec<Alert>> {
        self.reader.get_active_alerts().await
    }

    /// Current statistics and alert counts in Prometheus text format.
    pub async fn prometheus(&self) -> MonitorResult<String> {
        let stats = self.reader.get_all_stats().await?;
        let alerts = self.repo.scan_alerts().await?;
        Ok(render_prometheus(&stats, &alerts))
    }

    /// Reclaim expired entries from stores without native expiry.
    pub async fn purge_expired(&self) -> MonitorResult<usize> {
        Ok(self.repo.store().purge_expired().await?)
    }
}
