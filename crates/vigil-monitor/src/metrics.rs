//! Metric recorder: per-operation latency and error statistics.
//!
//! Each call stores the raw sample, folds it into the operation's running
//! statistics and runs two log-only checks: a slow-request burst and an
//! error-rate breach. Neither check creates an [`vigil_core::Alert`].

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};

use vigil_core::config::PerformanceConfig;
use vigil_core::{Clock, Operation, OperationStats, PerformanceSample};

use crate::boundary::best_effort;
use crate::error::{MonitorError, MonitorResult};
use crate::repository::Repository;
use crate::stats::fold_sample;

pub struct MetricRecorder {
    repo: Arc<Repository>,
    config: PerformanceConfig,
    clock: Arc<dyn Clock>,
}

impl MetricRecorder {
    pub fn new(repo: Arc<Repository>, config: PerformanceConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            repo,
            config,
            clock,
        }
    }

    /// Record one completed request. Never fails; problems are logged.
    pub async fn record(
        &self,
        op: &Operation,
        duration_ms: f64,
        status_code: u16,
        user_id: Option<&str>,
    ) {
        best_effort(
            "metrics",
            "record",
            self.try_record(op, duration_ms, status_code, user_id),
        )
        .await;
    }

    /// Fallible form of [`record`](Self::record); returns the updated
    /// statistics.
    pub async fn try_record(
        &self,
        op: &Operation,
        duration_ms: f64,
        status_code: u16,
        user_id: Option<&str>,
    ) -> MonitorResult<OperationStats> {
        if !duration_ms.is_finite() || duration_ms < 0.0 {
            return Err(MonitorError::InvalidSample(format!(
                "duration {duration_ms} for {op}"
            )));
        }

        let sample = PerformanceSample {
            method: op.method.clone(),
            route: op.route.clone(),
            duration_ms,
            status_code,
            user_id: user_id.map(str::to_string),
            timestamp: self.clock.now_millis(),
        };
        self.repo.save_sample(&sample).await?;

        let previous = self.repo.load_stats(op).await?;
        let stats = fold_sample(previous, &sample);
        self.repo.save_stats(&stats).await?;
        debug!(operation = %op, requests = stats.request_count, "stats updated");

        if duration_ms > self.config.slow_request_ms {
            self.check_slow(op).await?;
        }
        if sample.is_error() {
            self.check_error_rate(op).await?;
        }
        Ok(stats)
    }

    async fn check_slow(&self, op: &Operation) -> MonitorResult<()> {
        let window = Duration::from_secs(self.config.slow_window_secs);
        let count = self.repo.bump_slow_counter(op, window).await?;
        if count as i64 >= self.config.slow_alert_count {
            error!(
                component = "metrics",
                operation = %op,
                count,
                threshold_ms = self.config.slow_request_ms,
                "{count} slow requests in the last {} minutes for {op}",
                self.config.slow_window_secs / 60
            );
        }
        Ok(())
    }

    /// Re-read the stored statistics rather than trusting the local fold, so
    /// writes from other recorders are taken into account.
    async fn check_error_rate(&self, op: &Operation) -> MonitorResult<()> {
        let Some(stats) = self.repo.load_stats(op).await? else {
            return Ok(());
        };
        if stats.error_rate > self.config.error_rate_threshold {
            warn!(
                component = "metrics",
                operation = %op,
                error_rate = stats.error_rate,
                errors = stats.error_count,
                requests = stats.request_count,
                "high error rate for {op}: {:.1}%",
                stats.error_rate * 100.0
            );
        }
        Ok(())
    }
}
