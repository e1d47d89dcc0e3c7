//! Incremental operation statistics.
//!
//! Statistics are folded one sample at a time; no sample history is kept.
//! The mean, extremes, and error rate are exact. The percentiles are not:
//!
//! # Percentile ratchet
//!
//! All three percentiles start at the first sample. Afterwards, for each
//! sample `s`, each percentile moves up to `s` only if `s` lies strictly
//! between its current value and the next-higher marker (p50 → p95,
//! p95 → p99, p99 → max), all taken from *before* the sample was applied.
//! Markers therefore only ever move up, stay ordered
//! (`min <= p50 <= p95 <= p99 <= max`), and ignore anything below their
//! current value.

use vigil_core::{OperationStats, PerformanceSample};

/// Fold `sample` into `previous`, or start fresh statistics from it.
pub fn fold_sample(previous: Option<OperationStats>, sample: &PerformanceSample) -> OperationStats {
    let duration = sample.duration_ms;
    let error = u64::from(sample.is_error());

    let Some(mut stats) = previous else {
        return OperationStats {
            method: sample.method.to_ascii_uppercase(),
            route: sample.route.clone(),
            request_count: 1,
            error_count: error,
            avg_duration_ms: duration,
            min_duration_ms: duration,
            max_duration_ms: duration,
            p50_duration_ms: duration,
            p95_duration_ms: duration,
            p99_duration_ms: duration,
            error_rate: error as f64,
            last_updated: sample.timestamp,
        };
    };

    let n = stats.request_count + 1;
    stats.avg_duration_ms = (stats.avg_duration_ms * (n - 1) as f64 + duration) / n as f64;
    stats.request_count = n;
    stats.error_count += error;
    stats.error_rate = stats.error_count as f64 / n as f64;

    ratchet_percentiles(&mut stats, duration);

    stats.min_duration_ms = stats.min_duration_ms.min(duration);
    stats.max_duration_ms = stats.max_duration_ms.max(duration);
    stats.last_updated = sample.timestamp;
    stats
}

/// Apply the percentile ratchet. Must run before the max is updated.
fn ratchet_percentiles(stats: &mut OperationStats, sample: f64) {
    let (p50, p95, p99, max) = (
        stats.p50_duration_ms,
        stats.p95_duration_ms,
        stats.p99_duration_ms,
        stats.max_duration_ms,
    );
    if sample > p50 && sample < p95 {
        stats.p50_duration_ms = sample;
    }
    if sample > p95 && sample < p99 {
        stats.p95_duration_ms = sample;
    }
    if sample > p99 && sample < max {
        stats.p99_duration_ms = sample;
    }
}
