//! Prometheus text exposition format.
//!
//! Renders operation statistics and active alert counts for scraping by a
//! Prometheus server or compatible agent.

use std::collections::BTreeMap;
use std::fmt::Write;

use vigil_core::{Alert, OperationStats, SecurityEventType};

/// Render statistics and alerts into Prometheus text format.
///
/// Per-operation series carry `method` and `route` labels; alert series
/// carry a `type` label and are emitted for every event type, zero included.
pub fn render_prometheus(stats: &[OperationStats], alerts: &[Alert]) -> String {
    let mut out = String::new();

    family(&mut out, "vigil_requests_total", "Requests recorded per operation.", "counter");
    for s in stats {
        let _ = writeln!(out, "vigil_requests_total{{{}}} {}", op_labels(s), s.request_count);
    }

    family(&mut out, "vigil_errors_total", "Requests with status >= 400 per operation.", "counter");
    for s in stats {
        let _ = writeln!(out, "vigil_errors_total{{{}}} {}", op_labels(s), s.error_count);
    }

    family(&mut out, "vigil_error_rate", "Error rate (0.0-1.0).", "gauge");
    for s in stats {
        let _ = writeln!(out, "vigil_error_rate{{{}}} {:.4}", op_labels(s), s.error_rate);
    }

    family(&mut out, "vigil_duration_avg_ms", "Mean request duration in milliseconds.", "gauge");
    for s in stats {
        let _ = writeln!(out, "vigil_duration_avg_ms{{{}}} {:.2}", op_labels(s), s.avg_duration_ms);
    }

    family(
        &mut out,
        "vigil_duration_ms",
        "Request duration markers in milliseconds (approximate quantiles).",
        "gauge",
    );
    for s in stats {
        let labels = op_labels(s);
        for (quantile, value) in [
            ("0", s.min_duration_ms),
            ("0.5", s.p50_duration_ms),
            ("0.95", s.p95_duration_ms),
            ("0.99", s.p99_duration_ms),
            ("1", s.max_duration_ms),
        ] {
            let _ = writeln!(out, "vigil_duration_ms{{{labels},quantile=\"{quantile}\"}} {value:.2}");
        }
    }

    family(&mut out, "vigil_active_alerts", "Active security alerts per event type.", "gauge");
    let mut counts: BTreeMap<&str, usize> = SecurityEventType::ALL
        .iter()
        .map(|t| (t.as_str(), 0))
        .collect();
    for a in alerts {
        *counts.entry(a.alert_type.as_str()).or_default() += 1;
    }
    for (alert_type, count) in counts {
        let _ = writeln!(out, "vigil_active_alerts{{type=\"{alert_type}\"}} {count}");
    }

    out
}

fn family(out: &mut String, name: &str, help: &str, kind: &str) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} {kind}");
}

fn op_labels(s: &OperationStats) -> String {
    format!(
        "method=\"{}\",route=\"{}\"",
        escape_label(&s.method),
        escape_label(&s.route)
    )
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
