//! vigil-monitor — performance metrics, security events and alerting.
//!
//! Records per-operation latency statistics and security events into a
//! shared [`vigil_store::CounterStore`], escalates repeated events into
//! alerts, and answers read-side queries over the same data.
//!
//! # Architecture
//!
//! ```text
//! Monitor
//!   ├── MetricRecorder::record()   ← called per completed request
//!   │     └── stats fold, slow-request + error-rate checks (log only)
//!   ├── EventRecorder::record()    ← called per security event
//!   │     ├── persist → audit trail
//!   │     └── AlertEngine::evaluate() → raise / update Alert
//!   └── AggregateReader            → stats, alerts, events, health, summary
//!
//! Prometheus exposition
//!   └── render_prometheus() → text/plain for /metrics endpoint
//! ```
//!
//! Recording never fails from the caller's point of view; see [`boundary`].

pub mod alerts;
pub mod audit;
pub mod boundary;
pub mod error;
pub mod events;
pub mod metrics;
pub mod monitor;
pub mod prometheus;
pub mod reader;
pub mod repository;
pub mod stats;

#[cfg(test)]
mod test_support;

pub use alerts::{AlertEngine, Evaluation, RuleTable};
pub use audit::{AuditEntry, AuditError, AuditLevel, AuditTrail, TracingAuditTrail};
pub use error::{MonitorError, MonitorResult};
pub use events::{ClientInfo, EventRecorder};
pub use metrics::MetricRecorder;
pub use monitor::Monitor;
pub use prometheus::render_prometheus;
pub use reader::{AggregateReader, HealthReport, SlowestOperation, UsageSummary};
pub use repository::Repository;
