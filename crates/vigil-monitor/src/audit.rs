//! Audit trail seam.
//!
//! Security events and newly raised alerts are forwarded to an immutable
//! audit log owned by another subsystem. From the engine's side this is
//! fire-and-forget: a failed write is logged by the recorder and dropped.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

use vigil_core::Severity;

/// Audit log level, derived from event severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditLevel {
    Info,
    Warn,
    Error,
    Critical,
}

impl From<Severity> for AuditLevel {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Low => AuditLevel::Info,
            Severity::Medium => AuditLevel::Warn,
            Severity::High => AuditLevel::Error,
            Severity::Critical => AuditLevel::Critical,
        }
    }
}

/// One audit log record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub category: String,
    pub level: AuditLevel,
    pub metadata: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit sink rejected entry: {0}")]
    Rejected(String),

    #[error("audit sink unavailable: {0}")]
    Unavailable(String),
}

/// Destination for audit entries.
#[async_trait]
pub trait AuditTrail: Send + Sync {
    async fn save_audit_log(&self, entry: AuditEntry) -> Result<(), AuditError>;
}

/// Writes audit entries as structured events on the `audit` tracing target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditTrail;

#[async_trait]
impl AuditTrail for TracingAuditTrail {
    async fn save_audit_log(&self, entry: AuditEntry) -> Result<(), AuditError> {
        let metadata = entry.metadata.to_string();
        let user_id = entry.user_id.as_deref().unwrap_or("-");
        let ip = entry.ip_address.as_deref().unwrap_or("-");
        let endpoint = entry.endpoint.as_deref().unwrap_or("-");
        match entry.level {
            AuditLevel::Info => info!(
                target: "audit",
                category = %entry.category, user_id, ip, endpoint, %metadata,
                "{}", entry.message
            ),
            AuditLevel::Warn => warn!(
                target: "audit",
                category = %entry.category, user_id, ip, endpoint, %metadata,
                "{}", entry.message
            ),
            AuditLevel::Error => error!(
                target: "audit",
                category = %entry.category, user_id, ip, endpoint, %metadata,
                "{}", entry.message
            ),
            AuditLevel::Critical => error!(
                target: "audit",
                critical = true,
                category = %entry.category, user_id, ip, endpoint, %metadata,
                "{}", entry.message
            ),
        }
        Ok(())
    }
}
