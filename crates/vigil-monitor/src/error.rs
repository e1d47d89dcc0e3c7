//! Monitor error types.
//!
//! These never reach recorder callers: the public `record*` entry points
//! pass them through [`crate::boundary::best_effort`]. Read-side queries do
//! return them.

use thiserror::Error;

use crate::audit::AuditError;

/// Errors that can occur while recording or reading monitoring data.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("store error: {0}")]
    Store(#[from] vigil_store::StoreError),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("audit trail error: {0}")]
    Audit(#[from] AuditError),

    #[error("invalid sample: {0}")]
    InvalidSample(String),
}

pub type MonitorResult<T> = Result<T, MonitorError>;
