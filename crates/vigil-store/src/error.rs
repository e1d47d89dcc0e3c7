//! Error types for the counter store.

use thiserror::Error;

/// Result type alias for counter store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during counter store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open store: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("value at {0} is not an integer")]
    NotInteger(String),

    #[error("backend unavailable: {0}")]
    Backend(String),
}
