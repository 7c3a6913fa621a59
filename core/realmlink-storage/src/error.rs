//! Error types for the storage layer.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A setting was read that was never linked.
    #[error("unknown setting: {0}")]
    UnknownSetting(String),

    /// A value does not match the setting's declared type.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}
