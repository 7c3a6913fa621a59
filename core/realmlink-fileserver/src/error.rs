//! Error types for the resource store.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while storing or restoring resources.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The persistence collaborator failed.
    #[error("storage error: {0}")]
    Storage(#[from] realmlink_storage::StorageError),

    /// A persisted body could not be decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
