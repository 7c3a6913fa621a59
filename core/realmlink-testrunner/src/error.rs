//! Error types for test orchestration.

use realmlink_messenger::MessengerError;
use thiserror::Error;

/// Result type for orchestration operations.
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// Errors that can occur while driving sandboxes.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The sandbox realm could not be loaded, reloaded or torn down.
    #[error("sandbox realm error: {0}")]
    Realm(String),

    /// Messaging with the sandbox failed.
    #[error("messenger error: {0}")]
    Messenger(#[from] MessengerError),

    /// IO error while discovering suites.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
