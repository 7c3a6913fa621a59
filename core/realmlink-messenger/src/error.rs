//! Error types for the messaging layer.

use std::time::Duration;
use thiserror::Error;

/// Result type for messenger operations.
pub type MessengerResult<T> = Result<T, MessengerError>;

/// Errors that can occur while exchanging messages.
#[derive(Debug, Error)]
pub enum MessengerError {
    /// The paired-channel handshake did not settle in time.
    #[error("handshake did not complete within {0:?}")]
    HandshakeTimeout(Duration),

    /// The channel (or the messenger bound to it) was closed.
    #[error("channel closed")]
    ChannelClosed,

    /// The remote handler failed and answered with an error marker.
    #[error("remote handler failed: {0}")]
    Remote(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
