//! Core type definitions for realmlink.
//!
//! This crate defines the types shared by every realm taking part in the
//! messaging protocol:
//! - Realm and correlation identifiers
//! - The explicit [`RealmContext`] handed to every messenger and interceptor
//! - The wire [`Envelope`] and the closed [`MessageKind`] union
//! - Per-kind payload shapes ([`Rpc`] and [`Notification`] surfaces)
//! - A diagnostics pretty-printer for values forwarded from sandboxes

mod context;
mod envelope;
mod ids;
mod pretty;
pub mod protocol;

pub use context::{RealmContext, RealmRole};
pub use envelope::{Envelope, MessageKind, error_marker, error_payload};
pub use ids::{CorrelationId, RealmId};
pub use pretty::pretty_print;
pub use protocol::{Notification, Rpc};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),
}
