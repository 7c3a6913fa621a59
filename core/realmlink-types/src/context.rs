//! Explicit realm context.
//!
//! Channel code never consults a process-wide "current realm". Every
//! messenger and interceptor is constructed with the context it runs in.

use crate::RealmId;
use serde::{Deserialize, Serialize};

/// Where a realm sits in the embedding hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RealmRole {
    /// The privileged top-level realm.
    Top,
    /// An embedded document (sandbox) inside another realm.
    Nested,
    /// A background worker realm (request interception lives here).
    Worker,
}

/// Identity and origin of the realm a component runs in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealmContext {
    /// This realm's identifier, used as the source of posted messages.
    pub id: RealmId,
    /// Position in the embedding hierarchy.
    pub role: RealmRole,
    /// Origin (`scheme://host[:port]`) used for same-origin checks.
    pub origin: String,
}

impl RealmContext {
    /// Creates a context with a fresh realm id.
    pub fn new(role: RealmRole, origin: impl Into<String>) -> Self {
        Self {
            id: RealmId::new(),
            role,
            origin: origin.into(),
        }
    }

    /// Creates a context for an existing realm id.
    pub fn with_id(id: RealmId, role: RealmRole, origin: impl Into<String>) -> Self {
        Self {
            id,
            role,
            origin: origin.into(),
        }
    }

    /// Whether this is the privileged top-level realm.
    pub fn is_top(&self) -> bool {
        self.role == RealmRole::Top
    }
}
