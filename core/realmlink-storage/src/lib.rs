//! Key/value storage for realmlink.
//!
//! The host keeps small pieces of state (published resources, user
//! settings) in a string key/value store. Two backends are provided:
//! - [`MemoryKvStore`]: process-lifetime, used by tests and ephemeral hosts
//! - [`SqliteKvStore`]: a single SQLite file

mod error;
mod kv;
mod settings;
mod sqlite;

pub use error::{StorageError, StorageResult};
pub use kv::{KvStore, MemoryKvStore};
pub use settings::{SettingChanges, SettingKind, Settings, setting_key};
pub use sqlite::SqliteKvStore;
