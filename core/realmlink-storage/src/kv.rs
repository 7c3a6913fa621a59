//! The key/value collaborator and its in-memory implementation.

use crate::error::StorageResult;
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use tokio::sync::broadcast;

const CHANGE_CAPACITY: usize = 64;

/// A string key/value store.
///
/// Every successful write or removal is announced to [`KvStore::changes`]
/// subscribers with the affected key.
pub trait KvStore: Send + Sync {
    /// Reads a value.
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Writes a value, replacing any previous one.
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Removes a value. Returns whether it existed.
    fn remove(&self, key: &str) -> StorageResult<bool>;

    /// Lists keys starting with `prefix`, in ascending order.
    fn keys_with_prefix(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Subscribes to change notifications.
    fn changes(&self) -> broadcast::Receiver<String>;
}

/// A [`KvStore`] that lives only as long as the process.
#[derive(Debug)]
pub struct MemoryKvStore {
    entries: Mutex<BTreeMap<String, String>>,
    changes: broadcast::Sender<String>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            entries: Mutex::new(BTreeMap::new()),
            changes,
        }
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryKvStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KvStore for MemoryKvStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.entries().insert(key.to_string(), value.to_string());
        let _ = self.changes.send(key.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<bool> {
        let existed = self.entries().remove(key).is_some();
        if existed {
            let _ = self.changes.send(key.to_string());
        }
        Ok(existed)
    }

    fn keys_with_prefix(&self, prefix: &str) -> StorageResult<Vec<String>> {
        Ok(self
            .entries()
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }

    fn changes(&self) -> broadcast::Receiver<String> {
        self.changes.subscribe()
    }
}
