//! The virtual resource store.
//!
//! Resources are kept in memory, ordered by path, last write wins. When a
//! [`KvStore`] is attached every mutation is written through under
//! `storage.files.<path>` so a later process can [`restore`] the set.
//!
//! [`restore`]: VirtualResourceStore::restore

use crate::content_type::ContentType;
use crate::error::StoreResult;
use crate::inject::BodyTransform;
use realmlink_storage::KvStore;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

/// Key prefix for persisted resources.
pub const PERSISTENCE_PREFIX: &str = "storage.files.";

/// A resource served to sandboxed realms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualResource {
    pub path: String,
    pub body: Vec<u8>,
    pub content_type: ContentType,
}

impl VirtualResource {
    pub fn new(path: impl Into<String>, body: Vec<u8>) -> Self {
        let path = path.into();
        let content_type = ContentType::from_path(&path);
        Self {
            path,
            body,
            content_type,
        }
    }
}

/// Path-keyed resource map shared between the file server and its owner.
#[derive(Default)]
pub struct VirtualResourceStore {
    resources: RwLock<BTreeMap<String, VirtualResource>>,
    persistence: Option<Arc<dyn KvStore>>,
}

impl std::fmt::Debug for VirtualResourceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualResourceStore")
            .field("len", &self.len())
            .field("persistent", &self.persistence.is_some())
            .finish()
    }
}

impl VirtualResourceStore {
    /// Creates an empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store that writes through to `kv`.
    pub fn with_persistence(kv: Arc<dyn KvStore>) -> Self {
        Self {
            resources: RwLock::default(),
            persistence: Some(kv),
        }
    }

    /// Loads every persisted resource from `kv` and keeps writing through.
    pub fn restore(kv: Arc<dyn KvStore>) -> StoreResult<Self> {
        let mut resources = BTreeMap::new();
        for key in kv.keys_with_prefix(PERSISTENCE_PREFIX)? {
            let Some(raw) = kv.get(&key)? else { continue };
            let body: Vec<u8> = serde_json::from_str(&raw)?;
            let path = key[PERSISTENCE_PREFIX.len()..].to_string();
            resources.insert(path.clone(), VirtualResource::new(path, body));
        }
        debug!(count = resources.len(), "restored virtual resources");
        Ok(Self {
            resources: RwLock::new(resources),
            persistence: Some(kv),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, VirtualResource>> {
        self.resources.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, VirtualResource>> {
        self.resources.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores `body` at `path`, replacing any previous resource. The optional
    /// transform rewrites the body first.
    pub fn upload(
        &self,
        path: &str,
        body: Vec<u8>,
        transform: Option<&dyn BodyTransform>,
    ) -> StoreResult<()> {
        let mut resources = self.write();
        self.insert_locked(&mut resources, path, body, transform)
    }

    /// Removes every resource whose path starts with `prefix`.
    pub fn clear(&self, prefix: &str) -> StoreResult<usize> {
        let mut resources = self.write();
        self.clear_locked(&mut resources, prefix)
    }

    /// Clears `prefix` and uploads `entries` under one write lock, so readers
    /// never see a partially replaced scope.
    pub fn replace_scope(
        &self,
        prefix: &str,
        entries: Vec<(String, Vec<u8>)>,
        transform: Option<&dyn BodyTransform>,
    ) -> StoreResult<usize> {
        let mut resources = self.write();
        self.clear_locked(&mut resources, prefix)?;
        let count = entries.len();
        for (path, body) in entries {
            self.insert_locked(&mut resources, &path, body, transform)?;
        }
        debug!(prefix, count, "replaced resource scope");
        Ok(count)
    }

    fn insert_locked(
        &self,
        resources: &mut BTreeMap<String, VirtualResource>,
        path: &str,
        body: Vec<u8>,
        transform: Option<&dyn BodyTransform>,
    ) -> StoreResult<()> {
        let body = match transform {
            Some(t) => t.apply(path, body),
            None => body,
        };
        if let Some(kv) = &self.persistence {
            kv.set(&persistence_key(path), &serde_json::to_string(&body)?)?;
        }
        resources.insert(path.to_string(), VirtualResource::new(path, body));
        Ok(())
    }

    fn clear_locked(
        &self,
        resources: &mut BTreeMap<String, VirtualResource>,
        prefix: &str,
    ) -> StoreResult<usize> {
        let doomed: Vec<String> = resources
            .range(prefix.to_string()..)
            .take_while(|(path, _)| path.starts_with(prefix))
            .map(|(path, _)| path.clone())
            .collect();
        for path in &doomed {
            if let Some(kv) = &self.persistence {
                kv.remove(&persistence_key(path))?;
            }
            resources.remove(path);
        }
        Ok(doomed.len())
    }

    /// Looks up a resource.
    pub fn get(&self, path: &str) -> Option<VirtualResource> {
        self.read().get(path).cloned()
    }

    /// All stored paths in order.
    pub fn paths(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

fn persistence_key(path: &str) -> String {
    format!("{PERSISTENCE_PREFIX}{path}")
}
