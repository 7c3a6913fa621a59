//! Namespaced, typed settings linked to a [`KvStore`].
//!
//! Each setting lives under `storage.<namespace>.<name>` and is typed by its
//! default value. Strings are stored raw, booleans and numbers as their text
//! form, and everything else as JSON. Linking writes the default for any
//! setting that has no stored value yet.

use crate::error::{StorageError, StorageResult};
use crate::kv::KvStore;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Number, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// Storage form of a setting, derived from its default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKind {
    Boolean,
    String,
    Number,
    Object,
}

impl SettingKind {
    fn of(value: &Value) -> Self {
        match value {
            Value::Bool(_) => SettingKind::Boolean,
            Value::String(_) => SettingKind::String,
            Value::Number(_) => SettingKind::Number,
            _ => SettingKind::Object,
        }
    }

    fn parse(self, raw: &str) -> StorageResult<Value> {
        Ok(match self {
            SettingKind::Boolean => Value::Bool(raw == "true"),
            SettingKind::String => Value::String(raw.to_string()),
            SettingKind::Number => parse_number(raw),
            SettingKind::Object => serde_json::from_str(raw)?,
        })
    }

    fn stringify(self, value: &Value) -> StorageResult<String> {
        match (self, value) {
            (SettingKind::String, Value::String(s)) => Ok(s.clone()),
            (SettingKind::Boolean, Value::Bool(b)) => Ok(b.to_string()),
            (SettingKind::Number, Value::Number(n)) => Ok(n.to_string()),
            (SettingKind::Object, v) => Ok(serde_json::to_string(v)?),
            (kind, other) => Err(StorageError::InvalidValue {
                key: String::new(),
                reason: format!("expected {kind:?}, got {other}"),
            }),
        }
    }
}

/// Non-numeric text reads as `null`.
fn parse_number(raw: &str) -> Value {
    let raw = raw.trim();
    if let Ok(i) = raw.parse::<i64>() {
        return Value::Number(i.into());
    }
    raw.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// The stored key for a namespaced setting.
pub fn setting_key(namespace: &str, name: &str) -> String {
    format!("storage.{namespace}.{name}")
}

/// A group of settings linked to a store.
#[derive(Clone)]
pub struct Settings {
    store: Arc<dyn KvStore>,
    namespace: String,
    kinds: BTreeMap<String, SettingKind>,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("namespace", &self.namespace)
            .field("kinds", &self.kinds)
            .finish()
    }
}

impl Settings {
    /// Links `defaults` under `namespace`, writing any missing defaults.
    pub fn link(
        store: Arc<dyn KvStore>,
        namespace: impl Into<String>,
        defaults: impl IntoIterator<Item = (String, Value)>,
    ) -> StorageResult<Self> {
        let namespace = namespace.into();
        let mut kinds = BTreeMap::new();
        for (name, fallback) in defaults {
            let kind = SettingKind::of(&fallback);
            let key = setting_key(&namespace, &name);
            if store.get(&key)?.is_none() {
                store.set(&key, &kind.stringify(&fallback)?)?;
                debug!(%key, "wrote setting default");
            }
            kinds.insert(name, kind);
        }
        Ok(Self {
            store,
            namespace,
            kinds,
        })
    }

    /// The namespace these settings live in.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Declared kind of a setting.
    pub fn kind(&self, name: &str) -> Option<SettingKind> {
        self.kinds.get(name).copied()
    }

    fn key_and_kind(&self, name: &str) -> StorageResult<(String, SettingKind)> {
        let kind = self
            .kind(name)
            .ok_or_else(|| StorageError::UnknownSetting(setting_key(&self.namespace, name)))?;
        Ok((setting_key(&self.namespace, name), kind))
    }

    /// Reads a setting. A value removed behind our back reads as `null`.
    pub fn get(&self, name: &str) -> StorageResult<Value> {
        let (key, kind) = self.key_and_kind(name)?;
        match self.store.get(&key)? {
            Some(raw) => kind.parse(&raw),
            None => Ok(Value::Null),
        }
    }

    /// Reads a setting into a concrete type.
    pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> StorageResult<T> {
        Ok(serde_json::from_value(self.get(name)?)?)
    }

    /// Writes a setting. The value must match the setting's kind.
    pub fn set(&self, name: &str, value: impl Serialize) -> StorageResult<()> {
        let (key, kind) = self.key_and_kind(name)?;
        let value = serde_json::to_value(value)?;
        let raw = kind.stringify(&value).map_err(|e| match e {
            StorageError::InvalidValue { reason, .. } => StorageError::InvalidValue {
                key: key.clone(),
                reason,
            },
            other => other,
        })?;
        self.store.set(&key, &raw)
    }

    /// Subscribes to changes of settings in this namespace. Yields setting
    /// names, not full keys.
    pub fn changes(&self) -> SettingChanges {
        SettingChanges {
            rx: self.store.changes(),
            prefix: format!("storage.{}.", self.namespace),
        }
    }
}

/// Stream of changed setting names for one namespace.
#[derive(Debug)]
pub struct SettingChanges {
    rx: broadcast::Receiver<String>,
    prefix: String,
}

impl SettingChanges {
    /// Waits for the next change in the namespace. Returns `None` once the
    /// store is gone.
    pub async fn next(&mut self) -> Option<String> {
        loop {
            match self.rx.recv().await {
                Ok(key) => {
                    if let Some(name) = key.strip_prefix(&self.prefix) {
                        return Some(name.to_string());
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
