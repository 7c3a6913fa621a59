//! SQLite-backed key/value store.

use crate::error::{StorageError, StorageResult};
use crate::kv::KvStore;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tracing::debug;

/// Persistent [`KvStore`] in a single SQLite file.
pub struct SqliteKvStore {
    conn: Arc<Mutex<Connection>>,
    changes: broadcast::Sender<String>,
}

impl SqliteKvStore {
    /// Opens (or creates) a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .map_err(|e| StorageError::Database(format!("failed to open kv store: {e}")))?;
        debug!(path = %path.display(), "opened kv store");
        Self::with_connection(conn)
    }

    /// Opens an in-memory store (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            StorageError::Database(format!("failed to open in-memory kv store: {e}"))
        })?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> StorageResult<Self> {
        let (changes, _) = broadcast::channel(64);
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            changes,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> StorageResult<()> {
        self.conn()
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS kv (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );
                ",
            )
            .map_err(|e| StorageError::Database(format!("failed to init kv schema: {e}")))?;
        Ok(())
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KvStore for SqliteKvStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        self.conn()
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()
            .map_err(|e| StorageError::Database(format!("failed to read {key}: {e}")))
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.conn()
            .execute(
                "INSERT INTO kv (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )
            .map_err(|e| StorageError::Database(format!("failed to write {key}: {e}")))?;
        let _ = self.changes.send(key.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<bool> {
        let removed = self
            .conn()
            .execute("DELETE FROM kv WHERE key = ?1", params![key])
            .map_err(|e| StorageError::Database(format!("failed to remove {key}: {e}")))?;
        if removed > 0 {
            let _ = self.changes.send(key.to_string());
        }
        Ok(removed > 0)
    }

    fn keys_with_prefix(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT key FROM kv WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key")
            .map_err(|e| StorageError::Database(format!("failed to prepare key query: {e}")))?;
        let keys = stmt
            .query_map(params![prefix], |row| row.get::<_, String>(0))
            .map_err(|e| StorageError::Database(format!("failed to list keys: {e}")))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StorageError::Database(format!("failed to read key: {e}")))?;
        Ok(keys)
    }

    fn changes(&self) -> broadcast::Receiver<String> {
        self.changes.subscribe()
    }
}
