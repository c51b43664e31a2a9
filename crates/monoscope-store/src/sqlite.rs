use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use crate::{IdentityStore, StoreError};

const PRAGMAS: &str = "PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA busy_timeout = 2000;";

const CREATE_TABLES: &str = "CREATE TABLE IF NOT EXISTS identity_kv (
    scope TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (scope, key)
);";

/// SQLite-backed store, so identity survives process restarts. Rows are
/// partitioned by `scope`; agents opened with the same scope share a session.
pub struct SqliteIdentityStore {
    conn: Arc<Mutex<Connection>>,
    scope: String,
    path: PathBuf,
}

impl SqliteIdentityStore {
    /// Open or create a store at the given path.
    pub fn open(path: &Path, scope: impl Into<String>) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Io(format!("create dir: {e}")))?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(PRAGMAS)
            .map_err(|e| StoreError::Database(format!("pragmas: {e}")))?;
        conn.execute_batch(CREATE_TABLES)
            .map_err(|e| StoreError::Database(format!("schema: {e}")))?;

        let scope = scope.into();
        info!(path = %path.display(), scope = %scope, "identity store opened");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            scope,
            path: path.to_owned(),
        })
    }

    /// Open an in-memory store (for testing).
    pub fn in_memory(scope: impl Into<String>) -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(CREATE_TABLES)
            .map_err(|e| StoreError::Database(format!("schema: {e}")))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            scope: scope.into(),
            path: PathBuf::from(":memory:"),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Delete every key of this scope.
    pub fn clear_scope(&self) -> Result<usize, StoreError> {
        let conn = self.conn.lock();
        Ok(conn.execute("DELETE FROM identity_kv WHERE scope = ?1", params![self.scope])?)
    }
}

impl IdentityStore for SqliteIdentityStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.conn.lock();
        let value = conn
            .query_row(
                "SELECT value FROM identity_kv WHERE scope = ?1 AND key = ?2",
                params![self.scope, key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        let _ = conn.execute(
            "INSERT INTO identity_kv (scope, key, value, updated_at)
             VALUES (?1, ?2, ?3, datetime('now'))
             ON CONFLICT(scope, key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![self.scope, key, value],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        let _ = conn.execute(
            "DELETE FROM identity_kv WHERE scope = ?1 AND key = ?2",
            params![self.scope, key],
        )?;
        Ok(())
    }
}
