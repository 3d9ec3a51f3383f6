//! Key-value stores for the persisted groups.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{params, OptionalExtension};

use super::connection::Database;
use crate::types::errors::StorageError;
use crate::types::settings::StorageScope;

/// A flat string store with a global and a workspace scope.
///
/// Writes replace the whole value for a key; there are no partial updates.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, scope: StorageScope, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, scope: StorageScope, key: &str, value: &str) -> Result<(), StorageError>;
    fn delete(&self, scope: StorageScope, key: &str) -> Result<(), StorageError>;
}

/// SQLite-backed store. Workspace entries are keyed by a workspace id.
pub struct SqliteKeyValueStore {
    db: Arc<Database>,
    workspace: String,
}

impl SqliteKeyValueStore {
    pub fn new(db: Arc<Database>, workspace: &str) -> Self {
        Self {
            db,
            workspace: workspace.to_string(),
        }
    }

    fn workspace_for(&self, scope: StorageScope) -> &str {
        match scope {
            StorageScope::Global => "",
            StorageScope::Workspace => &self.workspace,
        }
    }
}

impl KeyValueStore for SqliteKeyValueStore {
    fn get(&self, scope: StorageScope, key: &str) -> Result<Option<String>, StorageError> {
        let conn = self.db.connection()?;
        let value = conn
            .query_row(
                "SELECT value FROM kv_entries WHERE scope = ?1 AND workspace = ?2 AND key = ?3",
                params![scope.as_str(), self.workspace_for(scope), key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, scope: StorageScope, key: &str, value: &str) -> Result<(), StorageError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;
        let conn = self.db.connection()?;
        conn.execute(
            "INSERT INTO kv_entries (scope, workspace, key, value, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(scope, workspace, key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![scope.as_str(), self.workspace_for(scope), key, value, now],
        )?;
        Ok(())
    }

    fn delete(&self, scope: StorageScope, key: &str) -> Result<(), StorageError> {
        let conn = self.db.connection()?;
        conn.execute(
            "DELETE FROM kv_entries WHERE scope = ?1 AND workspace = ?2 AND key = ?3",
            params![scope.as_str(), self.workspace_for(scope), key],
        )?;
        Ok(())
    }
}

/// In-memory store, used by tests and by hosts that persist elsewhere.
#[derive(Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<HashMap<(StorageScope, String), String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, scope: StorageScope, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self.entries.lock().map_err(|_| StorageError::LockPoisoned)?;
        Ok(entries.get(&(scope, key.to_string())).cloned())
    }

    fn set(&self, scope: StorageScope, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::LockPoisoned)?;
        entries.insert((scope, key.to_string()), value.to_string());
        Ok(())
    }

    fn delete(&self, scope: StorageScope, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::LockPoisoned)?;
        entries.remove(&(scope, key.to_string()));
        Ok(())
    }
}
