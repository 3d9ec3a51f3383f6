//! Unit tests for the persistence layer (connection, migrations, key-value stores).

use std::sync::Arc;

use tabgroups::database::migrations::{get_schema_version, CURRENT_SCHEMA_VERSION};
use tabgroups::database::{Database, KeyValueStore, MemoryKeyValueStore, SqliteKeyValueStore};
use tabgroups::types::settings::StorageScope;
use tempfile::TempDir;

#[test]
fn test_open_in_memory_succeeds() {
    let db = Database::open_in_memory();
    assert!(db.is_ok(), "open_in_memory should succeed");
}

#[test]
fn test_migrations_create_kv_table_and_index() {
    let db = Database::open_in_memory().expect("open_in_memory failed");
    let conn = db.connection().unwrap();

    let table: bool = conn
        .query_row(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='kv_entries'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert!(table, "kv_entries should exist after migrations");

    let index: bool = conn
        .query_row(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='index' AND name='idx_kv_workspace'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert!(index, "idx_kv_workspace should exist after migrations");
}

#[test]
fn test_schema_version_is_current() {
    let db = Database::open_in_memory().unwrap();
    let conn = db.connection().unwrap();
    assert_eq!(get_schema_version(&conn), CURRENT_SCHEMA_VERSION);
}

#[test]
fn test_reopening_file_database_keeps_data() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("tabgroups.db");
    {
        let db = Arc::new(Database::open(&path).unwrap());
        let store = SqliteKeyValueStore::new(db, "/ws/one");
        store.set(StorageScope::Workspace, "k", "v").unwrap();
    }
    let db = Arc::new(Database::open(&path).unwrap());
    let store = SqliteKeyValueStore::new(db.clone(), "/ws/one");
    assert_eq!(store.get(StorageScope::Workspace, "k").unwrap().as_deref(), Some("v"));
    let conn = db.connection().unwrap();
    assert_eq!(get_schema_version(&conn), CURRENT_SCHEMA_VERSION);
}

#[test]
fn test_sqlite_store_set_replaces_value() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let store = SqliteKeyValueStore::new(db, "/ws");
    store.set(StorageScope::Global, "k", "first").unwrap();
    store.set(StorageScope::Global, "k", "second").unwrap();
    assert_eq!(store.get(StorageScope::Global, "k").unwrap().as_deref(), Some("second"));
}

#[test]
fn test_sqlite_workspace_scope_is_per_workspace() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let one = SqliteKeyValueStore::new(db.clone(), "/ws/one");
    let two = SqliteKeyValueStore::new(db, "/ws/two");

    one.set(StorageScope::Workspace, "k", "one").unwrap();
    one.set(StorageScope::Global, "k", "shared").unwrap();

    assert!(two.get(StorageScope::Workspace, "k").unwrap().is_none());
    assert_eq!(two.get(StorageScope::Global, "k").unwrap().as_deref(), Some("shared"));
}

#[test]
fn test_sqlite_delete_removes_entry() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let store = SqliteKeyValueStore::new(db, "/ws");
    store.set(StorageScope::Workspace, "k", "v").unwrap();
    store.delete(StorageScope::Workspace, "k").unwrap();
    assert!(store.get(StorageScope::Workspace, "k").unwrap().is_none());
    // Deleting again is fine.
    store.delete(StorageScope::Workspace, "k").unwrap();
}

#[test]
fn test_memory_store_missing_key_is_none() {
    let store = MemoryKeyValueStore::new();
    assert!(store.get(StorageScope::Global, "nothing").unwrap().is_none());
}
