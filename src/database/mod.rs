//! Persistence layer.
//!
//! The groups are kept as one flat string value in a key-value store with a
//! global and a per-workspace scope. Inside the editor that store is the editor's
//! own settings storage; standalone, it is the SQLite table defined here.
//!
//! ```no_run
//! use std::sync::Arc;
//! use tabgroups::database::{Database, KeyValueStore, SqliteKeyValueStore};
//! use tabgroups::types::settings::StorageScope;
//!
//! let db = Arc::new(Database::open("tabgroups.db").expect("failed to open database"));
//! let store = SqliteKeyValueStore::new(db, "/home/me/project");
//! store.set(StorageScope::Workspace, "tab-groups.groups", "W10=").unwrap();
//! ```

pub mod connection;
pub mod kv_store;
pub mod migrations;

pub use connection::Database;
pub use kv_store::{KeyValueStore, MemoryKeyValueStore, SqliteKeyValueStore};
