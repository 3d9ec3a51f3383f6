//! Tab Groups: save, restore and track named arrangements of editor tabs.
//!
//! This library crate exposes all modules for use by the RPC binary and integration tests.

pub mod app;
pub mod database;
pub mod host;
pub mod managers;
pub mod rpc_handler;
pub mod rpc_peer;
pub mod services;
pub mod types;
