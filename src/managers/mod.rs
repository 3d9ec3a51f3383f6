// Tab Groups state managers
// Managers handle stateful operations: capturing the live layout, storing groups, restoring them, following branches.

pub mod branch_tracker;
pub mod editor_probe;
pub mod group_store;
pub mod restore_engine;
