//! Snapshot Store for Tab Groups.
//!
//! Keeps the named groups in insertion order, the name of the group under live
//! tracking and an undo stack of whole prior mappings. Every mutation writes the
//! whole mapping back to the key-value store in one `set` and notifies subscribers.
//! The storage scope is read from the settings at every write, so flipping
//! `saveGlobally` takes effect immediately.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::database::KeyValueStore;
use crate::services::settings_engine::{read_settings, SharedSettings};
use crate::services::snapshot_codec::{decode_store, encode_store};
use crate::types::errors::StoreError;
use crate::types::settings::{StorageScope, GROUPS_KEY};
use crate::types::snapshot::{NamedGroup, Snapshot};

/// Capacity of the change channel. Slow subscribers miss old changes, not new ones.
const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// A change to the store, sent to subscribers after it was persisted.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreChange {
    Added(String),
    Updated(String),
    Removed(String),
    Renamed { from: String, to: String },
    Tracking(Option<String>),
    Undone,
    Reloaded,
}

/// Result of [`GroupStoreTrait::undo`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndoOutcome {
    Undone,
    NothingToUndo,
}

/// Trait defining the snapshot store interface.
pub trait GroupStoreTrait {
    fn add(&mut self, name: &str, snapshot: Snapshot) -> Result<(), StoreError>;
    fn remove(&mut self, name: &str, is_updating: bool) -> Result<bool, StoreError>;
    fn update(&mut self, name: &str, snapshot: Snapshot, create_if_missing: bool) -> Result<bool, StoreError>;
    fn rename(&mut self, old_name: &str, new_name: &str) -> Result<bool, StoreError>;
    fn track(&mut self, name: &str) -> Result<Option<NamedGroup>, StoreError>;
    fn refresh_tracked(&mut self, snapshot: Snapshot) -> Result<bool, StoreError>;
    fn undo(&mut self) -> Result<UndoOutcome, StoreError>;
    fn remove_tab(&mut self, name: &str, group_index: u32, document_key: &str) -> Result<bool, StoreError>;
    fn remove_split(&mut self, name: &str, group_index: u32) -> Result<bool, StoreError>;
    fn reload(&mut self) -> Result<(), StoreError>;
    fn get(&self, name: &str) -> Option<&NamedGroup>;
    fn list_names(&self) -> Vec<String>;
    fn count(&self) -> usize;
    fn new_default_name(&self) -> String;
    fn contains(&self, name: &str) -> bool;
    fn tracking_name(&self) -> Option<&str>;
}

/// Named groups persisted in a [`KeyValueStore`].
pub struct GroupStore {
    kv: Arc<dyn KeyValueStore>,
    settings: SharedSettings,
    groups: Vec<NamedGroup>,
    tracking: Option<String>,
    undo_stack: Vec<Vec<NamedGroup>>,
    changes: broadcast::Sender<StoreChange>,
}

impl GroupStore {
    /// Creates a store and loads the groups of the currently selected scope.
    pub fn new(kv: Arc<dyn KeyValueStore>, settings: SharedSettings) -> Result<Self, StoreError> {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let mut store = Self {
            kv,
            settings,
            groups: Vec::new(),
            tracking: None,
            undo_stack: Vec::new(),
            changes,
        };
        store.groups = store.load()?;
        Ok(store)
    }

    /// Receives every change made from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    /// All groups in display order.
    pub fn groups(&self) -> &[NamedGroup] {
        &self.groups
    }

    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    fn scope(&self) -> StorageScope {
        read_settings(&self.settings).storage_scope()
    }

    fn load(&self) -> Result<Vec<NamedGroup>, StoreError> {
        let scope = self.scope();
        let groups = match self.kv.get(scope, GROUPS_KEY)? {
            Some(value) => decode_store(&value),
            None => Vec::new(),
        };
        debug!("Loaded {} tab groups from {} storage", groups.len(), scope.as_str());
        Ok(groups)
    }

    /// Persists `next` and only then makes it the current mapping. On a failed
    /// write neither the groups nor the undo stack change.
    fn commit(
        &mut self,
        next: Vec<NamedGroup>,
        record_undo: bool,
        change: StoreChange,
    ) -> Result<(), StoreError> {
        self.kv.set(self.scope(), GROUPS_KEY, &encode_store(&next))?;
        let previous = std::mem::replace(&mut self.groups, next);
        if record_undo {
            self.undo_stack.push(previous);
        }
        // Nobody listening is fine.
        let _ = self.changes.send(change);
        Ok(())
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.groups.iter().position(|g| g.name == name)
    }

    /// Drops tracking if the tracked group no longer exists.
    fn check_tracking(&mut self) -> bool {
        let dangling = self
            .tracking
            .as_deref()
            .is_some_and(|name| self.position(name).is_none());
        if dangling {
            self.tracking = None;
        }
        dangling
    }

    fn replace_snapshot(
        &mut self,
        name: &str,
        edit: impl FnOnce(&Snapshot) -> Option<Snapshot>,
    ) -> Result<bool, StoreError> {
        let Some(index) = self.position(name) else {
            return Ok(false);
        };
        let Some(snapshot) = edit(&self.groups[index].snapshot) else {
            return Ok(false);
        };
        let mut next = self.groups.clone();
        next[index].snapshot = snapshot;
        self.commit(next, true, StoreChange::Updated(name.to_string()))?;
        Ok(true)
    }
}

impl GroupStoreTrait for GroupStore {
    /// Adds a group. An existing group of the same name is replaced and the new
    /// entry goes to the end.
    fn add(&mut self, name: &str, snapshot: Snapshot) -> Result<(), StoreError> {
        let mut next = self.groups.clone();
        if let Some(index) = self.position(name) {
            debug!("Overwriting tab group {:?}", name);
            next.remove(index);
        }
        next.push(NamedGroup::new(name, snapshot));
        self.commit(next, true, StoreChange::Added(name.to_string()))
    }

    /// Removes a group. `is_updating` skips the undo entry for callers that
    /// already pushed one.
    fn remove(&mut self, name: &str, is_updating: bool) -> Result<bool, StoreError> {
        let Some(index) = self.position(name) else {
            return Ok(false);
        };
        let mut next = self.groups.clone();
        next.remove(index);
        self.commit(next, !is_updating, StoreChange::Removed(name.to_string()))?;
        if self.tracking.as_deref() == Some(name) {
            info!("Stopped tracking removed tab group {:?}", name);
            self.tracking = None;
        }
        Ok(true)
    }

    /// Replaces a group's snapshot where it stands, with one undo entry.
    ///
    /// Returns `false` when the group is missing and `create_if_missing` is off.
    fn update(&mut self, name: &str, snapshot: Snapshot, create_if_missing: bool) -> Result<bool, StoreError> {
        let mut next = self.groups.clone();
        let change = match self.position(name) {
            Some(index) => {
                next[index].snapshot = snapshot;
                StoreChange::Updated(name.to_string())
            }
            None if create_if_missing => {
                next.push(NamedGroup::new(name, snapshot));
                StoreChange::Added(name.to_string())
            }
            None => return Ok(false),
        };
        self.commit(next, true, change)?;
        Ok(true)
    }

    /// Renames a group in place. A group already called `new_name` is replaced.
    fn rename(&mut self, old_name: &str, new_name: &str) -> Result<bool, StoreError> {
        if old_name == new_name {
            return Ok(self.contains(old_name));
        }
        if self.position(old_name).is_none() {
            return Ok(false);
        }

        let mut next = self.groups.clone();
        if let Some(existing) = next.iter().position(|g| g.name == new_name) {
            debug!("Rename of {:?} overwrites {:?}", old_name, new_name);
            next.remove(existing);
        }
        if let Some(group) = next.iter_mut().find(|g| g.name == old_name) {
            group.name = new_name.to_string();
        }
        self.commit(
            next,
            true,
            StoreChange::Renamed {
                from: old_name.to_string(),
                to: new_name.to_string(),
            },
        )?;

        if self.tracking.as_deref() == Some(new_name) {
            self.tracking = None;
        }
        if self.tracking.as_deref() == Some(old_name) {
            self.tracking = Some(new_name.to_string());
        }
        Ok(true)
    }

    /// Starts tracking `name`, or with an empty name stops tracking and hands
    /// back the group that was tracked.
    fn track(&mut self, name: &str) -> Result<Option<NamedGroup>, StoreError> {
        if name.is_empty() {
            let previous = self.tracking.take();
            let group = previous
                .as_deref()
                .and_then(|n| self.get(n))
                .cloned();
            if previous.is_some() {
                let _ = self.changes.send(StoreChange::Tracking(None));
            }
            return Ok(group);
        }

        if !self.contains(name) {
            debug!("Not tracking unknown tab group {:?}", name);
            return Ok(None);
        }
        self.tracking = Some(name.to_string());
        let _ = self.changes.send(StoreChange::Tracking(Some(name.to_string())));
        Ok(None)
    }

    /// Writes the live layout into the tracked group. No undo entry is made.
    fn refresh_tracked(&mut self, snapshot: Snapshot) -> Result<bool, StoreError> {
        let Some(name) = self.tracking.clone() else {
            return Ok(false);
        };
        let Some(index) = self.position(&name) else {
            self.tracking = None;
            return Ok(false);
        };
        let mut next = self.groups.clone();
        next[index].snapshot = snapshot;
        self.commit(next, false, StoreChange::Updated(name))?;
        Ok(true)
    }

    fn undo(&mut self) -> Result<UndoOutcome, StoreError> {
        let Some(previous) = self.undo_stack.last().cloned() else {
            return Ok(UndoOutcome::NothingToUndo);
        };
        self.commit(previous, false, StoreChange::Undone)?;
        self.undo_stack.pop();
        if self.check_tracking() {
            info!("Undo removed the tracked tab group, tracking stopped");
        }
        Ok(UndoOutcome::Undone)
    }

    /// Removes the first tab with `document_key` from split `group_index`.
    fn remove_tab(&mut self, name: &str, group_index: u32, document_key: &str) -> Result<bool, StoreError> {
        self.replace_snapshot(name, |snapshot| {
            without_tab(snapshot, group_index, document_key)
        })
    }

    /// Removes split `group_index` from a group.
    fn remove_split(&mut self, name: &str, group_index: u32) -> Result<bool, StoreError> {
        self.replace_snapshot(name, |snapshot| without_split(snapshot, group_index))
    }

    /// Re-reads the groups from the currently selected scope.
    ///
    /// The undo stack is dropped since it describes the other scope.
    fn reload(&mut self) -> Result<(), StoreError> {
        self.groups = self.load()?;
        self.undo_stack.clear();
        self.check_tracking();
        let _ = self.changes.send(StoreChange::Reloaded);
        Ok(())
    }

    fn get(&self, name: &str) -> Option<&NamedGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    fn list_names(&self) -> Vec<String> {
        self.groups.iter().map(|g| g.name.clone()).collect()
    }

    fn count(&self) -> usize {
        self.groups.len()
    }

    /// `"Group N"` with the smallest free N that is at least `count() + 1`.
    fn new_default_name(&self) -> String {
        let mut n = self.count() + 1;
        loop {
            let name = format!("Group {}", n);
            if !self.contains(&name) {
                return name;
            }
            n += 1;
        }
    }

    fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    fn tracking_name(&self) -> Option<&str> {
        self.tracking.as_deref()
    }
}

/// Renumbers groups 1..n after removals and keeps the active group pointing at
/// the same split.
fn renumber(mut snapshot: Snapshot) -> Snapshot {
    let old_active = snapshot.active_group_index;
    snapshot.groups.retain(|g| !g.tabs.is_empty());
    snapshot.active_group_index = None;
    for (position, group) in snapshot.groups.iter_mut().enumerate() {
        let index = position as u32 + 1;
        if Some(group.group_index) == old_active {
            snapshot.active_group_index = Some(index);
        }
        group.group_index = index;
        for tab in &mut group.tabs {
            tab.group_index = index;
        }
    }
    snapshot
}

fn without_tab(snapshot: &Snapshot, group_index: u32, document_key: &str) -> Option<Snapshot> {
    let mut edited = snapshot.clone();
    let group = edited.groups.iter_mut().find(|g| g.group_index == group_index)?;
    let position = group.tabs.iter().position(|t| t.document_key() == document_key)?;
    group.tabs.remove(position);
    if group.tabs.is_empty() {
        group.is_active = false;
    }
    Some(renumber(edited))
}

fn without_split(snapshot: &Snapshot, group_index: u32) -> Option<Snapshot> {
    let mut edited = snapshot.clone();
    let position = edited.groups.iter().position(|g| g.group_index == group_index)?;
    edited.groups.remove(position);
    Some(renumber(edited))
}
