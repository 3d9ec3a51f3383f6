use serde::{Deserialize, Serialize};

use super::tab::TabRef;

/// An ordered set of tabs sharing one split position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditorGroup {
    /// 1-based ordinal, left to right.
    pub group_index: u32,
    /// Whether this group held overall focus when captured.
    pub is_active: bool,
    /// Tabs in left-to-right order.
    pub tabs: Vec<TabRef>,
}

impl EditorGroup {
    pub fn active_tab(&self) -> Option<&TabRef> {
        self.tabs.iter().find(|t| t.is_active)
    }

    pub fn active_tab_index(&self) -> Option<usize> {
        self.tabs.iter().position(|t| t.is_active)
    }
}

/// The full tab layout at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub groups: Vec<EditorGroup>,
    pub active_group_index: Option<u32>,
}

impl Snapshot {
    /// A snapshot with no groups, meaning "nothing to restore".
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.iter().all(|g| g.tabs.is_empty())
    }

    pub fn tab_count(&self) -> usize {
        self.groups.iter().map(|g| g.tabs.len()).sum()
    }

    pub fn active_group(&self) -> Option<&EditorGroup> {
        let index = self.active_group_index?;
        self.groups.iter().find(|g| g.group_index == index)
    }

    /// Document key of the focused tab in the focused group.
    pub fn active_tab_key(&self) -> Option<String> {
        self.active_group()
            .and_then(|g| g.active_tab())
            .map(|t| t.document_key())
    }

    /// Document keys per group, in order. Handy for comparing layouts.
    pub fn document_keys(&self) -> Vec<Vec<String>> {
        self.groups
            .iter()
            .map(|g| g.tabs.iter().map(|t| t.document_key()).collect())
            .collect()
    }

    /// Pin flags per group, in order.
    pub fn pin_flags(&self) -> Vec<Vec<bool>> {
        self.groups
            .iter()
            .map(|g| g.tabs.iter().map(|t| t.is_pinned).collect())
            .collect()
    }
}

/// A snapshot bound to a user-chosen name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedGroup {
    pub name: String,
    pub snapshot: Snapshot,
}

impl NamedGroup {
    pub fn new(name: &str, snapshot: Snapshot) -> Self {
        Self {
            name: name.to_string(),
            snapshot,
        }
    }
}
