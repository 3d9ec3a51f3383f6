use serde::{Deserialize, Serialize};

/// Prefix the editor puts in front of every setting of this extension.
pub const SETTINGS_PREFIX: &str = "tab-groups.";

/// Key under which the encoded groups are kept in the key-value store.
pub const GROUPS_KEY: &str = "tab-groups.groups";

/// Top-level extension settings container.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtensionSettings {
    pub git_branch_groups: GitBranchGroups,
    /// Keep groups in the global store instead of the workspace store.
    pub save_globally: bool,
    /// Try to reopen file tabs relative to the workspace folders first.
    pub relative_paths: bool,
    /// What a restore triggered from the sidebar does around the restore.
    pub sidebar_restore_style: String,
}

impl Default for ExtensionSettings {
    fn default() -> Self {
        Self {
            git_branch_groups: GitBranchGroups::SaveAndRestore,
            save_globally: false,
            relative_paths: false,
            sidebar_restore_style: "Keep others".to_string(),
        }
    }
}

impl ExtensionSettings {
    /// Sidebar restores first update the last used group.
    pub fn sidebar_updates_current(&self) -> bool {
        self.sidebar_restore_style.starts_with("Update current;")
    }

    /// Sidebar restores close every open editor first.
    pub fn sidebar_closes_others(&self) -> bool {
        self.sidebar_restore_style.ends_with("Close others")
    }

    pub fn storage_scope(&self) -> StorageScope {
        if self.save_globally {
            StorageScope::Global
        } else {
            StorageScope::Workspace
        }
    }
}

/// What happens to tab groups when the checked-out branch changes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum GitBranchGroups {
    #[serde(rename = "Save and Restore")]
    SaveAndRestore,
    #[serde(rename = "Save only")]
    SaveOnly,
    #[serde(rename = "Nothing")]
    Nothing,
}

/// Where persisted groups live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageScope {
    /// Shared by every workspace.
    Global,
    /// Private to the current workspace.
    Workspace,
}

impl StorageScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageScope::Global => "global",
            StorageScope::Workspace => "workspace",
        }
    }
}
