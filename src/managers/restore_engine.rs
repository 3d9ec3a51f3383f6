//! Restore Engine for Tab Groups.
//!
//! Replays a stored snapshot against the editor. Tabs open one at a time in the
//! recorded order, because every open lands relative to what is already there.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::host::{EditorHost, OpenRequest};
use crate::services::settings_engine::{read_settings, SharedSettings};
use crate::types::errors::HostError;
use crate::types::snapshot::Snapshot;
use crate::types::tab::{TabKind, TabRef};

/// Outcome of a restore.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreReport {
    pub opened: usize,
    /// Document keys of tabs that could not be opened.
    pub failed: Vec<String>,
    /// Whether the recorded focus was put back.
    pub focused: bool,
}

/// Opens stored snapshots in the editor.
pub struct RestoreEngine {
    host: Arc<dyn EditorHost>,
    settings: SharedSettings,
}

impl RestoreEngine {
    pub fn new(host: Arc<dyn EditorHost>, settings: SharedSettings) -> Self {
        Self { host, settings }
    }

    /// Opens every tab of `snapshot`, then restores the focus.
    ///
    /// A tab that fails to open is logged and skipped.
    pub async fn restore(&self, snapshot: &Snapshot) -> RestoreReport {
        let folders = self.folders().await;

        let mut report = RestoreReport::default();
        // Kind actually opened per tab, for focusing afterwards.
        let mut opened: Vec<Vec<Option<TabKind>>> = Vec::with_capacity(snapshot.groups.len());
        for group in &snapshot.groups {
            let mut kinds = Vec::with_capacity(group.tabs.len());
            for tab in &group.tabs {
                match self.open(tab, &folders).await {
                    Ok(kind) => {
                        report.opened += 1;
                        kinds.push(Some(kind));
                    }
                    Err(e) => {
                        warn!("Skipping tab {}: {}", tab.label, e);
                        report.failed.push(tab.document_key());
                        kinds.push(None);
                    }
                }
            }
            opened.push(kinds);
        }

        let mut active_target = None;
        for (group, kinds) in snapshot.groups.iter().zip(&opened) {
            let Some(kind) = group
                .active_tab_index()
                .and_then(|i| kinds.get(i))
                .and_then(Option::as_ref)
            else {
                continue;
            };
            if Some(group.group_index) == snapshot.active_group_index {
                active_target = Some((kind, group.group_index));
            } else {
                self.focus(kind, group.group_index).await;
            }
        }
        if let Some((kind, view_column)) = active_target {
            report.focused = self.focus(kind, view_column).await;
        }

        debug!(
            "Restored {} tabs, {} failed",
            report.opened,
            report.failed.len()
        );
        report
    }

    /// Opens a single stored tab on its own.
    pub async fn open_one(&self, tab: &TabRef) -> Result<TabKind, HostError> {
        let folders = self.folders().await;
        self.open(tab, &folders).await
    }

    /// Workspace folders to try first, empty unless `relativePaths` is on.
    async fn folders(&self) -> Vec<String> {
        if !read_settings(&self.settings).relative_paths {
            return Vec::new();
        }
        match self.host.workspace_folders().await {
            Ok(folders) => folders,
            Err(e) => {
                warn!("Could not read workspace folders: {}", e);
                Vec::new()
            }
        }
    }

    /// Opens one stored tab, pinning it if it was pinned. Returns the kind that
    /// was actually opened.
    async fn open(&self, tab: &TabRef, folders: &[String]) -> Result<TabKind, HostError> {
        let kind = self.open_kind(tab, folders).await?;
        if tab.is_pinned {
            self.host.pin_active().await?;
        }
        debug!("Opened {}", kind.document_key());
        Ok(kind)
    }

    /// Opens the tab, trying each workspace folder first for files.
    async fn open_kind(&self, tab: &TabRef, folders: &[String]) -> Result<TabKind, HostError> {
        if let TabKind::File { path } = &tab.kind {
            for folder in folders {
                let kind = TabKind::File {
                    path: join_workspace_path(folder, path),
                };
                match self.host.open_tab(&self.request(tab, kind.clone())).await {
                    Ok(()) => return Ok(kind),
                    Err(e) => debug!("Not in workspace folder {}: {}", folder, e),
                }
            }
        }
        self.host
            .open_tab(&self.request(tab, tab.kind.clone()))
            .await?;
        Ok(tab.kind.clone())
    }

    fn request(&self, tab: &TabRef, kind: TabKind) -> OpenRequest {
        OpenRequest {
            kind,
            label: tab.label.clone(),
            view_column: tab.group_index,
            preview: false,
        }
    }

    async fn focus(&self, kind: &TabKind, view_column: u32) -> bool {
        match self.host.focus_tab(kind, view_column).await {
            Ok(found) => found,
            Err(e) => {
                debug!("Could not focus {}: {}", kind.document_key(), e);
                false
            }
        }
    }
}

/// `path` resolved under a workspace folder.
pub fn join_workspace_path(folder: &str, path: &str) -> String {
    format!(
        "{}/{}",
        folder.trim_end_matches(['/', '\\']),
        path.trim_start_matches(['/', '\\'])
    )
}
