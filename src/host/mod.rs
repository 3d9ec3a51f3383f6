//! Capabilities the extension needs from the editor it runs in.
//!
//! The editor owns the windows and tabs; everything here is a request to it.
//! All calls are asynchronous round-trips and are the only suspension points of a
//! command. [`memory`] provides an in-process implementation that models the
//! editor's tab behavior.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::types::errors::HostError;
use crate::types::tab::{ActiveEditor, LiveLayout, TabKind};

pub mod memory;

/// Default bound on waiting for the host to report a focus change.
pub const DEFAULT_FOCUS_TIMEOUT: Duration = Duration::from_millis(300);

/// What the host said about a close request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseSignal {
    /// The tab was closed.
    Closed,
    /// The host refused, usually because the tab is pinned.
    Refused,
    /// The host gave no definite answer.
    Unknown,
}

/// A request to open one stored tab.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenRequest {
    pub kind: TabKind,
    pub label: String,
    /// 1-based group position. A position past the last group creates a new group.
    pub view_column: u32,
    pub preview: bool,
}

/// Window and tab operations of the editor.
#[async_trait]
pub trait EditorHost: Send + Sync {
    /// The whole layout, if the host can enumerate it in one call.
    async fn tab_groups(&self) -> Result<Option<LiveLayout>, HostError>;

    /// The focused editor, if any.
    async fn active_editor(&self) -> Result<Option<ActiveEditor>, HostError>;

    /// Resolves with the focused editor once the host reports a focus change made
    /// by the last command. May never resolve; callers bound it with a timeout.
    async fn next_active_change(&self) -> Result<Option<ActiveEditor>, HostError>;

    /// Whether the focused tab is pinned, if the host can tell.
    async fn active_is_pinned(&self) -> Result<Option<bool>, HostError>;

    async fn focus_first_group(&self) -> Result<(), HostError>;
    async fn first_editor_in_group(&self) -> Result<(), HostError>;
    async fn next_editor(&self) -> Result<(), HostError>;
    async fn close_active(&self) -> Result<CloseSignal, HostError>;
    async fn close_active_pinned(&self) -> Result<CloseSignal, HostError>;
    async fn close_all(&self) -> Result<(), HostError>;

    /// Opens (or focuses, if already open there) a tab, non-preview unless asked.
    async fn open_tab(&self, request: &OpenRequest) -> Result<(), HostError>;
    async fn pin_active(&self) -> Result<(), HostError>;

    /// Focuses an open tab. Returns `false` if it is not open in that group.
    async fn focus_tab(&self, kind: &TabKind, view_column: u32) -> Result<bool, HostError>;

    async fn workspace_folders(&self) -> Result<Vec<String>, HostError>;
}

/// Prompts and messages shown to the user.
///
/// `None` from a prompt means the user dismissed it.
#[async_trait]
pub trait UserInteraction: Send + Sync {
    async fn pick_group(&self, names: &[String], placeholder: &str) -> Option<String>;
    async fn input_name(&self, placeholder: &str) -> Option<String>;
    /// Free-text yes/no answer.
    async fn confirm(&self, prompt: &str) -> Option<String>;
    async fn show_info(&self, message: &str);
    async fn show_warning(&self, message: &str);
}

/// Waits for the focus change following a host command, bounded by `timeout`.
///
/// On timeout the currently focused editor is read instead, so a host that never
/// reports a change cannot stall the caller.
pub async fn await_focus(
    host: &dyn EditorHost,
    timeout: Duration,
) -> Result<Option<ActiveEditor>, HostError> {
    match tokio::time::timeout(timeout, host.next_active_change()).await {
        Ok(result) => result,
        Err(_) => host.active_editor().await,
    }
}
