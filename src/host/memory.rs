//! In-process editor host and scripted user interaction.
//!
//! [`InMemoryEditorHost`] keeps a layout of groups and tabs and applies the
//! editor's rules to it: pinned tabs sit at the left of their group, new tabs open
//! to the right of the active one, an emptied group closes unless it is the last,
//! pinned tabs resist a plain close, and next-editor walks across groups and wraps.

use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::{CloseSignal, EditorHost, OpenRequest, UserInteraction};
use crate::services::snapshot_codec::{basename, classify, derive_label};
use crate::types::errors::HostError;
use crate::types::tab::{ActiveEditor, LiveGroup, LiveLayout, LiveTab, TabInput, TabKind};

/// Behavior switches for [`InMemoryEditorHost`].
#[derive(Debug, Clone)]
pub struct HostOptions {
    /// Answer `tab_groups` with the full layout.
    pub enumerate: bool,
    /// Answer `active_is_pinned`.
    pub pin_query: bool,
    /// Report `CloseSignal::Unknown` for every close, like hosts whose close
    /// command returns nothing.
    pub ambiguous_close: bool,
    /// Report focus changes through `next_active_change`.
    pub focus_events: bool,
}

impl Default for HostOptions {
    fn default() -> Self {
        Self {
            enumerate: true,
            pin_query: false,
            ambiguous_close: false,
            focus_events: true,
        }
    }
}

impl HostOptions {
    /// A host with no enumeration and no pin query, the case the probe walks.
    pub fn walk_only() -> Self {
        Self {
            enumerate: false,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
struct MemoryTab {
    label: String,
    input: TabInput,
    pinned: bool,
    preview: bool,
    dirty: bool,
}

impl MemoryTab {
    fn shows(&self, kind: &TabKind) -> bool {
        classify(&self.input, &self.label) == *kind
    }
}

#[derive(Debug, Clone, Default)]
struct MemoryGroup {
    tabs: Vec<MemoryTab>,
    active: usize,
}

impl MemoryGroup {
    fn pinned_count(&self) -> usize {
        self.tabs.iter().filter(|t| t.pinned).count()
    }
}

#[derive(Debug, Default)]
struct HostState {
    groups: Vec<MemoryGroup>,
    active_group: usize,
    focus_changed: bool,
    missing: HashSet<String>,
    workspace_folders: Vec<String>,
    calls: Vec<String>,
}

impl HostState {
    fn active_tab(&self) -> Option<(&MemoryGroup, &MemoryTab)> {
        let group = self.groups.get(self.active_group)?;
        group.tabs.get(group.active).map(|tab| (group, tab))
    }

    fn active_editor(&self) -> Option<ActiveEditor> {
        let (_, tab) = self.active_tab()?;
        Some(ActiveEditor {
            label: tab.label.clone(),
            input: tab.input.clone(),
            view_column: self.active_group as u32 + 1,
            is_preview: tab.preview,
            is_dirty: tab.dirty,
        })
    }

    fn focus(&mut self, group: usize, tab: usize) {
        if self.active_group != group || self.groups[group].active != tab {
            self.focus_changed = true;
        }
        self.active_group = group;
        self.groups[group].active = tab;
    }

    fn remove_active(&mut self) {
        let group_index = self.active_group;
        let Some(group) = self.groups.get_mut(group_index) else {
            return;
        };
        if group.active >= group.tabs.len() {
            return;
        }
        group.tabs.remove(group.active);
        self.focus_changed = true;

        if group.tabs.is_empty() {
            self.groups.remove(group_index);
            if self.active_group >= self.groups.len() {
                self.active_group = self.groups.len().saturating_sub(1);
            }
        } else if group.active >= group.tabs.len() {
            group.active = group.tabs.len() - 1;
        }
    }
}

/// Editor host that lives entirely in memory.
pub struct InMemoryEditorHost {
    options: HostOptions,
    state: Mutex<HostState>,
}

impl InMemoryEditorHost {
    pub fn new(options: HostOptions) -> Self {
        Self {
            options,
            state: Mutex::new(HostState::default()),
        }
    }

    /// A host showing `layout`. Active flags in the layout decide the focus.
    pub fn with_layout(options: HostOptions, layout: &LiveLayout) -> Self {
        let host = Self::new(options);
        host.set_layout(layout);
        host
    }

    fn lock(&self) -> MutexGuard<'_, HostState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn record(&self, call: &str) -> MutexGuard<'_, HostState> {
        let mut state = self.lock();
        state.calls.push(call.to_string());
        state.focus_changed = false;
        state
    }

    /// Replaces the shown layout.
    pub fn set_layout(&self, layout: &LiveLayout) {
        let mut state = self.lock();
        let mut columns: Vec<&LiveGroup> = layout.groups.iter().filter(|g| !g.tabs.is_empty()).collect();
        columns.sort_by_key(|g| g.view_column);

        state.groups = columns
            .iter()
            .map(|g| {
                let mut tabs: Vec<MemoryTab> = g
                    .tabs
                    .iter()
                    .map(|t| MemoryTab {
                        label: t.label.clone(),
                        input: t.input.clone(),
                        pinned: t.is_pinned,
                        preview: t.is_preview,
                        dirty: t.is_dirty,
                    })
                    .collect();
                // Pinned tabs always sit at the left.
                tabs.sort_by_key(|t| !t.pinned);
                let active_input = g.tabs.iter().find(|t| t.is_active).map(|t| &t.input);
                let active = active_input
                    .and_then(|input| tabs.iter().position(|t| &t.input == input))
                    .unwrap_or(0);
                MemoryGroup { tabs, active }
            })
            .collect();
        state.active_group = columns.iter().position(|g| g.is_active).unwrap_or(0);
    }

    /// The layout as the host currently shows it.
    pub fn layout(&self) -> LiveLayout {
        let state = self.lock();
        LiveLayout {
            groups: state
                .groups
                .iter()
                .enumerate()
                .map(|(i, g)| LiveGroup {
                    view_column: i as u32 + 1,
                    is_active: i == state.active_group,
                    tabs: g
                        .tabs
                        .iter()
                        .enumerate()
                        .map(|(j, t)| LiveTab {
                            label: t.label.clone(),
                            input: t.input.clone(),
                            is_pinned: t.pinned,
                            is_preview: t.preview,
                            is_active: j == g.active,
                            is_dirty: t.dirty,
                        })
                        .collect(),
                })
                .collect(),
        }
    }

    /// Makes opening `path` fail, as if the file had been deleted.
    pub fn mark_missing(&self, path: &str) {
        self.lock().missing.insert(path.to_string());
    }

    pub fn set_workspace_folders(&self, folders: &[&str]) {
        self.lock().workspace_folders = folders.iter().map(|f| f.to_string()).collect();
    }

    /// Names of every host call made so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }
}

/// The raw input a host would report for a stored tab kind.
fn input_for(kind: &TabKind) -> Option<TabInput> {
    let input = match kind {
        TabKind::File { path } => TabInput::file(path),
        TabKind::CustomFile { path, view_type } => TabInput {
            uri: Some(path.clone()),
            view_type: Some(view_type.clone()),
            ..TabInput::default()
        },
        TabKind::Webview { view_type } => TabInput {
            view_type: Some(view_type.clone()),
            ..TabInput::default()
        },
        TabKind::Diff { original, modified } => TabInput {
            original: Some(original.clone()),
            modified: Some(modified.clone()),
            ..TabInput::default()
        },
        TabKind::NotebookDiff {
            notebook_type,
            original,
            modified,
        } => TabInput {
            notebook_type: Some(notebook_type.clone()),
            original: Some(original.clone()),
            modified: Some(modified.clone()),
            ..TabInput::default()
        },
        TabKind::Notebook {
            notebook_type,
            path,
        } => TabInput {
            uri: Some(path.clone()),
            notebook_type: Some(notebook_type.clone()),
            ..TabInput::default()
        },
        TabKind::Terminal { .. } => TabInput::default(),
        TabKind::Untitled => return None,
    };
    Some(input)
}

fn live_label(kind: &TabKind) -> String {
    match kind {
        TabKind::Terminal { label } => label.clone(),
        TabKind::File { path } => basename(path).to_string(),
        other => derive_label(other),
    }
}

#[async_trait]
impl EditorHost for InMemoryEditorHost {
    async fn tab_groups(&self) -> Result<Option<LiveLayout>, HostError> {
        self.lock().calls.push("tab_groups".to_string());
        if self.options.enumerate {
            Ok(Some(self.layout()))
        } else {
            Ok(None)
        }
    }

    async fn active_editor(&self) -> Result<Option<ActiveEditor>, HostError> {
        Ok(self.lock().active_editor())
    }

    async fn next_active_change(&self) -> Result<Option<ActiveEditor>, HostError> {
        let changed = {
            let state = self.lock();
            (self.options.focus_events && state.focus_changed).then(|| state.active_editor())
        };
        match changed {
            Some(editor) => Ok(editor),
            None => std::future::pending().await,
        }
    }

    async fn active_is_pinned(&self) -> Result<Option<bool>, HostError> {
        if !self.options.pin_query {
            return Ok(None);
        }
        Ok(self.lock().active_tab().map(|(_, tab)| tab.pinned))
    }

    async fn focus_first_group(&self) -> Result<(), HostError> {
        let mut state = self.record("focus_first_group");
        if !state.groups.is_empty() {
            let active = state.groups[0].active;
            state.focus(0, active);
        }
        Ok(())
    }

    async fn first_editor_in_group(&self) -> Result<(), HostError> {
        let mut state = self.record("first_editor_in_group");
        let group = state.active_group;
        if state.groups.get(group).is_some_and(|g| !g.tabs.is_empty()) {
            state.focus(group, 0);
        }
        Ok(())
    }

    async fn next_editor(&self) -> Result<(), HostError> {
        let mut state = self.record("next_editor");
        let group = state.active_group;
        let Some(current) = state.groups.get(group) else {
            return Ok(());
        };
        if current.active + 1 < current.tabs.len() {
            let next = current.active + 1;
            state.focus(group, next);
        } else {
            let next_group = (group + 1) % state.groups.len();
            state.focus(next_group, 0);
        }
        Ok(())
    }

    async fn close_active(&self) -> Result<CloseSignal, HostError> {
        let mut state = self.record("close_active");
        let signal = match state.active_tab().map(|(_, tab)| tab.pinned) {
            None => CloseSignal::Closed,
            Some(true) => CloseSignal::Refused,
            Some(false) => {
                state.remove_active();
                CloseSignal::Closed
            }
        };
        Ok(if self.options.ambiguous_close {
            CloseSignal::Unknown
        } else {
            signal
        })
    }

    async fn close_active_pinned(&self) -> Result<CloseSignal, HostError> {
        let mut state = self.record("close_active_pinned");
        state.remove_active();
        Ok(if self.options.ambiguous_close {
            CloseSignal::Unknown
        } else {
            CloseSignal::Closed
        })
    }

    async fn close_all(&self) -> Result<(), HostError> {
        let mut state = self.record("close_all");
        if !state.groups.is_empty() {
            state.focus_changed = true;
        }
        state.groups.clear();
        state.active_group = 0;
        Ok(())
    }

    async fn open_tab(&self, request: &OpenRequest) -> Result<(), HostError> {
        let mut state = self.record("open_tab");
        let key = request.kind.document_key();
        let input = input_for(&request.kind).ok_or_else(|| HostError::OpenFailed {
            key: key.clone(),
            reason: "nothing to reopen".to_string(),
        })?;
        if let Some(path) = request.kind.file_path() {
            if state.missing.contains(path) {
                return Err(HostError::OpenFailed {
                    key,
                    reason: "file not found".to_string(),
                });
            }
        }

        let column = request.view_column.max(1) as usize;
        let group_index = if column <= state.groups.len() {
            column - 1
        } else {
            state.groups.push(MemoryGroup::default());
            state.groups.len() - 1
        };

        let label = live_label(&request.kind);
        let group = &mut state.groups[group_index];
        let tab_index = match group.tabs.iter().position(|t| t.shows(&request.kind)) {
            Some(existing) => {
                group.tabs[existing].preview &= request.preview;
                existing
            }
            None => {
                let after_active = if group.tabs.is_empty() { 0 } else { group.active + 1 };
                let position = after_active.max(group.pinned_count()).min(group.tabs.len());
                group.tabs.insert(
                    position,
                    MemoryTab {
                        label,
                        input,
                        pinned: false,
                        preview: request.preview,
                        dirty: false,
                    },
                );
                position
            }
        };
        state.focus(group_index, tab_index);
        Ok(())
    }

    async fn pin_active(&self) -> Result<(), HostError> {
        let mut state = self.record("pin_active");
        let group_index = state.active_group;
        let Some(group) = state.groups.get_mut(group_index) else {
            return Ok(());
        };
        let Some(tab) = group.tabs.get(group.active) else {
            return Ok(());
        };
        if tab.pinned {
            return Ok(());
        }
        // Move to the end of the pinned section.
        let pinned_before = group.pinned_count();
        let mut tab = group.tabs.remove(group.active);
        tab.pinned = true;
        tab.preview = false;
        let position = pinned_before.min(group.tabs.len());
        group.tabs.insert(position, tab);
        group.active = position;
        Ok(())
    }

    async fn focus_tab(&self, kind: &TabKind, view_column: u32) -> Result<bool, HostError> {
        let mut state = self.record("focus_tab");
        let group_index = view_column.saturating_sub(1) as usize;
        let position = state
            .groups
            .get(group_index)
            .and_then(|g| g.tabs.iter().position(|t| t.shows(kind)));
        match position {
            Some(tab_index) => {
                state.focus(group_index, tab_index);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn workspace_folders(&self) -> Result<Vec<String>, HostError> {
        Ok(self.lock().workspace_folders.clone())
    }
}

/// User interaction driven by queued answers.
///
/// Each prompt takes the next queued answer; an empty queue behaves like the user
/// dismissing the prompt. Messages are collected for inspection.
#[derive(Default)]
pub struct ScriptedInteraction {
    picks: Mutex<VecDeque<Option<String>>>,
    inputs: Mutex<VecDeque<Option<String>>>,
    confirms: Mutex<VecDeque<Option<String>>>,
    infos: Mutex<Vec<String>>,
    warnings: Mutex<Vec<String>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl ScriptedInteraction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_pick(&self, answer: Option<&str>) {
        lock(&self.picks).push_back(answer.map(str::to_string));
    }

    pub fn push_input(&self, answer: Option<&str>) {
        lock(&self.inputs).push_back(answer.map(str::to_string));
    }

    pub fn push_confirm(&self, answer: Option<&str>) {
        lock(&self.confirms).push_back(answer.map(str::to_string));
    }

    pub fn infos(&self) -> Vec<String> {
        lock(&self.infos).clone()
    }

    pub fn warnings(&self) -> Vec<String> {
        lock(&self.warnings).clone()
    }
}

#[async_trait]
impl UserInteraction for ScriptedInteraction {
    async fn pick_group(&self, names: &[String], _placeholder: &str) -> Option<String> {
        lock(&self.picks)
            .pop_front()
            .flatten()
            .filter(|answer| names.contains(answer))
    }

    async fn input_name(&self, _placeholder: &str) -> Option<String> {
        lock(&self.inputs).pop_front().flatten()
    }

    async fn confirm(&self, _prompt: &str) -> Option<String> {
        lock(&self.confirms).pop_front().flatten()
    }

    async fn show_info(&self, message: &str) {
        lock(&self.infos).push(message.to_string());
    }

    async fn show_warning(&self, message: &str) {
        lock(&self.warnings).push(message.to_string());
    }
}
