//! Editor-Host Probe for Tab Groups.
//!
//! Captures the live layout as a [`Snapshot`]. Hosts that can enumerate their tabs
//! are read directly. For the others the probe walks the editor: it focuses the
//! first tab, steps through every tab with next-editor, then closes each tab to
//! learn whether it was pinned, and finally reopens what it closed and puts the
//! focus back.
//!
//! The walk is a pure state machine, [`ProbeState`], fed one [`Observation`] at a
//! time and answering with the next [`ProbeCommand`]. [`EditorProbe`] runs it
//! against a host.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::host::{await_focus, CloseSignal, EditorHost, OpenRequest, DEFAULT_FOCUS_TIMEOUT};
use crate::services::snapshot_codec::{classify, serialize};
use crate::types::errors::HostError;
use crate::types::snapshot::Snapshot;
use crate::types::tab::{ActiveEditor, LiveGroup, LiveLayout, LiveTab, TabKind};

/// Tuning for the walk.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Bound on each wait for the host to report a focus change.
    pub focus_timeout: Duration,
    /// Bound on the number of steps of the walk and close phases together.
    pub max_steps: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            focus_timeout: DEFAULT_FOCUS_TIMEOUT,
            max_steps: 1000,
        }
    }
}

/// What the driver should ask the host next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeCommand {
    /// Focus the first group and its first tab, then report the focus.
    FocusFirstTab,
    /// Advance to the next editor, then report the focus.
    NextEditor,
    /// Ask whether the focused tab is pinned.
    QueryPinned,
    /// Close the focused tab, then report the signal and the focus.
    CloseActive,
    /// Close the focused tab even if pinned, then report the signal and the focus.
    CloseActivePinned,
    /// Stop stepping.
    Finish(StopReason),
}

/// What the driver saw after carrying out a command.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    Focus(Option<ActiveEditor>),
    Pinned(Option<bool>),
    Close {
        signal: CloseSignal,
        focus: Option<ActiveEditor>,
    },
}

/// Why the probe stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The host enumerated its tabs directly.
    Enumerated,
    /// Nothing was focused, so nothing is open.
    Empty,
    /// Every tab was closed and identified.
    Complete,
    /// The focus landed on a tab that was already handled.
    Revisited,
    /// A tab survived a pinned close.
    Stuck,
    /// The focus stopped moving, or vanished, during the walk.
    Stalled,
    /// The step bound was reached.
    StepLimit,
    /// A host call failed mid-walk.
    HostFailure,
    /// The driver reported something the current phase did not ask for.
    Unexpected,
}

/// What became of a walked tab in the close phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Still open; the close phase never reached it.
    Open,
    Closed { pinned: bool },
    /// Survived a pinned close.
    Stuck,
}

/// One tab seen during the walk.
#[derive(Debug, Clone, PartialEq)]
pub struct WalkedTab {
    pub editor: ActiveEditor,
    pub kind: TabKind,
    pub resolution: Resolution,
}

impl WalkedTab {
    pub fn is_pinned(&self) -> bool {
        matches!(
            self.resolution,
            Resolution::Closed { pinned: true } | Resolution::Stuck
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Start,
    Walking,
    QueryingPin,
    Closing,
    ClosingPinned,
    Done,
}

/// Step-by-step state of a host walk.
#[derive(Debug, Clone)]
pub struct ProbeState {
    phase: Phase,
    tabs: Vec<WalkedTab>,
    original_focus: Option<ActiveEditor>,
    target: Option<usize>,
    target_editor: Option<ActiveEditor>,
    /// `Some(false)` once the host has shown it cannot answer pin queries.
    pin_query: Option<bool>,
    steps: usize,
    max_steps: usize,
    stop: Option<StopReason>,
}

impl ProbeState {
    pub fn new(max_steps: usize) -> Self {
        Self {
            phase: Phase::Start,
            tabs: Vec::new(),
            original_focus: None,
            target: None,
            target_editor: None,
            pin_query: None,
            steps: 0,
            max_steps,
            stop: None,
        }
    }

    /// Feeds one observation and returns the next command.
    ///
    /// The first observation is the focus before anything was touched. Once a
    /// `Finish` has been returned every further call returns it again.
    pub fn advance(&mut self, observation: Observation) -> ProbeCommand {
        if let Some(reason) = self.stop {
            return ProbeCommand::Finish(reason);
        }
        self.steps += 1;
        if self.steps > self.max_steps {
            warn!("Probe gave up after {} steps", self.max_steps);
            return self.finish(StopReason::StepLimit);
        }

        match (self.phase, observation) {
            (Phase::Start, Observation::Focus(None)) => self.finish(StopReason::Empty),
            (Phase::Start, Observation::Focus(Some(editor))) => {
                self.original_focus = Some(editor);
                self.phase = Phase::Walking;
                ProbeCommand::FocusFirstTab
            }
            (Phase::Walking, Observation::Focus(focus)) => self.walk(focus),
            (Phase::QueryingPin, Observation::Pinned(pinned)) => {
                self.pin_query = Some(pinned.is_some());
                if pinned == Some(true) {
                    self.phase = Phase::ClosingPinned;
                    ProbeCommand::CloseActivePinned
                } else {
                    self.phase = Phase::Closing;
                    ProbeCommand::CloseActive
                }
            }
            (Phase::Closing, Observation::Close { signal, focus }) => {
                self.after_close(signal, focus)
            }
            (Phase::ClosingPinned, Observation::Close { signal, focus }) => {
                self.after_pinned_close(signal, focus)
            }
            (phase, observation) => {
                warn!("Probe got {:?} while in phase {:?}", observation, phase);
                self.finish(StopReason::Unexpected)
            }
        }
    }

    /// Ends the walk early, e.g. because a host call failed.
    pub fn abort(&mut self, reason: StopReason) {
        if self.stop.is_none() {
            self.finish(reason);
        }
    }

    pub fn tabs(&self) -> &[WalkedTab] {
        &self.tabs
    }

    pub fn original_focus(&self) -> Option<&ActiveEditor> {
        self.original_focus.as_ref()
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    fn finish(&mut self, reason: StopReason) -> ProbeCommand {
        self.phase = Phase::Done;
        self.stop = Some(reason);
        ProbeCommand::Finish(reason)
    }

    fn walk(&mut self, focus: Option<ActiveEditor>) -> ProbeCommand {
        let Some(editor) = focus else {
            return self.finish(StopReason::Stalled);
        };

        let back_at_first = self
            .tabs
            .first()
            .is_some_and(|first| first.editor.same_tab(&editor));
        if back_at_first {
            return self.begin_close(editor);
        }
        if self.tabs.iter().any(|t| t.editor.same_tab(&editor)) {
            debug!("Walk stalled on {}", editor.label);
            return self.begin_close(editor);
        }

        self.tabs.push(WalkedTab {
            kind: classify(&editor.input, &editor.label),
            editor,
            resolution: Resolution::Open,
        });
        ProbeCommand::NextEditor
    }

    fn begin_close(&mut self, focus: ActiveEditor) -> ProbeCommand {
        debug!("Walk saw {} tabs, starting close phase", self.tabs.len());
        self.close_next(Some(focus))
    }

    /// Picks the focused tab as the next one to close. Tabs are matched by kind
    /// alone because group positions shift as groups empty out.
    fn close_next(&mut self, focus: Option<ActiveEditor>) -> ProbeCommand {
        let Some(editor) = focus else {
            return self.finish(StopReason::Complete);
        };
        let kind = classify(&editor.input, &editor.label);
        let Some(index) = self
            .tabs
            .iter()
            .position(|t| t.resolution == Resolution::Open && t.kind == kind)
        else {
            return self.finish(StopReason::Revisited);
        };

        self.target = Some(index);
        self.target_editor = Some(editor);
        if self.pin_query == Some(false) {
            self.phase = Phase::Closing;
            ProbeCommand::CloseActive
        } else {
            self.phase = Phase::QueryingPin;
            ProbeCommand::QueryPinned
        }
    }

    fn focus_stayed(&self, focus: &Option<ActiveEditor>) -> bool {
        match (&self.target_editor, focus) {
            (Some(target), Some(editor)) => target.same_tab(editor),
            _ => false,
        }
    }

    fn resolve(&mut self, resolution: Resolution) {
        if let Some(tab) = self.target.and_then(|i| self.tabs.get_mut(i)) {
            tab.resolution = resolution;
        }
        self.target = None;
        self.target_editor = None;
    }

    fn after_close(&mut self, signal: CloseSignal, focus: Option<ActiveEditor>) -> ProbeCommand {
        let pinned = match signal {
            CloseSignal::Refused => true,
            CloseSignal::Closed => false,
            CloseSignal::Unknown => {
                let stayed = self.focus_stayed(&focus);
                if stayed {
                    warn!("Close gave no definite signal and focus stayed, treating tab as pinned");
                }
                stayed
            }
        };
        if pinned {
            self.phase = Phase::ClosingPinned;
            return ProbeCommand::CloseActivePinned;
        }
        self.resolve(Resolution::Closed { pinned: false });
        self.close_next(focus)
    }

    fn after_pinned_close(
        &mut self,
        signal: CloseSignal,
        focus: Option<ActiveEditor>,
    ) -> ProbeCommand {
        let stuck = match signal {
            CloseSignal::Refused => true,
            CloseSignal::Closed => false,
            CloseSignal::Unknown => self.focus_stayed(&focus),
        };
        if stuck {
            if let Some(editor) = &self.target_editor {
                warn!("Tab {} could not be closed", editor.label);
            }
            self.resolve(Resolution::Stuck);
            return self.finish(StopReason::Stuck);
        }
        self.resolve(Resolution::Closed { pinned: true });
        self.close_next(focus)
    }

    /// The walked tabs as a live layout, grouped by the column they were seen in.
    pub fn layout(&self) -> LiveLayout {
        let mut groups: Vec<LiveGroup> = Vec::new();
        for tab in &self.tabs {
            let is_active = self
                .original_focus
                .as_ref()
                .is_some_and(|focus| focus.same_tab(&tab.editor));
            let live = LiveTab {
                label: tab.editor.label.clone(),
                input: tab.editor.input.clone(),
                is_pinned: tab.is_pinned(),
                is_preview: tab.editor.is_preview,
                is_active,
                is_dirty: tab.editor.is_dirty,
            };
            let column = tab.editor.view_column;
            match groups.iter_mut().find(|g| g.view_column == column) {
                Some(group) => {
                    group.is_active |= is_active;
                    group.tabs.push(live);
                }
                None => groups.push(LiveGroup {
                    view_column: column,
                    is_active,
                    tabs: vec![live],
                }),
            }
        }
        LiveLayout { groups }
    }
}

/// Outcome of one capture, for logging and tests.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeReport {
    pub tabs_captured: usize,
    pub tabs_reopened: usize,
    /// Document keys that could not be reopened.
    pub reopen_failures: Vec<String>,
    /// Document keys of tabs that resisted closing.
    pub stuck: Vec<String>,
    pub stop: StopReason,
    pub steps: usize,
}

/// A captured snapshot with its report.
#[derive(Debug, Clone)]
pub struct ProbeCapture {
    pub snapshot: Snapshot,
    pub report: ProbeReport,
}

/// Runs captures against an editor host.
pub struct EditorProbe {
    host: Arc<dyn EditorHost>,
    config: ProbeConfig,
}

impl EditorProbe {
    pub fn new(host: Arc<dyn EditorHost>, config: ProbeConfig) -> Self {
        Self { host, config }
    }

    /// Captures the live layout, leaving the host as it was found.
    ///
    /// Only a failure to read the initial state is an error. Failures later in the
    /// walk end it early, and everything already closed is still reopened.
    pub async fn capture(&self) -> Result<ProbeCapture, HostError> {
        if let Some(layout) = self.host.tab_groups().await? {
            let snapshot = serialize(&layout);
            debug!("Host enumerated {} tabs", snapshot.tab_count());
            return Ok(ProbeCapture {
                report: ProbeReport {
                    tabs_captured: snapshot.tab_count(),
                    tabs_reopened: 0,
                    reopen_failures: Vec::new(),
                    stuck: Vec::new(),
                    stop: StopReason::Enumerated,
                    steps: 0,
                },
                snapshot,
            });
        }

        let mut state = ProbeState::new(self.config.max_steps);
        let mut observation = Observation::Focus(self.host.active_editor().await?);
        loop {
            let command = state.advance(observation);
            observation = match self.execute(command).await {
                Ok(Some(next)) => next,
                Ok(None) => break,
                Err(e) => {
                    warn!("Probe interrupted by host failure: {}", e);
                    state.abort(StopReason::HostFailure);
                    break;
                }
            };
        }

        let (tabs_reopened, reopen_failures) = self.reopen(&state).await;
        self.restore_focus(&state).await;

        let snapshot = serialize(&state.layout());
        let report = ProbeReport {
            tabs_captured: state.tabs().len(),
            tabs_reopened,
            reopen_failures,
            stuck: state
                .tabs()
                .iter()
                .filter(|t| t.resolution == Resolution::Stuck)
                .map(|t| t.kind.document_key())
                .collect(),
            stop: state.stop_reason().unwrap_or(StopReason::Unexpected),
            steps: state.steps(),
        };
        debug!("Probe finished: {:?}", report);
        Ok(ProbeCapture { snapshot, report })
    }

    /// Convenience for callers that only want the snapshot.
    pub async fn snapshot(&self) -> Result<Snapshot, HostError> {
        Ok(self.capture().await?.snapshot)
    }

    async fn execute(&self, command: ProbeCommand) -> Result<Option<Observation>, HostError> {
        let host = self.host.as_ref();
        let timeout = self.config.focus_timeout;
        let observation = match command {
            ProbeCommand::FocusFirstTab => {
                host.focus_first_group().await?;
                host.first_editor_in_group().await?;
                Observation::Focus(await_focus(host, timeout).await?)
            }
            ProbeCommand::NextEditor => {
                host.next_editor().await?;
                Observation::Focus(await_focus(host, timeout).await?)
            }
            ProbeCommand::QueryPinned => Observation::Pinned(host.active_is_pinned().await?),
            ProbeCommand::CloseActive => {
                let signal = host.close_active().await?;
                Observation::Close {
                    signal,
                    focus: await_focus(host, timeout).await?,
                }
            }
            ProbeCommand::CloseActivePinned => {
                let signal = host.close_active_pinned().await?;
                Observation::Close {
                    signal,
                    focus: await_focus(host, timeout).await?,
                }
            }
            ProbeCommand::Finish(_) => return Ok(None),
        };
        Ok(Some(observation))
    }

    /// Reopens closed tabs in walk order, in the column each was seen in.
    async fn reopen(&self, state: &ProbeState) -> (usize, Vec<String>) {
        let mut reopened = 0;
        let mut failures = Vec::new();
        for tab in state.tabs() {
            let Resolution::Closed { pinned } = tab.resolution else {
                continue;
            };
            let request = OpenRequest {
                kind: tab.kind.clone(),
                label: tab.editor.label.clone(),
                view_column: tab.editor.view_column,
                preview: tab.editor.is_preview && !pinned,
            };
            if let Err(e) = self.host.open_tab(&request).await {
                warn!("Could not reopen {}: {}", tab.editor.label, e);
                failures.push(tab.kind.document_key());
                continue;
            }
            if pinned {
                if let Err(e) = self.host.pin_active().await {
                    warn!("Could not re-pin {}: {}", tab.editor.label, e);
                }
            }
            reopened += 1;
        }
        (reopened, failures)
    }

    async fn restore_focus(&self, state: &ProbeState) {
        let Some(focus) = state.original_focus() else {
            return;
        };
        if state.tabs().is_empty() {
            return;
        }
        let kind = classify(&focus.input, &focus.label);
        match self.host.focus_tab(&kind, focus.view_column).await {
            Ok(true) => {}
            Ok(false) => debug!("Original focus {} is gone", focus.label),
            Err(e) => warn!("Could not restore focus to {}: {}", focus.label, e),
        }
    }
}
