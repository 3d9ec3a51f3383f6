//! Unit tests for the editor probe: the walk state machine on its own, and full
//! captures against the in-memory host.

use std::sync::Arc;
use std::time::Duration;

use tabgroups::host::memory::{HostOptions, InMemoryEditorHost};
use tabgroups::host::CloseSignal;
use tabgroups::managers::editor_probe::{
    EditorProbe, Observation, ProbeCommand, ProbeConfig, ProbeState, Resolution, StopReason,
};
use tabgroups::services::snapshot_codec::serialize;
use tabgroups::types::tab::{ActiveEditor, LiveGroup, LiveLayout, LiveTab, TabInput};

fn editor(path: &str, view_column: u32) -> ActiveEditor {
    ActiveEditor {
        label: path.rsplit('/').next().unwrap_or(path).to_string(),
        input: TabInput::file(path),
        view_column,
        is_preview: false,
        is_dirty: false,
    }
}

fn focus(path: &str, view_column: u32) -> Observation {
    Observation::Focus(Some(editor(path, view_column)))
}

fn tab(path: &str, pinned: bool, active: bool) -> LiveTab {
    LiveTab {
        label: path.rsplit('/').next().unwrap_or(path).to_string(),
        input: TabInput::file(path),
        is_pinned: pinned,
        is_preview: false,
        is_active: active,
        is_dirty: false,
    }
}

fn group(view_column: u32, active: bool, tabs: Vec<LiveTab>) -> LiveGroup {
    LiveGroup {
        view_column,
        is_active: active,
        tabs,
    }
}

fn fast() -> ProbeConfig {
    ProbeConfig {
        focus_timeout: Duration::from_millis(20),
        max_steps: 1000,
    }
}

type Structure = (Vec<Vec<String>>, Vec<Vec<bool>>, Option<String>);

fn structure(layout: &LiveLayout) -> Structure {
    let snapshot = serialize(layout);
    (
        snapshot.document_keys(),
        snapshot.pin_flags(),
        snapshot.active_tab_key(),
    )
}

// === ProbeState in isolation ===

#[test]
fn nothing_focused_finishes_empty() {
    let mut state = ProbeState::new(100);
    assert_eq!(
        state.advance(Observation::Focus(None)),
        ProbeCommand::Finish(StopReason::Empty)
    );
    assert!(state.tabs().is_empty());
    assert_eq!(state.stop_reason(), Some(StopReason::Empty));
}

#[test]
fn walk_then_close_two_plain_tabs() {
    let mut state = ProbeState::new(100);
    assert_eq!(state.advance(focus("/b", 1)), ProbeCommand::FocusFirstTab);
    assert_eq!(state.advance(focus("/a", 1)), ProbeCommand::NextEditor);
    assert_eq!(state.advance(focus("/b", 1)), ProbeCommand::NextEditor);
    // Back at the first tab: the close phase starts there.
    assert_eq!(state.advance(focus("/a", 1)), ProbeCommand::QueryPinned);
    assert_eq!(
        state.advance(Observation::Pinned(None)),
        ProbeCommand::CloseActive
    );
    // No pin query from now on.
    assert_eq!(
        state.advance(Observation::Close {
            signal: CloseSignal::Closed,
            focus: Some(editor("/b", 1)),
        }),
        ProbeCommand::CloseActive
    );
    assert_eq!(
        state.advance(Observation::Close {
            signal: CloseSignal::Closed,
            focus: None,
        }),
        ProbeCommand::Finish(StopReason::Complete)
    );

    assert_eq!(state.tabs().len(), 2);
    assert!(state
        .tabs()
        .iter()
        .all(|t| t.resolution == Resolution::Closed { pinned: false }));
    assert_eq!(state.original_focus(), Some(&editor("/b", 1)));

    let layout = state.layout();
    assert_eq!(layout.groups.len(), 1);
    assert!(!layout.groups[0].tabs[0].is_active);
    assert!(layout.groups[0].tabs[1].is_active);
}

#[test]
fn refused_close_leads_to_pinned_close() {
    let mut state = ProbeState::new(100);
    state.advance(focus("/p", 1));
    state.advance(focus("/p", 1));
    assert_eq!(state.advance(focus("/p", 1)), ProbeCommand::QueryPinned);
    state.advance(Observation::Pinned(None));
    assert_eq!(
        state.advance(Observation::Close {
            signal: CloseSignal::Refused,
            focus: Some(editor("/p", 1)),
        }),
        ProbeCommand::CloseActivePinned
    );
    assert_eq!(
        state.advance(Observation::Close {
            signal: CloseSignal::Closed,
            focus: None,
        }),
        ProbeCommand::Finish(StopReason::Complete)
    );
    assert_eq!(state.tabs()[0].resolution, Resolution::Closed { pinned: true });
    assert!(state.layout().groups[0].tabs[0].is_pinned);
}

#[test]
fn pin_query_answer_skips_plain_close() {
    let mut state = ProbeState::new(100);
    state.advance(focus("/p", 1));
    state.advance(focus("/p", 1));
    state.advance(focus("/p", 1));
    assert_eq!(
        state.advance(Observation::Pinned(Some(true))),
        ProbeCommand::CloseActivePinned
    );
}

#[test]
fn ambiguous_close_with_focus_kept_counts_as_pinned() {
    let mut state = ProbeState::new(100);
    state.advance(focus("/p", 1));
    state.advance(focus("/p", 1));
    state.advance(focus("/p", 1));
    state.advance(Observation::Pinned(None));
    assert_eq!(
        state.advance(Observation::Close {
            signal: CloseSignal::Unknown,
            focus: Some(editor("/p", 1)),
        }),
        ProbeCommand::CloseActivePinned
    );
}

#[test]
fn ambiguous_close_with_focus_moved_counts_as_closed() {
    let mut state = ProbeState::new(100);
    state.advance(focus("/a", 1));
    state.advance(focus("/a", 1));
    state.advance(focus("/b", 1));
    state.advance(focus("/a", 1));
    state.advance(Observation::Pinned(None));
    assert_eq!(
        state.advance(Observation::Close {
            signal: CloseSignal::Unknown,
            focus: Some(editor("/b", 1)),
        }),
        ProbeCommand::CloseActive
    );
    assert_eq!(state.tabs()[0].resolution, Resolution::Closed { pinned: false });
}

#[test]
fn tab_surviving_pinned_close_is_stuck() {
    let mut state = ProbeState::new(100);
    state.advance(focus("/p", 1));
    state.advance(focus("/p", 1));
    state.advance(focus("/p", 1));
    state.advance(Observation::Pinned(Some(true)));
    assert_eq!(
        state.advance(Observation::Close {
            signal: CloseSignal::Refused,
            focus: Some(editor("/p", 1)),
        }),
        ProbeCommand::Finish(StopReason::Stuck)
    );
    assert_eq!(state.tabs()[0].resolution, Resolution::Stuck);
    assert!(state.tabs()[0].is_pinned());
}

#[test]
fn focus_on_resolved_tab_ends_close_phase() {
    let mut state = ProbeState::new(100);
    state.advance(focus("/a", 1));
    state.advance(focus("/a", 1));
    state.advance(focus("/a", 1));
    state.advance(Observation::Pinned(None));
    assert_eq!(
        state.advance(Observation::Close {
            signal: CloseSignal::Closed,
            focus: Some(editor("/a", 1)),
        }),
        ProbeCommand::Finish(StopReason::Revisited)
    );
}

#[test]
fn focus_lost_during_walk_stalls() {
    let mut state = ProbeState::new(100);
    state.advance(focus("/a", 1));
    assert_eq!(
        state.advance(Observation::Focus(None)),
        ProbeCommand::Finish(StopReason::Stalled)
    );
}

#[test]
fn walk_stops_on_a_repeated_tab_that_is_not_the_first() {
    let mut state = ProbeState::new(100);
    state.advance(focus("/a", 1));
    state.advance(focus("/a", 1));
    state.advance(focus("/b", 1));
    state.advance(focus("/c", 1));
    // The host got stuck on /c.
    assert_eq!(state.advance(focus("/c", 1)), ProbeCommand::QueryPinned);
    assert_eq!(state.tabs().len(), 3);
}

#[test]
fn step_limit_bounds_the_walk() {
    let mut state = ProbeState::new(3);
    state.advance(focus("/a", 1));
    state.advance(focus("/a", 1));
    state.advance(focus("/b", 1));
    assert_eq!(
        state.advance(focus("/c", 1)),
        ProbeCommand::Finish(StopReason::StepLimit)
    );
    // Finished states keep answering with the same finish.
    assert_eq!(
        state.advance(focus("/d", 1)),
        ProbeCommand::Finish(StopReason::StepLimit)
    );
}

#[test]
fn observation_out_of_phase_is_unexpected() {
    let mut state = ProbeState::new(100);
    assert_eq!(
        state.advance(Observation::Pinned(Some(false))),
        ProbeCommand::Finish(StopReason::Unexpected)
    );
}

#[test]
fn layout_groups_tabs_by_column() {
    let mut state = ProbeState::new(100);
    state.advance(focus("/b", 2));
    state.advance(focus("/a", 1));
    state.advance(focus("/b", 2));
    state.advance(focus("/a", 1));
    let layout = state.layout();
    assert_eq!(layout.groups.len(), 2);
    assert_eq!(layout.groups[1].view_column, 2);
    assert!(layout.groups[1].is_active);
    assert!(!layout.groups[0].is_active);
}

// === Captures against the in-memory host ===

#[tokio::test]
async fn enumerating_host_is_read_without_side_effects() {
    let layout = LiveLayout {
        groups: vec![
            group(1, true, vec![tab("/ws/a.txt", true, false), tab("/ws/b.txt", false, true)]),
            group(2, false, vec![tab("/ws/c.txt", false, true)]),
        ],
    };
    let host = Arc::new(InMemoryEditorHost::with_layout(HostOptions::default(), &layout));
    let probe = EditorProbe::new(host.clone(), fast());

    let capture = probe.capture().await.unwrap();
    assert_eq!(capture.report.stop, StopReason::Enumerated);
    assert_eq!(capture.report.tabs_captured, 3);
    assert_eq!(capture.snapshot, serialize(&layout));
    assert_eq!(host.calls(), vec!["tab_groups"]);
}

#[tokio::test]
async fn empty_workspace_makes_no_further_calls() {
    let host = Arc::new(InMemoryEditorHost::new(HostOptions::walk_only()));
    let probe = EditorProbe::new(host.clone(), fast());

    let capture = probe.capture().await.unwrap();
    assert!(capture.snapshot.is_empty());
    assert_eq!(capture.snapshot.groups.len(), 0);
    assert_eq!(capture.report.stop, StopReason::Empty);
    assert_eq!(host.calls(), vec!["tab_groups"]);
}

#[tokio::test]
async fn walk_leaves_host_structurally_unchanged() {
    let layout = LiveLayout {
        groups: vec![
            group(1, true, vec![tab("/ws/p.txt", true, false), tab("/ws/a.txt", false, true)]),
            group(2, false, vec![tab("/ws/b.txt", false, true), tab("/ws/c.txt", false, false)]),
        ],
    };
    let host = Arc::new(InMemoryEditorHost::with_layout(HostOptions::walk_only(), &layout));
    let before = structure(&host.layout());
    let probe = EditorProbe::new(host.clone(), fast());

    let capture = probe.capture().await.unwrap();

    assert_eq!(structure(&host.layout()), before);
    assert_eq!(capture.report.stop, StopReason::Complete);
    assert_eq!(capture.report.tabs_captured, 4);
    assert_eq!(capture.report.tabs_reopened, 4);
    assert!(capture.report.reopen_failures.is_empty());

    let expected = serialize(&layout);
    assert_eq!(capture.snapshot.document_keys(), expected.document_keys());
    assert_eq!(capture.snapshot.pin_flags(), expected.pin_flags());
    assert_eq!(capture.snapshot.active_group_index, Some(1));
    assert_eq!(capture.snapshot.active_tab_key().as_deref(), Some("/ws/a.txt"));
}

#[tokio::test]
async fn ambiguous_close_results_count_as_pinned() {
    let options = HostOptions {
        ambiguous_close: true,
        ..HostOptions::walk_only()
    };
    let layout = LiveLayout {
        groups: vec![group(
            1,
            true,
            vec![tab("/ws/p.txt", true, false), tab("/ws/a.txt", false, true)],
        )],
    };
    let host = Arc::new(InMemoryEditorHost::with_layout(options, &layout));
    let before = structure(&host.layout());
    let probe = EditorProbe::new(host.clone(), fast());

    let snapshot = probe.snapshot().await.unwrap();
    assert_eq!(snapshot.pin_flags(), vec![vec![true, false]]);
    assert_eq!(structure(&host.layout()), before);
}

#[tokio::test]
async fn pin_query_avoids_plain_close_of_pinned_tabs() {
    let options = HostOptions {
        pin_query: true,
        ..HostOptions::walk_only()
    };
    let layout = LiveLayout {
        groups: vec![group(
            1,
            true,
            vec![tab("/ws/p.txt", true, true), tab("/ws/a.txt", false, false)],
        )],
    };
    let host = Arc::new(InMemoryEditorHost::with_layout(options, &layout));
    let probe = EditorProbe::new(host.clone(), fast());

    let snapshot = probe.snapshot().await.unwrap();
    assert_eq!(snapshot.pin_flags(), vec![vec![true, false]]);
    let calls = host.calls();
    assert_eq!(calls.iter().filter(|c| *c == "close_active_pinned").count(), 1);
    assert_eq!(calls.iter().filter(|c| *c == "close_active").count(), 1);
}

#[tokio::test]
async fn walk_works_without_focus_events() {
    let options = HostOptions {
        focus_events: false,
        ..HostOptions::walk_only()
    };
    let layout = LiveLayout {
        groups: vec![
            group(1, false, vec![tab("/ws/a.txt", false, true)]),
            group(2, true, vec![tab("/ws/b.txt", true, true)]),
        ],
    };
    let host = Arc::new(InMemoryEditorHost::with_layout(options, &layout));
    let before = structure(&host.layout());
    let probe = EditorProbe::new(host.clone(), fast());

    let snapshot = probe.snapshot().await.unwrap();
    assert_eq!(
        snapshot.document_keys(),
        vec![vec!["/ws/a.txt".to_string()], vec!["/ws/b.txt".to_string()]]
    );
    assert_eq!(snapshot.pin_flags(), vec![vec![false], vec![true]]);
    assert_eq!(snapshot.active_group_index, Some(2));
    assert_eq!(structure(&host.layout()), before);
}

#[tokio::test]
async fn reopen_failure_is_reported_but_tab_is_captured() {
    let layout = LiveLayout {
        groups: vec![group(1, true, vec![tab("/ws/gone.txt", false, true)])],
    };
    let host = Arc::new(InMemoryEditorHost::with_layout(HostOptions::walk_only(), &layout));
    host.mark_missing("/ws/gone.txt");
    let probe = EditorProbe::new(host.clone(), fast());

    let capture = probe.capture().await.unwrap();
    assert_eq!(capture.snapshot.tab_count(), 1);
    assert_eq!(capture.report.tabs_reopened, 0);
    assert_eq!(capture.report.reopen_failures, vec!["/ws/gone.txt".to_string()]);
}

#[tokio::test]
async fn step_limit_stops_before_closing_anything() {
    let layout = LiveLayout {
        groups: vec![group(
            1,
            true,
            vec![
                tab("/ws/a.txt", false, true),
                tab("/ws/b.txt", false, false),
                tab("/ws/c.txt", false, false),
            ],
        )],
    };
    let host = Arc::new(InMemoryEditorHost::with_layout(HostOptions::walk_only(), &layout));
    let before = structure(&host.layout());
    let probe = EditorProbe::new(
        host.clone(),
        ProbeConfig {
            max_steps: 3,
            ..fast()
        },
    );

    let capture = probe.capture().await.unwrap();
    assert_eq!(capture.report.stop, StopReason::StepLimit);
    assert_eq!(capture.report.tabs_reopened, 0);
    assert!(!host.calls().iter().any(|c| c.starts_with("close")));
    assert_eq!(structure(&host.layout()), before);
}
