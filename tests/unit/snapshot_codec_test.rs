//! Unit tests for the snapshot codec: classification, labels, layout capture and
//! the persisted store format, including the older layouts.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rstest::rstest;
use serde_json::{json, Value};

use tabgroups::services::snapshot_codec::{
    classify, decode_store, derive_label, deserialize, encode_store, serialize,
    serialize_to_string,
};
use tabgroups::types::snapshot::{NamedGroup, Snapshot};
use tabgroups::types::tab::{LiveGroup, LiveLayout, LiveTab, TabInput, TabKind};

fn input(
    uri: Option<&str>,
    view_type: Option<&str>,
    notebook_type: Option<&str>,
    original: Option<&str>,
    modified: Option<&str>,
) -> TabInput {
    TabInput {
        uri: uri.map(str::to_string),
        view_type: view_type.map(str::to_string),
        notebook_type: notebook_type.map(str::to_string),
        original: original.map(str::to_string),
        modified: modified.map(str::to_string),
    }
}

fn file_tab(path: &str) -> LiveTab {
    LiveTab {
        label: path.rsplit('/').next().unwrap_or(path).to_string(),
        input: TabInput::file(path),
        is_pinned: false,
        is_preview: false,
        is_active: false,
        is_dirty: false,
    }
}

fn live_group(view_column: u32, tabs: Vec<LiveTab>) -> LiveGroup {
    LiveGroup {
        view_column,
        is_active: false,
        tabs,
    }
}

// === Classification and labels ===

#[rstest]
#[case::file(
    input(Some("/ws/src/main.rs"), None, None, None, None),
    "main.rs",
    "main.rs",
    "/ws/src/main.rs"
)]
#[case::custom_file(
    input(Some("/ws/logo.png"), Some("imagePreview.previewEditor"), None, None, None),
    "logo.png",
    "imagePreview.previewEditor: logo.png",
    "custom:imagePreview.previewEditor:/ws/logo.png"
)]
#[case::webview(
    input(None, Some("markdown.preview"), None, None, None),
    "Preview README.md",
    "Webview: markdown.preview",
    "webview:markdown.preview"
)]
#[case::diff(
    input(None, None, None, Some("/ws/old.txt"), Some("/ws/new.txt")),
    "old.txt ↔ new.txt",
    "old.txt diff new.txt",
    "diff:/ws/old.txt|/ws/new.txt"
)]
#[case::notebook_diff(
    input(None, None, Some("jupyter-notebook"), Some("/ws/a.ipynb"), Some("/ws/b.ipynb")),
    "a.ipynb ↔ b.ipynb",
    "jupyter-notebook: a.ipynb diff b.ipynb",
    "notebook-diff:jupyter-notebook:/ws/a.ipynb|/ws/b.ipynb"
)]
#[case::notebook(
    input(Some("/ws/analysis.ipynb"), None, Some("jupyter-notebook"), None, None),
    "analysis.ipynb",
    "jupyter-notebook: analysis.ipynb",
    "notebook:jupyter-notebook:/ws/analysis.ipynb"
)]
#[case::terminal(input(None, None, None, None, None), "zsh", "Terminal: zsh", "terminal:zsh")]
#[case::untitled(
    input(None, None, None, Some("/ws/only-one-side.txt"), None),
    "Untitled-1",
    "Untitled",
    "untitled:"
)]
fn classify_and_label(
    #[case] tab_input: TabInput,
    #[case] host_label: &str,
    #[case] expected_label: &str,
    #[case] expected_key: &str,
) {
    let kind = classify(&tab_input, host_label);
    assert_eq!(derive_label(&kind), expected_label);
    assert_eq!(kind.document_key(), expected_key);
}

#[test]
fn notebook_is_never_taken_for_a_text_file() {
    let kind = classify(
        &input(Some("/ws/nb.ipynb"), None, Some("jupyter-notebook"), None, None),
        "nb.ipynb",
    );
    assert!(matches!(kind, TabKind::Notebook { .. }));
}

#[test]
fn view_type_wins_over_diff_sides() {
    let kind = classify(
        &input(None, Some("git.diff"), None, Some("/a"), Some("/b")),
        "diff",
    );
    assert_eq!(
        kind,
        TabKind::Webview {
            view_type: "git.diff".to_string()
        }
    );
}

// === Capturing a live layout ===

#[test]
fn serialize_renumbers_groups_left_to_right() {
    let layout = LiveLayout {
        groups: vec![
            live_group(5, vec![file_tab("/ws/c.txt")]),
            live_group(2, vec![file_tab("/ws/a.txt"), file_tab("/ws/b.txt")]),
        ],
    };
    let snapshot = serialize(&layout);
    assert_eq!(snapshot.groups.len(), 2);
    assert_eq!(snapshot.groups[0].group_index, 1);
    assert_eq!(snapshot.groups[1].group_index, 2);
    assert_eq!(
        snapshot.document_keys(),
        vec![
            vec!["/ws/a.txt".to_string(), "/ws/b.txt".to_string()],
            vec!["/ws/c.txt".to_string()],
        ]
    );
    assert!(snapshot.groups[1].tabs.iter().all(|t| t.group_index == 2));
}

#[test]
fn serialize_drops_empty_groups() {
    let layout = LiveLayout {
        groups: vec![
            live_group(1, vec![]),
            live_group(2, vec![file_tab("/ws/a.txt")]),
        ],
    };
    let snapshot = serialize(&layout);
    assert_eq!(snapshot.groups.len(), 1);
    assert_eq!(snapshot.groups[0].group_index, 1);
}

#[test]
fn serialize_keeps_at_most_one_active_tab_and_group() {
    let mut first = file_tab("/ws/a.txt");
    first.is_active = true;
    let mut second = file_tab("/ws/b.txt");
    second.is_active = true;
    let mut left = live_group(1, vec![first, second]);
    left.is_active = true;
    let mut right = live_group(2, vec![file_tab("/ws/c.txt")]);
    right.is_active = true;

    let snapshot = serialize(&LiveLayout {
        groups: vec![left, right],
    });
    assert_eq!(snapshot.active_group_index, Some(1));
    assert_eq!(snapshot.groups.iter().filter(|g| g.is_active).count(), 1);
    assert_eq!(snapshot.groups[0].tabs.iter().filter(|t| t.is_active).count(), 1);
    assert_eq!(snapshot.active_tab_key().as_deref(), Some("/ws/a.txt"));
}

#[test]
fn serialize_keeps_pin_and_preview_flags() {
    let mut pinned = file_tab("/ws/a.txt");
    pinned.is_pinned = true;
    let mut preview = file_tab("/ws/b.txt");
    preview.is_preview = true;
    preview.is_dirty = true;
    let snapshot = serialize(&LiveLayout {
        groups: vec![live_group(1, vec![pinned, preview])],
    });
    let tabs = &snapshot.groups[0].tabs;
    assert!(tabs[0].is_pinned && !tabs[0].is_preview);
    assert!(!tabs[1].is_pinned && tabs[1].is_preview && tabs[1].is_dirty);
}

#[test]
fn empty_layout_is_an_empty_snapshot() {
    let snapshot = serialize(&LiveLayout::default());
    assert!(snapshot.is_empty());
    assert_eq!(snapshot, Snapshot::empty());
}

// === Nested text format ===

#[test]
fn serialized_groups_use_the_record_field_names() {
    let mut tab = file_tab("/ws/a.txt");
    tab.is_active = true;
    let mut group = live_group(1, vec![tab]);
    group.is_active = true;
    let snapshot = serialize(&LiveLayout { groups: vec![group] });

    let text = serialize_to_string(&snapshot);
    let value: Value = serde_json::from_str(&text).unwrap();
    let group = &value[0];
    assert_eq!(group["activeTabIndex"], json!(0));
    assert_eq!(group["isActiveGroup"], json!(true));
    assert_eq!(group["groupIndex"], json!(1));
    let tab = &group["tabs"][0];
    assert_eq!(tab["documentKey"], json!("/ws/a.txt"));
    assert_eq!(tab["label"], json!("a.txt"));
    assert_eq!(tab["isActive"], json!(true));
    assert_eq!(tab["groupIndex"], json!(1));
    assert_eq!(tab["kind"]["type"], json!("file"));

    assert_eq!(deserialize(&text), snapshot);
}

#[test]
fn deserialize_malformed_text_is_empty() {
    assert!(deserialize("this is not json").is_empty());
    assert!(deserialize("{\"groups\": 1}").is_empty());
}

#[test]
fn deserialize_fills_in_missing_tab_fields() {
    let text = json!([
        {
            "activeTabIndex": 1,
            "isActiveGroup": true,
            "tabs": [
                { "documentKey": "/ws/a.txt", "label": "a.txt" },
                { "documentKey": "/ws/b.txt", "label": "b.txt", "isPinned": true }
            ]
        },
        { "tabs": [ { "documentKey": "/ws/c.txt" } ] }
    ])
    .to_string();
    let snapshot = deserialize(&text);

    assert_eq!(snapshot.active_group_index, Some(1));
    assert_eq!(snapshot.groups[1].group_index, 2);
    let first = &snapshot.groups[0].tabs;
    assert!(!first[0].is_active);
    assert!(first[1].is_active && first[1].is_pinned);
    assert_eq!(
        first[0].kind,
        TabKind::File {
            path: "/ws/a.txt".to_string()
        }
    );
    let third = &snapshot.groups[1].tabs[0];
    assert_eq!(third.group_index, 2);
    assert_eq!(third.label, "c.txt");
}

// === Whole store ===

fn sample_groups() -> Vec<NamedGroup> {
    let one = serialize(&LiveLayout {
        groups: vec![live_group(1, vec![file_tab("/ws/a.txt")])],
    });
    let two = serialize(&LiveLayout {
        groups: vec![
            live_group(1, vec![file_tab("/ws/b.txt")]),
            live_group(2, vec![file_tab("/ws/c.txt")]),
        ],
    });
    vec![NamedGroup::new("First", one), NamedGroup::new("Second", two)]
}

#[test]
fn encoded_store_is_base64_of_the_record_list() {
    let encoded = encode_store(&sample_groups());
    let json = String::from_utf8(BASE64.decode(&encoded).unwrap()).unwrap();
    let value: Value = serde_json::from_str(&json).unwrap();
    let records = value.as_array().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["name"], json!("First"));
    assert!(records[1]["serializedGroups"].is_string());
    assert!(records[1].get("activeGroupIndex").is_some());
}

#[test]
fn store_roundtrip_keeps_order() {
    let groups = sample_groups();
    assert_eq!(decode_store(&encode_store(&groups)), groups);
}

#[test]
fn empty_value_decodes_to_nothing() {
    assert!(decode_store("").is_empty());
    assert!(decode_store(&encode_store(&[])).is_empty());
}

#[rstest]
#[case::garbage("%%% definitely not stored groups %%%")]
#[case::truncated_base64("W3sibmFtZSI6")]
#[case::scalar_json("true")]
fn corrupt_values_decode_to_empty(#[case] value: &str) {
    assert!(decode_store(value).is_empty());
}

#[test]
fn base64_of_garbage_decodes_to_empty() {
    assert!(decode_store(&BASE64.encode("{{{{")).is_empty());
    assert!(decode_store(&BASE64.encode("\"just a string\"")).is_empty());
}

#[test]
fn corrupt_nested_groups_keep_the_name() {
    let value = BASE64.encode(
        json!([{ "name": "Broken", "serializedGroups": "not json" }]).to_string(),
    );
    let groups = decode_store(&value);
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].name, "Broken");
    assert!(groups[0].snapshot.is_empty());
}

#[test]
fn unencoded_json_is_accepted() {
    let groups = sample_groups();
    let raw = String::from_utf8(BASE64.decode(encode_store(&groups)).unwrap()).unwrap();
    assert_eq!(decode_store(&raw), groups);
}

// === Older layouts ===

#[test]
fn legacy_name_keyed_map_decodes() {
    let nested = json!([
        { "isActiveGroup": true, "activeTabIndex": 0,
          "tabs": [ { "documentKey": "/ws/a.txt", "label": "a.txt" } ] }
    ])
    .to_string();
    let value = BASE64.encode(
        json!({ "Old": { "activeGroupIndex": 1, "serializedGroups": nested } }).to_string(),
    );
    let groups = decode_store(&value);
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].name, "Old");
    assert_eq!(groups[0].snapshot.active_group_index, Some(1));
    assert_eq!(groups[0].snapshot.active_tab_key().as_deref(), Some("/ws/a.txt"));
}

#[test]
fn legacy_editor_list_decodes_into_columns() {
    let value = BASE64.encode(
        json!([
            {
                "name": "Ancient",
                "list": [
                    { "document": { "fileName": "/ws/a.txt" }, "viewColumn": 1 },
                    { "document": { "uri": { "fsPath": "/ws/c.txt" } }, "viewColumn": 2 },
                    { "document": { "fileName": "/ws/b.txt" }, "viewColumn": 1 },
                    { "fileName": "/ws/d.txt" }
                ]
            }
        ])
        .to_string(),
    );
    let groups = decode_store(&value);
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].name, "Ancient");
    assert_eq!(
        groups[0].snapshot.document_keys(),
        vec![
            vec![
                "/ws/a.txt".to_string(),
                "/ws/b.txt".to_string(),
                "/ws/d.txt".to_string()
            ],
            vec!["/ws/c.txt".to_string()],
        ]
    );
    assert_eq!(groups[0].snapshot.groups[1].tabs[0].label, "c.txt");
}

#[test]
fn legacy_entries_without_documents_are_skipped() {
    let value = BASE64.encode(
        json!([{ "name": "Sparse", "list": [ { "viewColumn": 1 }, { "fileName": "/ws/a.txt" } ] }])
            .to_string(),
    );
    let groups = decode_store(&value);
    assert_eq!(groups[0].snapshot.tab_count(), 1);
}

#[test]
fn reencoding_upgraded_data_uses_current_format() {
    let legacy = BASE64.encode(
        json!([{ "name": "Ancient", "list": [ { "fileName": "/ws/a.txt" } ] }]).to_string(),
    );
    let upgraded = decode_store(&legacy);
    let json = String::from_utf8(BASE64.decode(encode_store(&upgraded)).unwrap()).unwrap();
    let value: Value = serde_json::from_str(&json).unwrap();
    assert!(value[0]["serializedGroups"].is_string());
    assert_eq!(decode_store(&encode_store(&upgraded)), upgraded);
}
