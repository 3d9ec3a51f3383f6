//! Tab Snapshot Codec.
//!
//! Turns a live host layout into a [`Snapshot`] and converts stored groups to and
//! from the persisted text format: a JSON array of
//! `{ name, activeGroupIndex, serializedGroups }` records, where
//! `serializedGroups` is itself JSON text, the whole array base64-encoded.
//!
//! Decoding never fails. Corrupt input degrades to an empty result and is logged,
//! and the older layouts written by earlier versions are upgraded on the way in.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::types::errors::CodecError;
use crate::types::snapshot::{EditorGroup, NamedGroup, Snapshot};
use crate::types::tab::{LiveLayout, TabInput, TabKind, TabRef};

/// Persisted record for one named group.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredGroupRecord {
    #[serde(default)]
    name: String,
    #[serde(default)]
    active_group_index: Option<u32>,
    serialized_groups: String,
}

/// Persisted record for one editor group, nested inside `serializedGroups`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroupRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    active_tab_index: Option<usize>,
    #[serde(default)]
    is_active_group: bool,
    #[serde(default)]
    group_index: Option<u32>,
    #[serde(default)]
    tabs: Vec<TabRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TabRecord {
    #[serde(default)]
    is_active: Option<bool>,
    #[serde(default)]
    is_dirty: bool,
    #[serde(default)]
    is_pinned: bool,
    #[serde(default)]
    is_preview: bool,
    #[serde(default)]
    label: String,
    document_key: String,
    #[serde(default)]
    group_index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kind: Option<TabKind>,
}

// --- Classification ---

/// Last path segment of a path or URI.
pub fn basename(path: &str) -> &str {
    let trimmed = path.trim_end_matches(['/', '\\']);
    trimmed
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(trimmed)
}

fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.is_empty())
}

/// Decide the kind of a tab from the fields the host reported.
///
/// Rules are tried top to bottom and the first match wins. A notebook type counts
/// as a special view type for the plain-file rule, so notebooks are never taken
/// for text files.
pub fn classify(input: &TabInput, label: &str) -> TabKind {
    let uri = present(&input.uri);
    let original = present(&input.original);
    let modified = present(&input.modified);
    let view_type = present(&input.view_type);
    let notebook_type = present(&input.notebook_type);

    match (uri, view_type, notebook_type, original, modified) {
        (Some(path), None, None, _, _) => TabKind::File {
            path: path.to_string(),
        },
        (Some(path), Some(view_type), _, _, _) => TabKind::CustomFile {
            path: path.to_string(),
            view_type: view_type.to_string(),
        },
        (None, Some(view_type), _, _, _) => TabKind::Webview {
            view_type: view_type.to_string(),
        },
        (_, None, None, Some(original), Some(modified)) => TabKind::Diff {
            original: original.to_string(),
            modified: modified.to_string(),
        },
        (_, None, Some(notebook_type), Some(original), Some(modified)) => TabKind::NotebookDiff {
            notebook_type: notebook_type.to_string(),
            original: original.to_string(),
            modified: modified.to_string(),
        },
        (Some(path), None, Some(notebook_type), _, _) => TabKind::Notebook {
            notebook_type: notebook_type.to_string(),
            path: path.to_string(),
        },
        (None, None, None, None, None) => TabKind::Terminal {
            label: label.to_string(),
        },
        _ => TabKind::Untitled,
    }
}

/// Human-readable label for a tab kind.
pub fn derive_label(kind: &TabKind) -> String {
    match kind {
        TabKind::File { path } => basename(path).to_string(),
        TabKind::CustomFile { path, view_type } => format!("{}: {}", view_type, basename(path)),
        TabKind::Webview { view_type } => format!("Webview: {}", view_type),
        TabKind::Diff { original, modified } => {
            format!("{} diff {}", basename(original), basename(modified))
        }
        TabKind::NotebookDiff {
            notebook_type,
            original,
            modified,
        } => format!(
            "{}: {} diff {}",
            notebook_type,
            basename(original),
            basename(modified)
        ),
        TabKind::Notebook {
            notebook_type,
            path,
        } => format!("{}: {}", notebook_type, basename(path)),
        TabKind::Terminal { label } => format!("Terminal: {}", label),
        TabKind::Untitled => "Untitled".to_string(),
    }
}

// --- Live layout → Snapshot ---

/// Capture a live layout as a snapshot.
///
/// Groups keep their left-to-right order and are renumbered 1..n; empty groups
/// are dropped. At most one tab per group and one group overall stay active.
pub fn serialize(layout: &LiveLayout) -> Snapshot {
    let mut live_groups: Vec<_> = layout.groups.iter().filter(|g| !g.tabs.is_empty()).collect();
    live_groups.sort_by_key(|g| g.view_column);

    let mut groups = Vec::with_capacity(live_groups.len());
    let mut active_group_index = None;

    for (position, live) in live_groups.iter().enumerate() {
        let group_index = position as u32 + 1;
        let is_active = live.is_active && active_group_index.is_none();
        if is_active {
            active_group_index = Some(group_index);
        }

        let mut seen_active = false;
        let tabs = live
            .tabs
            .iter()
            .map(|tab| {
                let kind = classify(&tab.input, &tab.label);
                let is_active = tab.is_active && !seen_active;
                seen_active |= is_active;
                TabRef {
                    label: derive_label(&kind),
                    kind,
                    group_index,
                    is_pinned: tab.is_pinned,
                    is_preview: tab.is_preview,
                    is_active,
                    is_dirty: tab.is_dirty,
                }
            })
            .collect();

        groups.push(EditorGroup {
            group_index,
            is_active,
            tabs,
        });
    }

    Snapshot {
        groups,
        active_group_index,
    }
}

// --- Snapshot ↔ text ---

fn group_records(snapshot: &Snapshot) -> Vec<GroupRecord> {
    snapshot
        .groups
        .iter()
        .map(|group| GroupRecord {
            active_tab_index: group.active_tab_index(),
            is_active_group: group.is_active,
            group_index: Some(group.group_index),
            tabs: group
                .tabs
                .iter()
                .map(|tab| TabRecord {
                    is_active: Some(tab.is_active),
                    is_dirty: tab.is_dirty,
                    is_pinned: tab.is_pinned,
                    is_preview: tab.is_preview,
                    label: tab.label.clone(),
                    document_key: tab.document_key(),
                    group_index: Some(tab.group_index),
                    kind: Some(tab.kind.clone()),
                })
                .collect(),
        })
        .collect()
}

/// Encode a snapshot's groups as the nested `serializedGroups` text.
pub fn serialize_to_string(snapshot: &Snapshot) -> String {
    // Only plain strings, integers and bools are involved, so this cannot fail.
    serde_json::to_string(&group_records(snapshot)).unwrap_or_else(|_| "[]".to_string())
}

fn snapshot_from_records(records: Vec<GroupRecord>) -> Snapshot {
    let mut groups = Vec::with_capacity(records.len());
    let mut active_group_index = None;

    for (position, record) in records.into_iter().enumerate() {
        let group_index = record.group_index.unwrap_or(position as u32 + 1);
        if record.is_active_group && active_group_index.is_none() {
            active_group_index = Some(group_index);
        }
        let tabs = record
            .tabs
            .into_iter()
            .enumerate()
            .map(|(i, tab)| {
                let kind = tab.kind.unwrap_or(TabKind::File {
                    path: tab.document_key,
                });
                let label = if tab.label.is_empty() {
                    derive_label(&kind)
                } else {
                    tab.label
                };
                TabRef {
                    kind,
                    label,
                    group_index: tab.group_index.unwrap_or(group_index),
                    is_pinned: tab.is_pinned,
                    is_preview: tab.is_preview,
                    is_active: tab
                        .is_active
                        .unwrap_or(record.active_tab_index == Some(i)),
                    is_dirty: tab.is_dirty,
                }
            })
            .collect();
        groups.push(EditorGroup {
            group_index,
            is_active: record.is_active_group,
            tabs,
        });
    }

    Snapshot {
        groups,
        active_group_index,
    }
}

/// Parse `serializedGroups` text back into a snapshot.
///
/// Malformed text yields an empty snapshot.
pub fn deserialize(text: &str) -> Snapshot {
    match serde_json::from_str::<Vec<GroupRecord>>(text) {
        Ok(records) => snapshot_from_records(records),
        Err(e) => {
            warn!("Discarding malformed tab group data: {}", e);
            Snapshot::empty()
        }
    }
}

// --- Whole store ↔ persisted value ---

/// Encode every named group as the persisted base64 value.
pub fn encode_store(groups: &[NamedGroup]) -> String {
    let records: Vec<StoredGroupRecord> = groups
        .iter()
        .map(|group| StoredGroupRecord {
            name: group.name.clone(),
            active_group_index: group.snapshot.active_group_index,
            serialized_groups: serialize_to_string(&group.snapshot),
        })
        .collect();
    let json = serde_json::to_string(&records).unwrap_or_else(|_| "[]".to_string());
    BASE64.encode(json)
}

/// Decode a persisted value into named groups, upgrading older layouts.
///
/// Anything unreadable yields an empty list.
pub fn decode_store(value: &str) -> Vec<NamedGroup> {
    if value.trim().is_empty() {
        return Vec::new();
    }
    match parse_store_value(value).and_then(groups_from_value) {
        Ok(groups) => groups,
        Err(e) => {
            warn!("Ignoring unreadable stored tab groups: {}", e);
            Vec::new()
        }
    }
}

fn parse_store_value(value: &str) -> Result<Value, CodecError> {
    let decoded = BASE64
        .decode(value.trim())
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .and_then(|text| serde_json::from_str::<Value>(&text).ok());
    if let Some(json) = decoded {
        return Ok(json);
    }
    // Some versions stored the JSON without encoding it.
    debug!("Stored tab groups are not base64, trying plain JSON");
    serde_json::from_str::<Value>(value).map_err(|e| CodecError::Encoding(e.to_string()))
}

fn groups_from_value(json: Value) -> Result<Vec<NamedGroup>, CodecError> {
    match json {
        Value::Array(items) => Ok(items
            .into_iter()
            .filter_map(|item| group_from_entry(None, item))
            .collect()),
        Value::Object(map) => Ok(map
            .into_iter()
            .filter_map(|(name, item)| group_from_entry(Some(name), item))
            .collect()),
        other => Err(CodecError::Format(format!(
            "expected a list or map of groups, found {}",
            type_name(&other)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a map",
    }
}

fn group_from_entry(key: Option<String>, item: Value) -> Option<NamedGroup> {
    let entry_name = item.get("name").and_then(Value::as_str).map(str::to_string);
    let name = key.or(entry_name)?;

    if item.get("serializedGroups").is_some() {
        let record: StoredGroupRecord = match serde_json::from_value(item) {
            Ok(record) => record,
            Err(e) => {
                warn!("Skipping malformed tab group {:?}: {}", name, e);
                return None;
            }
        };
        let mut snapshot = deserialize(&record.serialized_groups);
        if record.active_group_index.is_some() {
            snapshot.active_group_index = record.active_group_index;
        }
        return Some(NamedGroup { name, snapshot });
    }

    let list = match item {
        Value::Array(list) => list,
        Value::Object(mut map) => match map.remove("list") {
            Some(Value::Array(list)) => list,
            _ => {
                warn!("Skipping tab group {:?} in an unknown layout", name);
                return None;
            }
        },
        _ => return None,
    };
    debug!("Upgrading legacy tab group {:?}", name);
    Some(NamedGroup {
        name,
        snapshot: snapshot_from_legacy_list(&list),
    })
}

/// Path of a legacy editor entry: either `{ document, viewColumn }` or a bare
/// document object.
fn legacy_document_path(entry: &Value) -> Option<String> {
    let document = entry.get("document").unwrap_or(entry);
    if let Some(name) = document.get("fileName").and_then(Value::as_str) {
        return Some(name.to_string());
    }
    match document.get("uri") {
        Some(Value::String(uri)) => Some(uri.clone()),
        Some(uri) => uri
            .get("fsPath")
            .or_else(|| uri.get("path"))
            .and_then(Value::as_str)
            .map(str::to_string),
        None => None,
    }
}

fn snapshot_from_legacy_list(list: &[Value]) -> Snapshot {
    let mut columns: Vec<(u32, Vec<String>)> = Vec::new();
    for entry in list {
        let Some(path) = legacy_document_path(entry) else {
            continue;
        };
        let column = entry
            .get("viewColumn")
            .and_then(Value::as_u64)
            .map(|c| c as u32)
            .unwrap_or(1);
        match columns.iter_mut().find(|(c, _)| *c == column) {
            Some((_, paths)) => paths.push(path),
            None => columns.push((column, vec![path])),
        }
    }
    columns.sort_by_key(|(c, _)| *c);

    let groups = columns
        .into_iter()
        .enumerate()
        .map(|(position, (_, paths))| {
            let group_index = position as u32 + 1;
            EditorGroup {
                group_index,
                is_active: false,
                tabs: paths
                    .into_iter()
                    .map(|path| {
                        let kind = TabKind::File { path };
                        TabRef {
                            label: derive_label(&kind),
                            kind,
                            group_index,
                            is_pinned: false,
                            is_preview: false,
                            is_active: false,
                            is_dirty: false,
                        }
                    })
                    .collect(),
            }
        })
        .collect();

    Snapshot {
        groups,
        active_group_index: None,
    }
}
