use serde::{Deserialize, Serialize};

/// What kind of view a tab shows, decided once when the tab is captured.
///
/// Each variant carries exactly the data needed to reopen the view and to derive
/// its label and document key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TabKind {
    /// A plain text file.
    File { path: String },
    /// A file shown through a custom editor.
    #[serde(rename_all = "camelCase")]
    CustomFile { path: String, view_type: String },
    /// A webview panel with no backing file.
    #[serde(rename_all = "camelCase")]
    Webview { view_type: String },
    /// A text diff between two files.
    Diff { original: String, modified: String },
    /// A diff between two notebooks.
    #[serde(rename_all = "camelCase")]
    NotebookDiff {
        notebook_type: String,
        original: String,
        modified: String,
    },
    /// A notebook document.
    #[serde(rename_all = "camelCase")]
    Notebook { notebook_type: String, path: String },
    /// An integrated terminal, identified by its tab label.
    Terminal { label: String },
    /// Anything the host reported that fits none of the above.
    Untitled,
}

impl TabKind {
    /// Stable identity of the content behind the tab.
    ///
    /// Files are keyed by their path; every other kind gets a composite key so two
    /// different views of the same file never collide.
    pub fn document_key(&self) -> String {
        match self {
            TabKind::File { path } => path.clone(),
            TabKind::CustomFile { path, view_type } => format!("custom:{}:{}", view_type, path),
            TabKind::Webview { view_type } => format!("webview:{}", view_type),
            TabKind::Diff { original, modified } => format!("diff:{}|{}", original, modified),
            TabKind::NotebookDiff {
                notebook_type,
                original,
                modified,
            } => format!("notebook-diff:{}:{}|{}", notebook_type, original, modified),
            TabKind::Notebook {
                notebook_type,
                path,
            } => format!("notebook:{}:{}", notebook_type, path),
            TabKind::Terminal { label } => format!("terminal:{}", label),
            TabKind::Untitled => "untitled:".to_string(),
        }
    }

    /// Path of the file behind the tab, for kinds that have exactly one.
    pub fn file_path(&self) -> Option<&str> {
        match self {
            TabKind::File { path }
            | TabKind::CustomFile { path, .. }
            | TabKind::Notebook { path, .. } => Some(path),
            _ => None,
        }
    }
}

/// One open document or view at one position of a stored layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabRef {
    pub kind: TabKind,
    pub label: String,
    /// 1-based ordinal of the containing editor group, left to right.
    pub group_index: u32,
    pub is_pinned: bool,
    pub is_preview: bool,
    /// Whether this tab is the focused tab of its group.
    pub is_active: bool,
    pub is_dirty: bool,
}

impl TabRef {
    pub fn document_key(&self) -> String {
        self.kind.document_key()
    }
}

/// The raw, untyped identity the host reports for a tab.
///
/// Which fields are present decides the [`TabKind`]; see
/// `services::snapshot_codec::classify`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TabInput {
    pub uri: Option<String>,
    pub original: Option<String>,
    pub modified: Option<String>,
    pub view_type: Option<String>,
    pub notebook_type: Option<String>,
}

impl TabInput {
    /// Input for a plain file tab.
    pub fn file(path: &str) -> Self {
        Self {
            uri: Some(path.to_string()),
            ..Self::default()
        }
    }
}

/// A tab as currently shown by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveTab {
    pub label: String,
    pub input: TabInput,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default)]
    pub is_preview: bool,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub is_dirty: bool,
}

/// An editor group as currently shown by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveGroup {
    pub view_column: u32,
    #[serde(default)]
    pub is_active: bool,
    pub tabs: Vec<LiveTab>,
}

/// The whole live tab layout, groups ordered left to right.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiveLayout {
    pub groups: Vec<LiveGroup>,
}

/// The focused editor as reported by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveEditor {
    pub label: String,
    pub input: TabInput,
    pub view_column: u32,
    #[serde(default)]
    pub is_preview: bool,
    #[serde(default)]
    pub is_dirty: bool,
}

impl ActiveEditor {
    /// Whether two observations refer to the same tab in the same group.
    pub fn same_tab(&self, other: &ActiveEditor) -> bool {
        self.view_column == other.view_column && self.input == other.input && self.label == other.label
    }
}
