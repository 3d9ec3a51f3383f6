//! The editor shim seen from the sidecar.
//!
//! The protocol is symmetric newline-delimited JSON over stdio. The shim sends
//! requests with numeric ids; the sidecar answers them, and in the middle of a
//! command calls back into the editor with requests of its own, ids `"h-N"`. The
//! shim also sends `host.activeEditorChanged` notifications, which feed
//! [`EditorHost::next_active_change`].
//!
//! [`RpcPeer`] implements both host traits by turning every call into an
//! outgoing request and waiting for the matching response line.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, warn};

use crate::host::{CloseSignal, EditorHost, OpenRequest, UserInteraction};
use crate::types::errors::HostError;
use crate::types::tab::{ActiveEditor, LiveLayout, TabKind};

type PendingMap = HashMap<String, oneshot::Sender<Result<Value, String>>>;

/// A line read from the shim, sorted.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    /// A request for the sidecar to handle and answer.
    Request { id: Value, method: String, params: Value },
    /// A response or notification, already dealt with.
    Handled,
    /// Not valid JSON.
    Invalid(String),
}

/// Proxy for the editor on the other end of stdio.
pub struct RpcPeer {
    outgoing: mpsc::UnboundedSender<String>,
    pending: Mutex<PendingMap>,
    next_id: AtomicU64,
    focus_tx: watch::Sender<Option<ActiveEditor>>,
    focus_rx: tokio::sync::Mutex<watch::Receiver<Option<ActiveEditor>>>,
}

impl RpcPeer {
    /// Creates a peer writing its requests, one JSON object per item, to `outgoing`.
    pub fn new(outgoing: mpsc::UnboundedSender<String>) -> Self {
        let (focus_tx, focus_rx) = watch::channel(None);
        Self {
            outgoing,
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            focus_tx,
            focus_rx: tokio::sync::Mutex::new(focus_rx),
        }
    }

    fn pending(&self) -> std::sync::MutexGuard<'_, PendingMap> {
        match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Sorts one line from the shim, routing responses and notifications.
    pub fn accept_line(&self, line: &str) -> Incoming {
        let message: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => return Incoming::Invalid(format!("parse error: {}", e)),
        };
        let id = message.get("id").cloned().unwrap_or(Value::Null);

        if let Some(method) = message.get("method").and_then(|v| v.as_str()) {
            let params = message.get("params").cloned().unwrap_or(json!({}));
            if !id.is_null() {
                return Incoming::Request {
                    id,
                    method: method.to_string(),
                    params,
                };
            }
            self.notify(method, &params);
            return Incoming::Handled;
        }

        match id.as_str() {
            Some(id) => {
                let result = match message.get("error") {
                    Some(error) if !error.is_null() => Err(error
                        .as_str()
                        .map(str::to_string)
                        .unwrap_or_else(|| error.to_string())),
                    _ => Ok(message.get("result").cloned().unwrap_or(Value::Null)),
                };
                self.complete(id, result);
            }
            None => debug!("Ignoring message without method or string id"),
        }
        Incoming::Handled
    }

    fn notify(&self, method: &str, params: &Value) {
        match method {
            "host.activeEditorChanged" => {
                let editor = params.get("editor").cloned().unwrap_or(Value::Null);
                match serde_json::from_value::<Option<ActiveEditor>>(editor) {
                    Ok(editor) => {
                        self.focus_tx.send_replace(editor);
                    }
                    Err(e) => warn!("Bad active editor notification: {}", e),
                }
            }
            other => debug!("Ignoring notification {}", other),
        }
    }

    fn complete(&self, id: &str, result: Result<Value, String>) {
        match self.pending().remove(id) {
            Some(waiter) => {
                let _ = waiter.send(result);
            }
            None => debug!("Response for unknown request {}", id),
        }
    }

    /// Fails every call still waiting, e.g. once the input is closed.
    pub fn disconnect(&self) {
        self.pending().clear();
    }

    /// Sends one request to the shim and waits for its result.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, HostError> {
        let id = format!("h-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = oneshot::channel();
        self.pending().insert(id.clone(), tx);

        // Focus changes caused by this call are the ones worth waiting for.
        self.focus_rx.lock().await.borrow_and_update();

        let line = json!({"id": id, "method": method, "params": params}).to_string();
        if self.outgoing.send(line).is_err() {
            self.pending().remove(&id);
            return Err(HostError::Unavailable("output closed".to_string()));
        }

        match rx.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(reason)) => Err(HostError::CommandFailed {
                command: method.to_string(),
                reason,
            }),
            Err(_) => Err(HostError::Unavailable("editor connection closed".to_string())),
        }
    }

    async fn call_as<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, HostError> {
        let value = self.call(method, params).await?;
        serde_json::from_value(value)
            .map_err(|e| HostError::InvalidResponse(format!("{}: {}", method, e)))
    }

    async fn call_unit(&self, method: &str) -> Result<(), HostError> {
        self.call(method, json!({})).await.map(|_| ())
    }
}

/// Reads a close result: `"closed"`, `"refused"`, anything else is unknown.
fn close_signal(value: &Value) -> CloseSignal {
    match value.as_str() {
        Some("closed") => CloseSignal::Closed,
        Some("refused") => CloseSignal::Refused,
        _ => CloseSignal::Unknown,
    }
}

#[async_trait]
impl EditorHost for RpcPeer {
    async fn tab_groups(&self) -> Result<Option<LiveLayout>, HostError> {
        self.call_as("host.tabGroups", json!({})).await
    }

    async fn active_editor(&self) -> Result<Option<ActiveEditor>, HostError> {
        self.call_as("host.activeEditor", json!({})).await
    }

    async fn next_active_change(&self) -> Result<Option<ActiveEditor>, HostError> {
        let mut rx = self.focus_rx.lock().await;
        rx.changed()
            .await
            .map_err(|_| HostError::Unavailable("focus notifications closed".to_string()))?;
        let editor = rx.borrow_and_update().clone();
        Ok(editor)
    }

    async fn active_is_pinned(&self) -> Result<Option<bool>, HostError> {
        self.call_as("host.activeIsPinned", json!({})).await
    }

    async fn focus_first_group(&self) -> Result<(), HostError> {
        self.call_unit("host.focusFirstGroup").await
    }

    async fn first_editor_in_group(&self) -> Result<(), HostError> {
        self.call_unit("host.firstEditorInGroup").await
    }

    async fn next_editor(&self) -> Result<(), HostError> {
        self.call_unit("host.nextEditor").await
    }

    async fn close_active(&self) -> Result<CloseSignal, HostError> {
        Ok(close_signal(&self.call("host.closeActive", json!({})).await?))
    }

    async fn close_active_pinned(&self) -> Result<CloseSignal, HostError> {
        Ok(close_signal(&self.call("host.closeActivePinned", json!({})).await?))
    }

    async fn close_all(&self) -> Result<(), HostError> {
        self.call_unit("host.closeAll").await
    }

    async fn open_tab(&self, request: &OpenRequest) -> Result<(), HostError> {
        let params = serde_json::to_value(request)
            .map_err(|e| HostError::InvalidResponse(e.to_string()))?;
        self.call("host.openTab", params)
            .await
            .map(|_| ())
            .map_err(|e| match e {
                HostError::CommandFailed { reason, .. } => HostError::OpenFailed {
                    key: request.kind.document_key(),
                    reason,
                },
                other => other,
            })
    }

    async fn pin_active(&self) -> Result<(), HostError> {
        self.call_unit("host.pinActive").await
    }

    async fn focus_tab(&self, kind: &TabKind, view_column: u32) -> Result<bool, HostError> {
        self.call_as(
            "host.focusTab",
            json!({"kind": kind, "viewColumn": view_column}),
        )
        .await
    }

    async fn workspace_folders(&self) -> Result<Vec<String>, HostError> {
        self.call_as("host.workspaceFolders", json!({})).await
    }
}

#[async_trait]
impl UserInteraction for RpcPeer {
    async fn pick_group(&self, names: &[String], placeholder: &str) -> Option<String> {
        let params = json!({"names": names, "placeholder": placeholder});
        match self.call_as::<Option<String>>("ui.pickGroup", params).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!("Group picker failed: {}", e);
                None
            }
        }
    }

    async fn input_name(&self, placeholder: &str) -> Option<String> {
        match self
            .call_as::<Option<String>>("ui.inputName", json!({"placeholder": placeholder}))
            .await
        {
            Ok(answer) => answer,
            Err(e) => {
                warn!("Name input failed: {}", e);
                None
            }
        }
    }

    async fn confirm(&self, prompt: &str) -> Option<String> {
        match self
            .call_as::<Option<String>>("ui.confirm", json!({"prompt": prompt}))
            .await
        {
            Ok(answer) => answer,
            Err(e) => {
                warn!("Confirmation failed: {}", e);
                None
            }
        }
    }

    async fn show_info(&self, message: &str) {
        if let Err(e) = self.call("ui.showInfo", json!({"message": message})).await {
            warn!("Could not show message: {}", e);
        }
    }

    async fn show_warning(&self, message: &str) {
        if let Err(e) = self.call("ui.showWarning", json!({"message": message})).await {
            warn!("Could not show warning: {}", e);
        }
    }
}
