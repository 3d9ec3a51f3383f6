//! RPC method handler for the Tab Groups JSON-RPC protocol.
//!
//! Extracted from `rpc_server.rs` so it can be unit-tested independently.
//! The `handle_method` function dispatches one request from the editor shim to the
//! matching command of the `App`.

use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::app::{App, CommandOutcome};
use crate::managers::group_store::GroupStoreTrait;
use crate::types::errors::CommandError;

fn str_param<'a>(params: &'a Value, key: &str) -> Result<&'a str, String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| format!("missing {}", key))
}

fn index_param(params: &Value, key: &str) -> Result<u32, String> {
    params
        .get(key)
        .and_then(|v| v.as_u64())
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| format!("missing {}", key))
}

fn outcome(result: Result<CommandOutcome, CommandError>) -> Result<Value, String> {
    let outcome = result.map_err(|e| e.to_string())?;
    serde_json::to_value(outcome).map_err(|e| e.to_string())
}

/// Dispatch a JSON-RPC method call to the appropriate command.
///
/// Returns `Ok(Value)` on success or `Err(String)` with an error message.
pub async fn handle_method(app: &Mutex<App>, method: &str, params: &Value) -> Result<Value, String> {
    match method {
        "ping" => Ok(json!({"pong": true})),

        // ─── Commands ───
        "command.save" => outcome(app.lock().await.save().await),
        "command.saveAndCloseAll" => outcome(app.lock().await.save_and_close_all().await),
        "command.update" => outcome(app.lock().await.update().await),
        "command.updateLast" => outcome(app.lock().await.update_last().await),
        "command.saveFromView" => {
            let group = params.get("group").and_then(|v| v.as_str());
            outcome(app.lock().await.save_from_view(group).await)
        }
        "command.restore" => outcome(app.lock().await.restore().await),
        "command.restoreAndCloseOthers" => {
            outcome(app.lock().await.restore_and_close_others().await)
        }
        "command.restoreFromView" => {
            let group = str_param(params, "group")?;
            outcome(app.lock().await.restore_from_view(group).await)
        }
        "command.rename" => outcome(app.lock().await.rename().await),
        "command.renameFromView" => {
            let group = str_param(params, "group")?;
            outcome(app.lock().await.rename_from_view(group).await)
        }
        "command.delete" => outcome(app.lock().await.delete().await),
        "command.deleteFromView" => {
            let group = str_param(params, "group")?;
            outcome(app.lock().await.delete_from_view(group).await)
        }
        "command.deleteFileFromGroup" => {
            let group = str_param(params, "group")?;
            let group_index = index_param(params, "groupIndex")?;
            let document_key = str_param(params, "documentKey")?;
            outcome(
                app.lock()
                    .await
                    .delete_file_from_group(group, group_index, document_key)
                    .await,
            )
        }
        "command.deleteSplitFromGroup" => {
            let group = str_param(params, "group")?;
            let group_index = index_param(params, "groupIndex")?;
            outcome(app.lock().await.delete_split_from_group(group, group_index).await)
        }
        "command.openFileFromView" => {
            let group = str_param(params, "group")?;
            let group_index = index_param(params, "groupIndex")?;
            let document_key = str_param(params, "documentKey")?;
            outcome(
                app.lock()
                    .await
                    .open_file_from_view(group, group_index, document_key)
                    .await,
            )
        }
        "command.closeAllEditors" => outcome(app.lock().await.close_all_editors().await),
        "command.undo" => outcome(app.lock().await.undo().await),
        "command.track" => {
            let group = params.get("group").and_then(|v| v.as_str());
            outcome(app.lock().await.track(group).await)
        }
        "command.stopTracking" => outcome(app.lock().await.stop_tracking().await),

        // ─── Groups (sidebar data) ───
        "groups.list" => {
            let a = app.lock().await;
            let tracking = a.store.tracking_name();
            let arr: Vec<Value> = a
                .store
                .groups()
                .iter()
                .map(|g| {
                    json!({
                        "name": g.name,
                        "splits": g.snapshot.groups.len(),
                        "tabs": g.snapshot.tab_count(),
                        "tracking": tracking == Some(g.name.as_str()),
                    })
                })
                .collect();
            Ok(json!(arr))
        }
        "groups.get" => {
            let name = str_param(params, "name")?;
            let a = app.lock().await;
            let group = a.store.get(name).ok_or_else(|| format!("Tab group not found: {}", name))?;
            serde_json::to_value(&group.snapshot).map_err(|e| e.to_string())
        }

        // ─── Settings ───
        "settings.get" => {
            let a = app.lock().await;
            serde_json::to_value(a.settings()).map_err(|e| e.to_string())
        }
        "settings.set" => {
            let key = str_param(params, "key")?;
            let value = params.get("value").cloned().ok_or("missing value")?;
            let mut a = app.lock().await;
            a.set_setting(key, value).map_err(|e| e.to_string())?;
            Ok(json!({"ok": true}))
        }

        // ─── Editor / VCS events ───
        "vcs.branchChanged" => {
            let branch = params.get("branch").and_then(|v| v.as_str());
            outcome(app.lock().await.branch_changed(branch).await)
        }
        "editor.layoutChanged" => outcome(app.lock().await.layout_changed().await),

        "shutdown" => {
            app.lock().await.shutdown().await.map_err(|e| e.to_string())?;
            Ok(json!({"ok": true}))
        }

        _ => Err(format!("unknown method: {}", method)),
    }
}
