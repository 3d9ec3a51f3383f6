//! Tab Groups RPC server: newline-delimited JSON over stdin/stdout for the editor shim.
//!
//! Protocol: one JSON object per line (newline-delimited JSON).
//! Request:  {"id":1, "method":"command.save", "params":{}}
//! Response: {"id":1, "result":{...}} or {"id":1, "error":"..."}
//! Host call from the sidecar: {"id":"h-7", "method":"host.openTab", "params":{...}},
//! answered by the shim with {"id":"h-7", "result":...}.
//!
//! Logs go to stderr; stdout carries only the protocol.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use tabgroups::app::App;
use tabgroups::rpc_handler::handle_method;
use tabgroups::rpc_peer::{Incoming, RpcPeer};

/// Data directory: `TABGROUPS_DATA_DIR`, falling back to the executable's directory.
fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("TABGROUPS_DATA_DIR") {
        PathBuf::from(dir)
    } else if let Ok(exe) = std::env::current_exe() {
        exe.parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
    } else {
        PathBuf::from(".")
    }
}

async fn write_line(stdout: &mut tokio::io::Stdout, line: &str) -> std::io::Result<()> {
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}

struct Request {
    id: Value,
    method: String,
    params: Value,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("TABGROUPS_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    let (done_tx, mut done_rx) = oneshot::channel::<()>();
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        loop {
            tokio::select! {
                biased;
                line = out_rx.recv() => match line {
                    Some(line) => {
                        if let Err(e) = write_line(&mut stdout, &line).await {
                            error!("Cannot write to stdout: {}", e);
                            break;
                        }
                    }
                    None => break,
                },
                _ = &mut done_rx => {
                    while let Ok(line) = out_rx.try_recv() {
                        if write_line(&mut stdout, &line).await.is_err() {
                            break;
                        }
                    }
                    break;
                }
            }
        }
    });

    let peer = Arc::new(RpcPeer::new(out_tx.clone()));

    // Responses and notifications are routed as they arrive; requests are queued
    // and handled one at a time below.
    let (req_tx, mut req_rx) = mpsc::unbounded_channel::<Request>();
    let reader_peer = Arc::clone(&peer);
    let reader_out = out_tx.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    warn!("Cannot read stdin: {}", e);
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match reader_peer.accept_line(&line) {
                Incoming::Request { id, method, params } => {
                    if req_tx.send(Request { id, method, params }).is_err() {
                        break;
                    }
                }
                Incoming::Handled => {}
                Incoming::Invalid(err) => {
                    let _ = reader_out.send(json!({"id": null, "error": err}).to_string());
                }
            }
        }
        reader_peer.disconnect();
    });

    let dir = data_dir();
    let workspace = std::env::var("TABGROUPS_WORKSPACE").unwrap_or_default();
    let app = match App::open(peer.clone(), peer.clone(), &dir, &workspace) {
        Ok(app) => Mutex::new(app),
        Err(e) => {
            error!("Failed to initialize tab groups in {}: {}", dir.display(), e);
            std::process::exit(1);
        }
    };
    info!("Tab groups data in {}", dir.display());

    // Signal ready
    let ready = json!({"event": "ready", "version": env!("CARGO_PKG_VERSION")});
    let _ = out_tx.send(ready.to_string());

    while let Some(request) = req_rx.recv().await {
        let result = handle_method(&app, &request.method, &request.params).await;
        let response = match result {
            Ok(val) => json!({"id": request.id, "result": val}),
            Err(err) => json!({"id": request.id, "error": err}),
        };
        let _ = out_tx.send(response.to_string());
        if request.method == "shutdown" {
            break;
        }
    }

    let _ = done_tx.send(());
    let _ = writer.await;
}
