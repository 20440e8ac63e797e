//! Line-delimited JSON tool-call transport over stdio.
//!
//! Requests arrive one per line on stdin as `{"id"?, "tool", "params"?}`;
//! each is handled in its own tokio task and answered on stdout with either
//! `{"id", "result"}` or `{"id", "error": {"kind", "message"}}`. Responses
//! are funneled through one writer task so concurrent handlers never
//! interleave partial lines.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use crate::coordinator::Coordinator;
use crate::error::TeamsError;

#[derive(Debug, Deserialize)]
struct ToolRequest {
    #[serde(default)]
    id: Value,
    tool: String,
    #[serde(default)]
    params: Value,
}

fn result_line(id: &Value, result: Value) -> String {
    json!({ "id": id, "result": result }).to_string()
}

fn error_line(id: &Value, error: &TeamsError) -> String {
    json!({
        "id": id,
        "error": { "kind": error.kind(), "message": error.to_string() },
    })
    .to_string()
}

/// Serve tool calls from stdin until EOF.
pub async fn serve(coordinator: Arc<Coordinator>) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(line) = rx.recv().await {
            if stdout.write_all(line.as_bytes()).await.is_err() {
                break;
            }
            if stdout.write_all(b"\n").await.is_err() {
                break;
            }
            let _ = stdout.flush().await;
        }
    });

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ToolRequest>(&line) {
            Err(e) => {
                let error = TeamsError::InvalidArg(format!("malformed request: {}", e));
                let _ = tx.send(error_line(&Value::Null, &error));
            }
            Ok(request) => {
                let coordinator = coordinator.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    tracing::debug!(tool = %request.tool, "dispatching tool call");
                    let line = match coordinator.dispatch(&request.tool, request.params).await {
                        Ok(result) => result_line(&request.id, result),
                        Err(e) => {
                            tracing::debug!(tool = %request.tool, kind = e.kind(), "tool call failed");
                            error_line(&request.id, &e)
                        }
                    };
                    let _ = tx.send(line);
                });
            }
        }
    }

    drop(tx);
    let _ = writer.await;
    Ok(())
}
