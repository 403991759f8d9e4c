//! Built-in mock ACP agent.
//!
//! Launched instead of the configured agent when `USE_MOCK_AGENT` is set
//! (the process manager re-invokes the gateway binary with the hidden
//! `mock-agent` argument). Speaks line-delimited JSON-RPC on stdio and
//! simulates one full turn per prompt: thought chunks, read/search/execute
//! tool calls, and an edit that requires permission.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;

use crate::Result;

/// Shared writer plus the plumbing for server-initiated calls.
struct MockIo {
    stdout: Mutex<tokio::io::Stdout>,
    next_call_id: AtomicU64,
    pending: Mutex<HashMap<u64, oneshot::Sender<Value>>>,
}

impl MockIo {
    async fn write(&self, value: &Value) -> Result<()> {
        let mut out = self.stdout.lock().await;
        let line = value.to_string();
        out.write_all(line.as_bytes()).await?;
        out.write_all(b"\n").await?;
        out.flush().await?;
        Ok(())
    }

    async fn respond(&self, id: u64, result: Value) -> Result<()> {
        self.write(&json!({"jsonrpc": "2.0", "id": id, "result": result}))
            .await
    }

    async fn notify_update(&self, session_id: &str, update: Value) -> Result<()> {
        self.write(&json!({
            "jsonrpc": "2.0",
            "method": "session/update",
            "params": {"sessionId": session_id, "update": update}
        }))
        .await
    }

    /// Issue a server→client call and await the client's response result.
    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_call_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        self.write(&json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params
        }))
        .await?;

        rx.await
            .map_err(|_| crate::AppError::Acp("mock agent: stdin closed awaiting response".into()))
    }
}

/// Run the mock agent until stdin closes.
///
/// # Errors
///
/// Returns `AppError::Io` on stdio failures.
pub async fn run_mock_agent() -> Result<()> {
    let io = Arc::new(MockIo {
        stdout: Mutex::new(tokio::io::stdout()),
        // Server-call ids live in a separate high range so they never
        // collide with the client's request ids.
        next_call_id: AtomicU64::new(1_000_000),
        pending: Mutex::new(HashMap::new()),
    });

    let mut reader = BufReader::new(tokio::io::stdin());
    let mut line = String::new();
    let mut prompt_cancel: Option<CancellationToken> = None;

    loop {
        line.clear();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            break;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let Ok(msg) = serde_json::from_str::<Value>(trimmed) else {
            continue;
        };

        // Response to one of our server-initiated calls.
        if msg.get("method").is_none() {
            if let Some(id) = msg.get("id").and_then(Value::as_u64) {
                if let Some(tx) = io.pending.lock().await.remove(&id) {
                    let _ = tx.send(msg.get("result").cloned().unwrap_or(Value::Null));
                }
            }
            continue;
        }

        let method = msg.get("method").and_then(Value::as_str).unwrap_or("");
        let id = msg.get("id").and_then(Value::as_u64);
        let params = msg.get("params").cloned().unwrap_or(Value::Null);

        match (method, id) {
            ("initialize", Some(id)) => {
                io.respond(
                    id,
                    json!({
                        "protocolVersion": 1,
                        "agentInfo": {"name": "mock-agent", "version": env!("CARGO_PKG_VERSION")}
                    }),
                )
                .await?;
            }
            ("session/new" | "session/load", Some(id)) => {
                let session_id = params
                    .get("sessionId")
                    .and_then(Value::as_str)
                    .map_or_else(|| format!("mock-{}", uuid::Uuid::new_v4()), str::to_owned);
                io.respond(
                    id,
                    json!({
                        "sessionId": session_id,
                        "modes": {
                            "currentModeId": "default",
                            "availableModes": [
                                {"id": "default", "name": "Default"},
                                {"id": "bypassPermissions", "name": "Bypass Permissions"}
                            ]
                        },
                        "models": {
                            "currentModelId": "mock-1",
                            "availableModels": [
                                {"modelId": "mock-1", "name": "Mock One"}
                            ]
                        }
                    }),
                )
                .await?;
            }
            ("session/prompt", Some(id)) => {
                let session_id = params
                    .get("sessionId")
                    .and_then(Value::as_str)
                    .unwrap_or("mock")
                    .to_owned();
                let cancel = CancellationToken::new();
                prompt_cancel = Some(cancel.clone());
                let turn_io = Arc::clone(&io);
                tokio::spawn(async move {
                    let stop_reason = tokio::select! {
                        () = cancel.cancelled() => "cancelled",
                        result = simulate_turn(&turn_io, &session_id) => {
                            if result.is_err() { "refusal" } else { "end_turn" }
                        }
                    };
                    let _ = turn_io
                        .respond(id, json!({"stopReason": stop_reason}))
                        .await;
                });
            }
            ("session/cancel", _) => {
                if let Some(cancel) = prompt_cancel.take() {
                    cancel.cancel();
                }
            }
            (_, Some(id)) => {
                io.write(&json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": {"code": -32601, "message": format!("unsupported method: {method}")}
                }))
                .await?;
            }
            (_, None) => {}
        }
    }

    Ok(())
}

/// One scripted turn: thoughts, tool calls, a permission-gated edit, and a
/// closing message.
async fn simulate_turn(io: &MockIo, session_id: &str) -> Result<()> {
    let think = |text: &str| {
        json!({
            "sessionUpdate": "agent_thought_chunk",
            "content": {"type": "text", "text": text}
        })
    };
    let say = |text: &str| {
        json!({
            "sessionUpdate": "agent_message_chunk",
            "content": {"type": "text", "text": text}
        })
    };

    io.notify_update(session_id, think("Looking at the request… ")).await?;
    io.notify_update(session_id, think("I'll inspect the project first.\n")).await?;

    run_tool(
        io,
        session_id,
        "tc_read",
        "read",
        "Read README.md",
        json!({"file_path": "README.md"}),
    )
    .await?;
    run_tool(
        io,
        session_id,
        "tc_search",
        "search",
        "Search for main entry point",
        json!({"pattern": "fn main"}),
    )
    .await?;
    run_tool(
        io,
        session_id,
        "tc_exec",
        "execute",
        "Run test suite",
        json!({"command": "cargo test"}),
    )
    .await?;

    io.notify_update(session_id, say("Tests pass. Applying the change now.\n")).await?;

    // The edit needs explicit permission.
    io.notify_update(
        session_id,
        json!({
            "sessionUpdate": "tool_call",
            "toolCallId": "tc_edit",
            "title": "Edit src/main.rs",
            "kind": "edit",
            "status": "pending",
            "rawInput": {"file_path": "src/main.rs"}
        }),
    )
    .await?;

    let outcome = io
        .call(
            "session/request_permission",
            json!({
                "sessionId": session_id,
                "toolCall": {"toolCallId": "tc_edit", "title": "Edit src/main.rs", "kind": "edit"},
                "options": [
                    {"optionId": "allow_once", "name": "Allow", "kind": "allow_once"},
                    {"optionId": "reject_once", "name": "Reject", "kind": "reject_once"}
                ]
            }),
        )
        .await?;

    let allowed = outcome.get("outcome").and_then(Value::as_str) == Some("selected")
        && outcome
            .get("optionId")
            .and_then(Value::as_str)
            .is_some_and(|opt| opt.starts_with("allow"));

    let (status, closing) = if allowed {
        ("completed", "Edit applied. All done!\n")
    } else {
        ("failed", "Edit was rejected; leaving the file untouched.\n")
    };

    io.notify_update(
        session_id,
        json!({
            "sessionUpdate": "tool_call_update",
            "toolCallId": "tc_edit",
            "status": status
        }),
    )
    .await?;
    io.notify_update(session_id, say(closing)).await?;

    Ok(())
}

async fn run_tool(
    io: &MockIo,
    session_id: &str,
    tool_call_id: &str,
    kind: &str,
    title: &str,
    raw_input: Value,
) -> Result<()> {
    io.notify_update(
        session_id,
        json!({
            "sessionUpdate": "tool_call",
            "toolCallId": tool_call_id,
            "title": title,
            "kind": kind,
            "status": "in_progress",
            "rawInput": raw_input
        }),
    )
    .await?;
    tokio::time::sleep(std::time::Duration::from_millis(30)).await;
    io.notify_update(
        session_id,
        json!({
            "sessionUpdate": "tool_call_update",
            "toolCallId": tool_call_id,
            "status": "completed"
        }),
    )
    .await?;
    Ok(())
}
