//! Session update routing.
//!
//! Fans each inbound ACP `session/update` into the streaming card and the
//! active-session state. Runs entirely under the session lock.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::acp::protocol::{SessionUpdate, ToolCallInfo};
use crate::orchestrator::active::ActiveSession;
use crate::orchestrator::stream::StreamManager;
use crate::persistence::session_repo::SessionRepo;

/// Collaborators the router needs besides the session itself.
pub struct RouterCtx<'a> {
    /// Streaming card manager.
    pub stream: &'a Arc<StreamManager>,
    /// Handle to the session, for the flush timer.
    pub handle: &'a Arc<Mutex<ActiveSession>>,
    /// Session persistence, for mode/title echoes.
    pub sessions: &'a SessionRepo,
}

/// Route one parsed update into card patches and state changes.
pub async fn route_update(ctx: RouterCtx<'_>, session: &mut ActiveSession, update: SessionUpdate) {
    match update {
        SessionUpdate::AgentMessageChunk { text } | SessionUpdate::AgentThoughtChunk { text } => {
            append_chunk(&ctx, session, &text).await;
        }
        SessionUpdate::ToolCall(info) => {
            handle_tool_call(&ctx, session, info).await;
        }
        SessionUpdate::ToolCallUpdate(info) => {
            let Some(status) = info.status.as_deref() else {
                return;
            };
            if matches!(status, "completed" | "failed") {
                if let Err(err) = ctx
                    .stream
                    .patch_tool_element(session, &info.tool_call_id, status, info.title.as_deref())
                    .await
                {
                    warn!(%err, tool_call_id = %info.tool_call_id, "tool element patch failed");
                }
            }
        }
        SessionUpdate::Plan(entries) => {
            session.current_plan = entries;
        }
        SessionUpdate::CurrentModeUpdate { mode_id } => {
            session.current_mode = mode_id.clone();
            if let Err(err) = ctx.sessions.update_mode(&session.session_id, &mode_id).await {
                warn!(%err, session_id = %session.session_id, "failed to persist mode");
            }
        }
        SessionUpdate::AvailableCommandsUpdate(commands) => {
            session.available_commands = commands;
        }
        SessionUpdate::ConfigOptionUpdate(options) => {
            session.config_options = options;
        }
        SessionUpdate::SessionInfoUpdate { title } => {
            if let Some(title) = title {
                if let Err(err) = ctx.sessions.update_title(&session.session_id, &title).await {
                    warn!(%err, session_id = %session.session_id, "failed to persist title");
                }
            }
        }
        SessionUpdate::Unknown(value) => {
            debug!(
                session_id = %session.session_id,
                update = %value,
                "ignoring unknown session update"
            );
        }
    }
}

/// Append a text chunk, creating the streaming card on first use.
async fn append_chunk(ctx: &RouterCtx<'_>, session: &mut ActiveSession, text: &str) {
    if text.is_empty() {
        return;
    }

    if session.streaming_card.is_none() {
        let reply_to = session.last_prompt_message_id.clone();
        match ctx.stream.ensure_card(session, &reply_to).await {
            Ok(Some(message_id)) => {
                if let Err(err) = ctx
                    .sessions
                    .set_working_message_id(&session.session_id, Some(&message_id))
                    .await
                {
                    warn!(%err, "failed to persist working_message_id");
                }
            }
            Ok(None) => {}
            Err(err) => {
                warn!(%err, session_id = %session.session_id, "streaming card creation failed");
                return;
            }
        }
    }

    ctx.stream.append_text(ctx.handle, session, text);
}

/// Insert or update the card element for a tool call.
async fn handle_tool_call(ctx: &RouterCtx<'_>, session: &mut ActiveSession, info: ToolCallInfo) {
    let (title, kind, label) = resolve_tool_display(&info);

    if session.tool_call_elements.contains_key(&info.tool_call_id) {
        // Repeat notification for a known call: update in place.
        if let Err(err) = ctx
            .stream
            .patch_tool_element(session, &info.tool_call_id, &info.status, Some(&title))
            .await
        {
            warn!(%err, "tool element update failed");
        }
        return;
    }

    if session.streaming_card.is_none() {
        let reply_to = session.last_prompt_message_id.clone();
        if let Err(err) = ctx.stream.ensure_card(session, &reply_to).await {
            warn!(%err, "streaming card creation failed for tool call");
            return;
        }
    }

    if let Err(err) = ctx
        .stream
        .insert_tool_element(session, &info.tool_call_id, &kind, &info.status, &title, &label)
        .await
    {
        warn!(%err, tool_call_id = %info.tool_call_id, "tool element insert failed");
    }
}

/// Derive a display `(title, kind, label)` from the raw tool notification.
#[must_use]
pub fn resolve_tool_display(info: &ToolCallInfo) -> (String, String, String) {
    let kind = if info.kind.is_empty() {
        "other".to_owned()
    } else {
        info.kind.clone()
    };

    let title = if info.title.is_empty() {
        match kind.as_str() {
            "read" => "读取文件".to_owned(),
            "search" => "搜索".to_owned(),
            "execute" => "执行命令".to_owned(),
            "edit" => "编辑文件".to_owned(),
            "fetch" => "抓取网页".to_owned(),
            _ => "工具调用".to_owned(),
        }
    } else {
        info.title.clone()
    };

    let label = info
        .raw_input
        .as_ref()
        .and_then(extract_label)
        .unwrap_or_default();

    (title, kind, label)
}

/// Pull the most descriptive argument out of a tool's raw input.
fn extract_label(raw_input: &Value) -> Option<String> {
    const CANDIDATES: &[&str] = &["file_path", "path", "pattern", "command", "url", "query"];

    for key in CANDIDATES {
        if let Some(text) = raw_input.get(key).and_then(Value::as_str) {
            let mut label: String = text.chars().take(60).collect();
            if text.chars().count() > 60 {
                label.push('…');
            }
            return Some(label);
        }
    }
    None
}
