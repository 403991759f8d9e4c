//! Permission prompt management.
//!
//! Turns an ACP `session/request_permission` call into an interactive IM
//! card and resolves it from exactly one of: the user's button click or
//! the timeout timer. The resolver is keyed by the permission card's
//! message id; the timer is cancelled on click, and the click path is a
//! no-op once the timer has fired.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{oneshot, Mutex};
use tracing::{info, warn};

use crate::acp::protocol::{PermissionOutcome, RequestPermissionParams};
use crate::lark::cards;
use crate::lark::client::LarkApi;
use crate::orchestrator::active::{ActiveSession, PendingPermission};
use crate::orchestrator::stream;
use crate::orchestrator::Orchestrator;

impl Orchestrator {
    /// Serve one permission request end to end; the returned outcome
    /// answers the agent's blocked call.
    pub(crate) async fn handle_permission_request(
        &self,
        params: RequestPermissionParams,
    ) -> PermissionOutcome {
        let session_id = {
            let index = self.acp_index.lock().await;
            index.get(&params.session_id).cloned()
        };
        let Some(session_id) = session_id else {
            warn!(acp_session_id = %params.session_id, "permission request for unknown session");
            return PermissionOutcome::Cancelled;
        };
        let Some(handle) = self.active_handle(&session_id).await else {
            return PermissionOutcome::Cancelled;
        };

        let tool_description = describe_tool_call(&params.tool_call);

        // Pause the streaming card so the permission card is the visible
        // tail of the conversation.
        let chat_id = {
            let mut active = handle.lock().await;
            if let Err(err) = self
                .stream
                .pause(&mut active, stream::WAITING_FOR_PERMISSION)
                .await
            {
                warn!(%err, "failed to pause streaming card for permission");
            }
            active.chat_id.clone()
        };

        let card = cards::permission_card(&session_id, &tool_description, &params.options);
        let card_message_id = match self.lark.send_card(&chat_id, &card).await {
            Ok(id) => id,
            Err(err) => {
                warn!(%err, "failed to send permission card, cancelling request");
                return PermissionOutcome::Cancelled;
            }
        };

        let (tx, rx) = oneshot::channel();
        let timeout = Duration::from_secs(self.config.timeouts.permission_seconds);
        let timer = spawn_permission_timer(
            Arc::clone(&self.lark),
            Arc::clone(&handle),
            card_message_id.clone(),
            timeout,
        );

        handle.lock().await.permission_resolvers.insert(
            card_message_id.clone(),
            PendingPermission {
                tx,
                options: params.options,
                tool_description,
                timer,
            },
        );

        info!(%session_id, %card_message_id, "permission card sent, awaiting click");
        rx.await.unwrap_or(PermissionOutcome::Cancelled)
    }
}

/// Arm the timeout that resolves an unanswered request as cancelled.
fn spawn_permission_timer(
    lark: Arc<dyn LarkApi>,
    handle: Arc<Mutex<ActiveSession>>,
    card_message_id: String,
    timeout: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        let resolved = resolve_permission(
            &lark,
            &handle,
            &card_message_id,
            PermissionOutcome::Cancelled,
            false,
        )
        .await;
        if resolved {
            info!(%card_message_id, "permission request timed out");
        }
    })
}

/// Resolve a pending permission exactly once.
///
/// Removes the resolver under the session lock, delivers the outcome, and
/// patches the card to its resolved state. Returns `false` when the
/// request was already resolved (the other path won the race).
pub async fn resolve_permission(
    lark: &Arc<dyn LarkApi>,
    handle: &Arc<Mutex<ActiveSession>>,
    card_message_id: &str,
    outcome: PermissionOutcome,
    abort_timer: bool,
) -> bool {
    let pending = {
        let mut active = handle.lock().await;
        active.permission_resolvers.remove(card_message_id)
    };
    let Some(pending) = pending else {
        return false;
    };

    if abort_timer {
        pending.timer.abort();
    }

    let chosen_label = match &outcome {
        PermissionOutcome::Selected { option_id } => pending
            .options
            .iter()
            .find(|opt| opt.option_id == *option_id)
            .map_or_else(|| option_id.clone(), |opt| opt.name.clone()),
        PermissionOutcome::Cancelled => "已超时，自动取消".to_owned(),
    };

    if pending.tx.send(outcome).is_err() {
        warn!(%card_message_id, "permission requester dropped before resolution");
    }

    let resolved_card = cards::permission_resolved_card(&pending.tool_description, &chosen_label);
    if let Err(err) = lark
        .update_message_card(card_message_id, &resolved_card)
        .await
    {
        warn!(%err, card_message_id, "failed to patch resolved permission card");
    }

    true
}

/// Human-readable description of the tool awaiting permission.
#[must_use]
pub fn describe_tool_call(tool_call: &Value) -> String {
    let title = tool_call
        .get("title")
        .and_then(Value::as_str)
        .unwrap_or("工具调用");
    let kind = tool_call.get("kind").and_then(Value::as_str).unwrap_or("");

    if kind.is_empty() {
        title.to_owned()
    } else {
        format!("{title} ({kind})")
    }
}
