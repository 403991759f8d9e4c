//! Inbound event webhook.
//!
//! axum server receiving Lark event callbacks: answers `url_verification`
//! challenges, verifies the configured token, normalizes message and
//! card-action events, and hands them to the orchestrator through an mpsc
//! channel. Handlers return within the IM side's 3-second ack budget; all
//! real work happens downstream of the channel.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::LarkConfig;
use crate::lark::events::{
    self, EventEnvelope, InboundEvent, EVENT_CARD_ACTION, EVENT_MESSAGE_RECEIVE,
};
use crate::{AppError, Result};

/// Shared webhook state.
struct WebhookState {
    event_tx: mpsc::Sender<InboundEvent>,
    verification_token: String,
}

/// Serve the event webhook until `cancel` fires.
///
/// # Errors
///
/// Returns `AppError::Lark` if the listener cannot bind.
pub async fn serve(
    config: &LarkConfig,
    event_tx: mpsc::Sender<InboundEvent>,
    cancel: CancellationToken,
) -> Result<()> {
    let state = Arc::new(WebhookState {
        event_tx,
        verification_token: config.verification_token.clone(),
    });

    let app = Router::new()
        .route("/lark/events", post(handle_event))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.webhook_addr)
        .await
        .map_err(|err| {
            AppError::Lark(format!(
                "failed to bind webhook on {}: {err}",
                config.webhook_addr
            ))
        })?;

    info!(addr = %config.webhook_addr, "event webhook listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|err| AppError::Lark(format!("webhook server failed: {err}")))?;

    Ok(())
}

/// Handle one webhook delivery.
///
/// Always acks with 200 so the IM side does not redeliver transient
/// failures forever; dedup makes redeliveries harmless anyway.
async fn handle_event(
    State(state): State<Arc<WebhookState>>,
    Json(payload): Json<Value>,
) -> Json<Value> {
    let envelope: EventEnvelope = match serde_json::from_value(payload) {
        Ok(envelope) => envelope,
        Err(err) => {
            warn!(%err, "undecodable webhook payload");
            return Json(json!({}));
        }
    };

    // URL verification handshake.
    if let Some(challenge) = envelope.challenge {
        debug!("answering url_verification challenge");
        return Json(json!({ "challenge": challenge }));
    }

    let Some(header) = envelope.header else {
        warn!("webhook payload without header");
        return Json(json!({}));
    };

    if !state.verification_token.is_empty() && header.token != state.verification_token {
        warn!(event_id = %header.event_id, "webhook token mismatch, dropping event");
        return Json(json!({}));
    }

    let Some(event) = envelope.event else {
        warn!(event_id = %header.event_id, "webhook payload without event body");
        return Json(json!({}));
    };

    let parsed = match header.event_type.as_str() {
        EVENT_MESSAGE_RECEIVE => {
            events::parse_message_event(&header.event_id, &event).map(InboundEvent::Message)
        }
        EVENT_CARD_ACTION => {
            events::parse_card_action_event(&header.event_id, &event).map(InboundEvent::CardAction)
        }
        other => {
            debug!(event_type = other, "ignoring unhandled event type");
            return Json(json!({}));
        }
    };

    match parsed {
        Ok(inbound) => {
            if state.event_tx.send(inbound).await.is_err() {
                warn!("event channel closed, dropping inbound event");
            }
        }
        Err(err) => {
            warn!(%err, event_type = %header.event_type, "failed to parse inbound event");
        }
    }

    Json(json!({}))
}
