//! Inbound Lark event payloads.
//!
//! The webhook delivers two event kinds the gateway processes:
//! `im.message.receive_v1` (messages) and `card.action.trigger` (card
//! button callbacks). Everything else is acknowledged and dropped.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use crate::{AppError, Result};

/// Event kind for inbound messages.
pub const EVENT_MESSAGE_RECEIVE: &str = "im.message.receive_v1";
/// Event kind for card button callbacks.
pub const EVENT_CARD_ACTION: &str = "card.action.trigger";

/// Top-level webhook envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct EventEnvelope {
    /// Envelope schema version.
    pub schema: Option<String>,
    /// Event metadata.
    pub header: Option<EventHeader>,
    /// Event payload, shaped by `header.event_type`.
    pub event: Option<Value>,
    /// Set on `url_verification` handshakes.
    pub challenge: Option<String>,
    /// Legacy type marker for `url_verification`.
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// Event metadata common to all kinds.
#[derive(Debug, Clone, Deserialize)]
pub struct EventHeader {
    /// Unique delivery id used for deduplication.
    pub event_id: String,
    /// Event kind discriminator.
    pub event_type: String,
    /// Verification token configured in the developer console.
    #[serde(default)]
    pub token: String,
}

/// A normalized inbound event.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    /// A user message.
    Message(MessageEvent),
    /// A card button click or form submission.
    CardAction(CardActionEvent),
}

impl InboundEvent {
    /// The delivery id used for dedup.
    #[must_use]
    pub fn event_id(&self) -> &str {
        match self {
            Self::Message(m) => &m.event_id,
            Self::CardAction(a) => &a.event_id,
        }
    }
}

/// Chat kind of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatType {
    /// Direct message.
    P2p,
    /// Group chat; the bot must be mentioned to react.
    Group,
}

/// A normalized `im.message.receive_v1` event.
#[derive(Debug, Clone)]
pub struct MessageEvent {
    /// Delivery id.
    pub event_id: String,
    /// Sender's open id.
    pub sender_open_id: String,
    /// Message id.
    pub message_id: String,
    /// Chat id.
    pub chat_id: String,
    /// p2p or group.
    pub chat_type: ChatType,
    /// Wire message type (`text`, `image`, …).
    pub message_type: String,
    /// Extracted text with mention placeholders stripped.
    pub text: String,
    /// Reply-root message id, if the message is in a thread.
    pub root_id: Option<String>,
    /// Whether the bot was mentioned.
    pub mentions_bot: bool,
}

impl MessageEvent {
    /// The thread id this message binds to: the reply-root, or the message
    /// itself when it starts a new thread.
    #[must_use]
    pub fn thread_id(&self) -> &str {
        self.root_id.as_deref().unwrap_or(&self.message_id)
    }
}

/// A normalized `card.action.trigger` event.
#[derive(Debug, Clone)]
pub struct CardActionEvent {
    /// Delivery id.
    pub event_id: String,
    /// Clicking user's open id.
    pub operator_open_id: String,
    /// Message carrying the clicked card.
    pub open_message_id: String,
    /// Chat the card lives in.
    pub open_chat_id: String,
    /// The button's `value` record; carries at least `action`.
    pub value: HashMap<String, Value>,
    /// Form values for form-submit buttons.
    pub form_value: Option<HashMap<String, Value>>,
}

impl CardActionEvent {
    /// The `action` discriminator, empty when absent.
    #[must_use]
    pub fn action(&self) -> &str {
        self.value
            .get("action")
            .and_then(Value::as_str)
            .unwrap_or("")
    }

    /// A string field of the `value` record.
    #[must_use]
    pub fn value_str(&self, key: &str) -> Option<&str> {
        self.value.get(key).and_then(Value::as_str)
    }

    /// A string field of the form-value map.
    #[must_use]
    pub fn form_str(&self, key: &str) -> Option<&str> {
        self.form_value
            .as_ref()
            .and_then(|form| form.get(key))
            .and_then(Value::as_str)
    }
}

/// Parse a message event from its envelope payload.
///
/// # Errors
///
/// Returns `AppError::Lark` if required fields are missing.
pub fn parse_message_event(event_id: &str, event: &Value) -> Result<MessageEvent> {
    let sender_open_id = event
        .pointer("/sender/sender_id/open_id")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_owned();
    let message = event
        .get("message")
        .ok_or_else(|| AppError::Lark("message event missing message".into()))?;

    let message_id = require_str(message, "message_id")?;
    let chat_id = require_str(message, "chat_id")?;
    let chat_type = match message.get("chat_type").and_then(Value::as_str) {
        Some("group") => ChatType::Group,
        _ => ChatType::P2p,
    };
    let message_type = message
        .get("message_type")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_owned();
    let root_id = message
        .get("root_id")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_owned);

    // `content` is a JSON string like {"text": "@_user_1 do things"}.
    let raw_text = message
        .get("content")
        .and_then(Value::as_str)
        .and_then(|content| serde_json::from_str::<Value>(content).ok())
        .and_then(|parsed| {
            parsed
                .get("text")
                .and_then(Value::as_str)
                .map(str::to_owned)
        })
        .unwrap_or_default();

    let mentions_bot = message
        .get("mentions")
        .and_then(Value::as_array)
        .is_some_and(|mentions| !mentions.is_empty());

    Ok(MessageEvent {
        event_id: event_id.to_owned(),
        sender_open_id,
        message_id,
        chat_id,
        chat_type,
        message_type,
        text: strip_mention_placeholders(&raw_text),
        root_id,
        mentions_bot,
    })
}

/// Parse a card action event from its envelope payload.
///
/// # Errors
///
/// Returns `AppError::Lark` if required fields are missing.
pub fn parse_card_action_event(event_id: &str, event: &Value) -> Result<CardActionEvent> {
    let operator_open_id = event
        .pointer("/operator/open_id")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_owned();
    let open_message_id = event
        .pointer("/context/open_message_id")
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::Lark("card action missing open_message_id".into()))?
        .to_owned();
    let open_chat_id = event
        .pointer("/context/open_chat_id")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_owned();

    let value = event
        .pointer("/action/value")
        .and_then(Value::as_object)
        .map(|obj| obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default();
    let form_value = event
        .pointer("/action/form_value")
        .and_then(Value::as_object)
        .map(|obj| obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect());

    Ok(CardActionEvent {
        event_id: event_id.to_owned(),
        operator_open_id,
        open_message_id,
        open_chat_id,
        value,
        form_value,
    })
}

/// Remove `@_user_N` mention placeholders and collapse the leftover space.
#[must_use]
pub fn strip_mention_placeholders(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find("@_user_") {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos + "@_user_".len()..];
        let digits = tail.chars().take_while(char::is_ascii_digit).count();
        rest = &tail[digits..];
    }
    out.push_str(rest);
    out.trim().to_owned()
}

fn require_str(value: &Value, field: &str) -> Result<String> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| AppError::Lark(format!("message event missing {field}")))
}
