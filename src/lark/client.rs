//! Lark Open API client.
//!
//! Thin REST wrapper with a cached tenant access token. Every call the
//! orchestrator makes goes through the [`LarkApi`] trait; the production
//! implementation is [`HttpLarkClient`], tests use a recording fake.
//!
//! Streaming card mutations (`patch_card_element`, `stream_card_text`,
//! `add_card_elements`, `delete_card_element`, `update_card_settings`)
//! carry a per-card sequence number; the server rejects stale sequences,
//! which is the only ordering guarantee the IM side provides.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::LarkConfig;
use crate::{AppError, Result};

/// Where `add_card_elements` places new elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPosition {
    /// Before the target element.
    InsertBefore,
    /// After the target element.
    InsertAfter,
    /// At the end of the body.
    Append,
}

impl InsertPosition {
    fn as_str(self) -> &'static str {
        match self {
            Self::InsertBefore => "insert_before",
            Self::InsertAfter => "insert_after",
            Self::Append => "append",
        }
    }
}

/// REST surface the orchestrator needs from Lark.
#[async_trait]
pub trait LarkApi: Send + Sync {
    /// Reply to a message with plain text. Returns the new message id.
    async fn reply_text(&self, message_id: &str, text: &str) -> Result<String>;

    /// Reply to a message with a static card. Returns the new message id.
    async fn reply_card(&self, message_id: &str, card: &Value) -> Result<String>;

    /// Send a card as a new message in a chat. Returns the new message id.
    async fn send_card(&self, chat_id: &str, card: &Value) -> Result<String>;

    /// Create a card entity for streaming. Returns the card id.
    async fn create_card_entity(&self, card: &Value) -> Result<String>;

    /// Attach a card entity to a reply. Returns the new message id.
    async fn reply_card_entity(&self, message_id: &str, card_id: &str) -> Result<String>;

    /// Replace a card entity's whole JSON.
    async fn patch_card(&self, card_id: &str, card: &Value, sequence: u64) -> Result<()>;

    /// Replace one element of a card entity.
    async fn patch_card_element(
        &self,
        card_id: &str,
        element_id: &str,
        element: &Value,
        sequence: u64,
    ) -> Result<()>;

    /// Append text to a streaming element.
    async fn stream_card_text(
        &self,
        card_id: &str,
        element_id: &str,
        content: &str,
        sequence: u64,
    ) -> Result<()>;

    /// Insert elements relative to a target element.
    async fn add_card_elements(
        &self,
        card_id: &str,
        position: InsertPosition,
        target_element_id: Option<&str>,
        elements: &[Value],
        sequence: u64,
    ) -> Result<()>;

    /// Delete one element from a card entity.
    async fn delete_card_element(&self, card_id: &str, element_id: &str, sequence: u64)
        -> Result<()>;

    /// Patch a card entity's settings (e.g. toggle streaming mode).
    async fn update_card_settings(&self, card_id: &str, settings: &Value, sequence: u64)
        -> Result<()>;

    /// Replace the card content of an already-sent card message.
    async fn update_message_card(&self, message_id: &str, card: &Value) -> Result<()>;

    /// Read a document's raw content.
    async fn doc_read(&self, doc_token: &str) -> Result<String>;

    /// Append markdown content to a document.
    async fn doc_append(&self, doc_token: &str, content: &str) -> Result<()>;
}

/// Cached tenant access token.
struct TokenCache {
    token: String,
    expires_at: Instant,
}

/// Production [`LarkApi`] implementation over reqwest.
pub struct HttpLarkClient {
    http: reqwest::Client,
    config: LarkConfig,
    token: Mutex<Option<TokenCache>>,
}

impl HttpLarkClient {
    /// Build a client from the Lark configuration.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Lark` if the HTTP client cannot be constructed.
    pub fn new(config: LarkConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| AppError::Lark(format!("failed to build http client: {err}")))?;
        Ok(Self {
            http,
            config,
            token: Mutex::new(None),
        })
    }

    /// Fetch or reuse the tenant access token.
    async fn tenant_token(&self) -> Result<String> {
        let mut guard = self.token.lock().await;
        if let Some(ref cache) = *guard {
            if cache.expires_at > Instant::now() {
                return Ok(cache.token.clone());
            }
        }

        let url = format!(
            "{}/open-apis/auth/v3/tenant_access_token/internal",
            self.config.api_base
        );
        let response: Value = self
            .http
            .post(&url)
            .json(&json!({
                "app_id": self.config.app_id,
                "app_secret": self.config.app_secret,
            }))
            .send()
            .await
            .map_err(|err| AppError::Lark(format!("token request failed: {err}")))?
            .json()
            .await
            .map_err(|err| AppError::Lark(format!("token response invalid: {err}")))?;

        let code = response.get("code").and_then(Value::as_i64).unwrap_or(-1);
        if code != 0 {
            return Err(AppError::Lark(format!("token request rejected: {response}")));
        }

        let token = response
            .get("tenant_access_token")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::Lark("token response missing tenant_access_token".into()))?
            .to_owned();
        let expire = response
            .get("expire")
            .and_then(Value::as_u64)
            .unwrap_or(7200);

        // Refresh two minutes before the reported expiry.
        let ttl = Duration::from_secs(expire.saturating_sub(120).max(60));
        *guard = Some(TokenCache {
            token: token.clone(),
            expires_at: Instant::now() + ttl,
        });
        debug!(expire, "tenant access token refreshed");

        Ok(token)
    }

    /// Issue an authenticated request and unwrap the Lark `{code, data}`
    /// envelope.
    async fn call(&self, method: reqwest::Method, path: &str, body: Option<Value>) -> Result<Value> {
        let token = self.tenant_token().await?;
        let url = format!("{}{path}", self.config.api_base);

        let mut request = self
            .http
            .request(method, &url)
            .bearer_auth(token)
            .header("Content-Type", "application/json; charset=utf-8");
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|err| AppError::Lark(format!("request to {path} failed: {err}")))?;
        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .map_err(|err| AppError::Lark(format!("response from {path} invalid: {err}")))?;

        let code = payload.get("code").and_then(Value::as_i64).unwrap_or(-1);
        if !status.is_success() || code != 0 {
            let msg = payload
                .get("msg")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            warn!(path, %status, code, msg, "lark api call failed");
            return Err(AppError::Lark(format!("{path}: code {code}: {msg}")));
        }

        Ok(payload.get("data").cloned().unwrap_or(Value::Null))
    }

    fn data_str(data: &Value, pointer: &str, what: &str) -> Result<String> {
        data.pointer(pointer)
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| AppError::Lark(format!("response missing {what}")))
    }
}

#[async_trait]
impl LarkApi for HttpLarkClient {
    async fn reply_text(&self, message_id: &str, text: &str) -> Result<String> {
        let content = json!({ "text": text }).to_string();
        let data = self
            .call(
                reqwest::Method::POST,
                &format!("/open-apis/im/v1/messages/{message_id}/reply"),
                Some(json!({ "msg_type": "text", "content": content })),
            )
            .await?;
        Self::data_str(&data, "/message_id", "message_id")
    }

    async fn reply_card(&self, message_id: &str, card: &Value) -> Result<String> {
        let data = self
            .call(
                reqwest::Method::POST,
                &format!("/open-apis/im/v1/messages/{message_id}/reply"),
                Some(json!({ "msg_type": "interactive", "content": card.to_string() })),
            )
            .await?;
        Self::data_str(&data, "/message_id", "message_id")
    }

    async fn send_card(&self, chat_id: &str, card: &Value) -> Result<String> {
        let data = self
            .call(
                reqwest::Method::POST,
                "/open-apis/im/v1/messages?receive_id_type=chat_id",
                Some(json!({
                    "receive_id": chat_id,
                    "msg_type": "interactive",
                    "content": card.to_string(),
                })),
            )
            .await?;
        Self::data_str(&data, "/message_id", "message_id")
    }

    async fn create_card_entity(&self, card: &Value) -> Result<String> {
        let data = self
            .call(
                reqwest::Method::POST,
                "/open-apis/cardkit/v1/cards",
                Some(json!({ "type": "card_json", "data": card.to_string() })),
            )
            .await?;
        Self::data_str(&data, "/card_id", "card_id")
    }

    async fn reply_card_entity(&self, message_id: &str, card_id: &str) -> Result<String> {
        let content = json!({ "type": "card", "data": { "card_id": card_id } }).to_string();
        let data = self
            .call(
                reqwest::Method::POST,
                &format!("/open-apis/im/v1/messages/{message_id}/reply"),
                Some(json!({ "msg_type": "interactive", "content": content })),
            )
            .await?;
        Self::data_str(&data, "/message_id", "message_id")
    }

    async fn patch_card(&self, card_id: &str, card: &Value, sequence: u64) -> Result<()> {
        self.call(
            reqwest::Method::PUT,
            &format!("/open-apis/cardkit/v1/cards/{card_id}"),
            Some(json!({
                "card": { "type": "card_json", "data": card.to_string() },
                "sequence": sequence,
            })),
        )
        .await?;
        Ok(())
    }

    async fn patch_card_element(
        &self,
        card_id: &str,
        element_id: &str,
        element: &Value,
        sequence: u64,
    ) -> Result<()> {
        self.call(
            reqwest::Method::PUT,
            &format!("/open-apis/cardkit/v1/cards/{card_id}/elements/{element_id}"),
            Some(json!({ "element": element.to_string(), "sequence": sequence })),
        )
        .await?;
        Ok(())
    }

    async fn stream_card_text(
        &self,
        card_id: &str,
        element_id: &str,
        content: &str,
        sequence: u64,
    ) -> Result<()> {
        self.call(
            reqwest::Method::PUT,
            &format!("/open-apis/cardkit/v1/cards/{card_id}/elements/{element_id}/content"),
            Some(json!({ "content": content, "sequence": sequence })),
        )
        .await?;
        Ok(())
    }

    async fn add_card_elements(
        &self,
        card_id: &str,
        position: InsertPosition,
        target_element_id: Option<&str>,
        elements: &[Value],
        sequence: u64,
    ) -> Result<()> {
        let mut body = json!({
            "type": position.as_str(),
            "elements": Value::Array(elements.to_vec()).to_string(),
            "sequence": sequence,
        });
        if let Some(target) = target_element_id {
            body["target_element_id"] = Value::String(target.to_owned());
        }
        self.call(
            reqwest::Method::POST,
            &format!("/open-apis/cardkit/v1/cards/{card_id}/elements"),
            Some(body),
        )
        .await?;
        Ok(())
    }

    async fn delete_card_element(
        &self,
        card_id: &str,
        element_id: &str,
        sequence: u64,
    ) -> Result<()> {
        self.call(
            reqwest::Method::DELETE,
            &format!("/open-apis/cardkit/v1/cards/{card_id}/elements/{element_id}"),
            Some(json!({ "sequence": sequence })),
        )
        .await?;
        Ok(())
    }

    async fn update_card_settings(
        &self,
        card_id: &str,
        settings: &Value,
        sequence: u64,
    ) -> Result<()> {
        self.call(
            reqwest::Method::PATCH,
            &format!("/open-apis/cardkit/v1/cards/{card_id}/settings"),
            Some(json!({ "settings": settings.to_string(), "sequence": sequence })),
        )
        .await?;
        Ok(())
    }

    async fn update_message_card(&self, message_id: &str, card: &Value) -> Result<()> {
        self.call(
            reqwest::Method::PATCH,
            &format!("/open-apis/im/v1/messages/{message_id}"),
            Some(json!({ "content": card.to_string() })),
        )
        .await?;
        Ok(())
    }

    async fn doc_read(&self, doc_token: &str) -> Result<String> {
        let data = self
            .call(
                reqwest::Method::GET,
                &format!("/open-apis/docx/v1/documents/{doc_token}/raw_content"),
                None,
            )
            .await?;
        Self::data_str(&data, "/content", "content")
    }

    async fn doc_append(&self, doc_token: &str, content: &str) -> Result<()> {
        self.call(
            reqwest::Method::POST,
            &format!("/open-apis/docx/v1/documents/{doc_token}/blocks/{doc_token}/children"),
            Some(json!({
                "children": [{
                    "block_type": 2,
                    "text": {
                        "elements": [{ "text_run": { "content": content } }]
                    }
                }]
            })),
        )
        .await?;
        Ok(())
    }
}
