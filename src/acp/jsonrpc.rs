//! JSON-RPC 2.0 client over a line-oriented transport.
//!
//! The client is transport-agnostic: it writes outbound messages into an
//! `mpsc` line channel and consumes inbound lines from another. The stdio
//! and SSE transports pump those channels against the actual byte streams.
//!
//! Responses are correlated to requests through a pending map of `oneshot`
//! senders keyed by the numeric request id; notifications and server-side
//! calls are surfaced on a separate incoming channel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, warn};

use crate::{AppError, Result};

/// A JSON-RPC 2.0 request (or notification when `id` is `None`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Protocol version marker, always `"2.0"`.
    pub jsonrpc: String,
    /// Method name.
    pub method: String,
    /// Method parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Request id; absent for notifications.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
}

/// A JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Protocol version marker, always `"2.0"`.
    pub jsonrpc: String,
    /// Success payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    /// Correlated request id.
    pub id: Option<u64>,
}

impl Response {
    /// Unwrap the success payload, converting an error object into
    /// [`AppError::Acp`].
    ///
    /// # Errors
    ///
    /// Returns `AppError::Acp` carrying the remote error message.
    pub fn into_result(self) -> Result<Value> {
        if let Some(err) = self.error {
            return Err(AppError::Acp(format!(
                "rpc error {}: {}",
                err.code, err.message
            )));
        }
        Ok(self.result.unwrap_or(Value::Null))
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    /// Numeric error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
    /// Optional structured detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A raw incoming JSON-RPC message: response, notification, or a call from
/// the remote side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    /// Protocol version marker.
    pub jsonrpc: String,
    /// Request/response id, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    /// Method name, for notifications and remote calls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Method parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Response success payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Response error payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl IncomingMessage {
    /// A response has no `method` and carries `result` or `error`.
    #[must_use]
    pub fn is_response(&self) -> bool {
        self.method.is_none() && (self.result.is_some() || self.error.is_some())
    }

    /// A notification has a `method` but no `id`.
    #[must_use]
    pub fn is_notification(&self) -> bool {
        self.method.is_some() && self.id.is_none()
    }

    /// A call from the remote side has both `method` and `id`.
    #[must_use]
    pub fn is_remote_call(&self) -> bool {
        self.method.is_some() && self.id.is_some()
    }

    /// Convert into a [`Response`] (only valid when [`Self::is_response`]).
    #[must_use]
    pub fn into_response(self) -> Response {
        Response {
            jsonrpc: self.jsonrpc,
            result: self.result,
            error: self.error,
            id: self.id,
        }
    }
}

/// Transport-agnostic JSON-RPC 2.0 client.
pub struct JsonRpcClient {
    /// Outbound line channel drained by the transport pump.
    line_tx: mpsc::Sender<String>,
    /// Monotonically increasing request id counter.
    next_id: AtomicU64,
    /// Pending requests awaiting a response, keyed by request id.
    pending: Arc<Mutex<HashMap<u64, oneshot::Sender<Response>>>>,
    /// Receiver side for notifications and remote calls — handed out once.
    incoming_rx: std::sync::Mutex<Option<mpsc::UnboundedReceiver<IncomingMessage>>>,
}

impl JsonRpcClient {
    /// Create a client over a pair of line channels.
    ///
    /// Spawns a routing task that classifies each inbound line: responses
    /// resolve their pending future; notifications and remote calls are
    /// forwarded to the channel retrievable via [`Self::take_incoming`].
    /// When `line_rx` closes, every pending request is failed by dropping
    /// its sender.
    #[must_use]
    pub fn new(line_tx: mpsc::Sender<String>, mut line_rx: mpsc::Receiver<String>) -> Self {
        let pending: Arc<Mutex<HashMap<u64, oneshot::Sender<Response>>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel::<IncomingMessage>();

        let router_pending = Arc::clone(&pending);
        tokio::spawn(async move {
            while let Some(line) = line_rx.recv().await {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }

                let msg: IncomingMessage = match serde_json::from_str(trimmed) {
                    Ok(m) => m,
                    Err(err) => {
                        warn!(%err, "skipping malformed json-rpc line");
                        continue;
                    }
                };

                if msg.is_response() {
                    if let Some(id) = msg.id {
                        let mut map = router_pending.lock().await;
                        if let Some(tx) = map.remove(&id) {
                            let _ = tx.send(msg.into_response());
                        } else {
                            warn!(id, "response for unknown request id");
                        }
                    } else {
                        warn!("response without id");
                    }
                } else if incoming_tx.send(msg).is_err() {
                    debug!("incoming receiver dropped, stopping json-rpc router");
                    break;
                }
            }
            // Transport closed — fail all pending requests.
            router_pending.lock().await.clear();
        });

        Self {
            line_tx,
            next_id: AtomicU64::new(1),
            pending,
            incoming_rx: std::sync::Mutex::new(Some(incoming_rx)),
        }
    }

    /// Take the receiver for incoming notifications and remote calls.
    ///
    /// Can only be called once; subsequent calls return `None`.
    #[must_use]
    pub fn take_incoming(&self) -> Option<mpsc::UnboundedReceiver<IncomingMessage>> {
        self.incoming_rx
            .lock()
            .ok()
            .and_then(|mut guard| guard.take())
    }

    /// Send a request and wait for the matching response.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Acp` if the transport is closed before a response
    /// arrives or if serialization fails.
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Response> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let req = Request {
            jsonrpc: "2.0".to_owned(),
            method: method.to_owned(),
            params,
            id: Some(id),
        };

        let (tx, rx) = oneshot::channel::<Response>();

        // Register before writing to avoid losing a fast response.
        {
            let mut map = self.pending.lock().await;
            map.insert(id, tx);
        }

        if let Err(err) = self.send_line(&req).await {
            self.pending.lock().await.remove(&id);
            return Err(err);
        }

        rx.await
            .map_err(|_| AppError::Acp(format!("connection closed awaiting response to {method}")))
    }

    /// Send a notification (no id, no response expected).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Acp` if the transport is closed.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        let req = Request {
            jsonrpc: "2.0".to_owned(),
            method: method.to_owned(),
            params,
            id: None,
        };
        self.send_line(&req).await
    }

    /// Send a response to a call initiated by the remote side.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Acp` if the transport is closed.
    pub async fn respond(
        &self,
        id: u64,
        result: Option<Value>,
        error: Option<RpcError>,
    ) -> Result<()> {
        let resp = Response {
            jsonrpc: "2.0".to_owned(),
            result,
            error,
            id: Some(id),
        };
        self.send_line(&resp).await
    }

    async fn send_line<T: Serialize>(&self, message: &T) -> Result<()> {
        let line = serde_json::to_string(message)
            .map_err(|err| AppError::Acp(format!("failed to serialize message: {err}")))?;
        self.line_tx
            .send(line)
            .await
            .map_err(|_| AppError::Acp("transport closed".into()))
    }
}
