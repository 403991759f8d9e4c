//! ACP client bridge.
//!
//! Wraps a [`JsonRpcClient`] with the typed outbound operations the
//! orchestrator calls and a dispatch loop that serves the agent's inbound
//! traffic: `session/update` notifications, `session/request_permission`
//! calls, and the `autocoder/tool/*` ext methods.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::acp::jsonrpc::{IncomingMessage, JsonRpcClient, RpcError};
use crate::acp::protocol::{
    self, ClientInfo, ContentBlock, InitializeParams, PermissionOutcome, RequestPermissionParams,
    SessionCancelParams, SessionLoadParams, SessionNewParams, SessionPromptParams,
    SessionPromptResult, SessionResult, SessionUpdateParams, SetConfigOptionParams, SetModeParams,
    SetModelParams,
};
use crate::acp::tools::ToolRegistry;
use crate::{AppError, Result};

/// Receiver of inbound agent traffic.
///
/// The orchestrator implements this once per gateway; the bridge calls it
/// from the dispatch task, outside any session lock.
#[async_trait]
pub trait AcpEventHandler: Send + Sync {
    /// A `session/update` notification arrived.
    async fn on_session_update(&self, params: SessionUpdateParams);

    /// The agent asks for permission; the returned outcome answers the call.
    async fn on_request_permission(&self, params: RequestPermissionParams) -> PermissionOutcome;
}

/// Typed client for one agent connection.
pub struct AcpClient {
    rpc: Arc<JsonRpcClient>,
}

impl AcpClient {
    /// Wrap a JSON-RPC client.
    #[must_use]
    pub fn new(rpc: Arc<JsonRpcClient>) -> Self {
        Self { rpc }
    }

    /// Access the underlying JSON-RPC client.
    #[must_use]
    pub fn rpc(&self) -> &Arc<JsonRpcClient> {
        &self.rpc
    }

    /// Perform the `initialize` handshake.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Acp` on transport or protocol failure.
    pub async fn initialize(&self) -> Result<Value> {
        let params = InitializeParams {
            client_info: ClientInfo {
                name: "lark-agent-gateway".to_owned(),
                version: env!("CARGO_PKG_VERSION").to_owned(),
            },
            protocol_version: protocol::PROTOCOL_VERSION,
        };
        self.request(protocol::METHOD_INITIALIZE, &params).await
    }

    /// Create a new agent session rooted at `cwd`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Acp` on transport or protocol failure.
    pub async fn new_session(&self, cwd: &str) -> Result<SessionResult> {
        let params = SessionNewParams {
            cwd: cwd.to_owned(),
            mcp_servers: Vec::new(),
            meta: None,
        };
        let value = self.request(protocol::METHOD_SESSION_NEW, &params).await?;
        serde_json::from_value(value)
            .map_err(|err| AppError::Acp(format!("invalid session/new result: {err}")))
    }

    /// Resume an existing agent session.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Acp` on transport failure or when the agent
    /// rejects the resume (callers fall back to [`Self::new_session`]).
    pub async fn resume_session(&self, acp_session_id: &str, cwd: &str) -> Result<SessionResult> {
        let params = SessionLoadParams {
            session_id: acp_session_id.to_owned(),
            cwd: cwd.to_owned(),
        };
        let value = self.request(protocol::METHOD_SESSION_LOAD, &params).await?;
        serde_json::from_value(value)
            .map_err(|err| AppError::Acp(format!("invalid session/load result: {err}")))
    }

    /// Send a user prompt and wait for the turn to end.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Acp` on transport or protocol failure.
    pub async fn prompt(&self, acp_session_id: &str, text: &str) -> Result<SessionPromptResult> {
        let params = SessionPromptParams {
            session_id: acp_session_id.to_owned(),
            prompt: vec![ContentBlock::Text {
                text: text.to_owned(),
            }],
        };
        let value = self
            .request(protocol::METHOD_SESSION_PROMPT, &params)
            .await?;
        serde_json::from_value(value)
            .map_err(|err| AppError::Acp(format!("invalid session/prompt result: {err}")))
    }

    /// Cancel the in-flight prompt for a session.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Acp` if the transport is closed.
    pub async fn cancel(&self, acp_session_id: &str) -> Result<()> {
        let params = SessionCancelParams {
            session_id: acp_session_id.to_owned(),
        };
        let value = serde_json::to_value(&params)
            .map_err(|err| AppError::Acp(format!("failed to serialize params: {err}")))?;
        self.rpc
            .notify(protocol::METHOD_SESSION_CANCEL, Some(value))
            .await
    }

    /// Switch the agent's interaction mode.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Acp` on transport or protocol failure.
    pub async fn set_session_mode(&self, acp_session_id: &str, mode_id: &str) -> Result<()> {
        let params = SetModeParams {
            session_id: acp_session_id.to_owned(),
            mode_id: mode_id.to_owned(),
        };
        self.request(protocol::METHOD_SET_MODE, &params).await?;
        Ok(())
    }

    /// Switch the agent's model.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Acp` on transport or protocol failure.
    pub async fn set_session_model(&self, acp_session_id: &str, model_id: &str) -> Result<()> {
        let params = SetModelParams {
            session_id: acp_session_id.to_owned(),
            model_id: model_id.to_owned(),
        };
        self.request(protocol::METHOD_SET_MODEL, &params).await?;
        Ok(())
    }

    /// Set one agent configuration option.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Acp` on transport or protocol failure.
    pub async fn set_session_config_option(
        &self,
        acp_session_id: &str,
        config_id: &str,
        value: &str,
    ) -> Result<()> {
        let params = SetConfigOptionParams {
            session_id: acp_session_id.to_owned(),
            config_id: config_id.to_owned(),
            value: value.to_owned(),
        };
        self.request(protocol::METHOD_SET_CONFIG_OPTION, &params)
            .await?;
        Ok(())
    }

    async fn request<P: serde::Serialize>(&self, method: &str, params: &P) -> Result<Value> {
        let value = serde_json::to_value(params)
            .map_err(|err| AppError::Acp(format!("failed to serialize params: {err}")))?;
        self.rpc.request(method, Some(value)).await?.into_result()
    }
}

/// Spawn the inbound dispatch loop for one agent connection.
///
/// Routes each incoming message:
/// - `session/update` notification → [`AcpEventHandler::on_session_update`];
/// - `session/request_permission` call → the handler's outcome, or
///   auto-approval of the first option when `handler` is `None`;
/// - `autocoder/tool/list` / `autocoder/tool/call` → the tool registry;
/// - any other ext call → an "unsupported" error response.
///
/// The task exits when the connection closes or `cancel` fires.
#[must_use]
pub fn spawn_dispatch(
    rpc: Arc<JsonRpcClient>,
    mut incoming: tokio::sync::mpsc::UnboundedReceiver<IncomingMessage>,
    handler: Option<Arc<dyn AcpEventHandler>>,
    tools: Arc<ToolRegistry>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                () = cancel.cancelled() => break,
                msg = incoming.recv() => {
                    let Some(msg) = msg else { break };
                    msg
                }
            };

            let method = msg.method.clone().unwrap_or_default();
            let params = msg.params.clone().unwrap_or(Value::Null);

            if msg.is_notification() {
                if method == protocol::METHOD_SESSION_UPDATE {
                    match serde_json::from_value::<SessionUpdateParams>(params) {
                        Ok(update) => {
                            if let Some(ref h) = handler {
                                h.on_session_update(update).await;
                            }
                        }
                        Err(err) => warn!(%err, "malformed session/update params"),
                    }
                } else {
                    debug!(%method, "ignoring unknown notification");
                }
                continue;
            }

            let Some(id) = msg.id else {
                debug!(%method, "inbound message is neither call nor notification");
                continue;
            };

            match method.as_str() {
                protocol::METHOD_REQUEST_PERMISSION => {
                    handle_permission(&rpc, id, params, handler.clone());
                }
                protocol::METHOD_TOOL_LIST => {
                    let result = json!({ "tools": tools.list() });
                    respond_ok(&rpc, id, result).await;
                }
                protocol::METHOD_TOOL_CALL => {
                    handle_tool_call(&rpc, id, params, Arc::clone(&tools));
                }
                other => {
                    warn!(method = other, "unsupported ext method");
                    respond_err(&rpc, id, format!("unsupported method: {other}")).await;
                }
            }
        }
        debug!("acp dispatch loop exited");
    })
}

/// Answer a permission call, off the dispatch loop so a slow user click
/// does not stall other inbound traffic.
fn handle_permission(
    rpc: &Arc<JsonRpcClient>,
    id: u64,
    params: Value,
    handler: Option<Arc<dyn AcpEventHandler>>,
) {
    let rpc = Arc::clone(rpc);
    tokio::spawn(async move {
        let outcome = match serde_json::from_value::<RequestPermissionParams>(params) {
            Ok(request) => match handler {
                Some(h) => h.on_request_permission(request).await,
                None => request.options.first().map_or(PermissionOutcome::Cancelled, |opt| {
                    PermissionOutcome::Selected {
                        option_id: opt.option_id.clone(),
                    }
                }),
            },
            Err(err) => {
                warn!(%err, "malformed request_permission params");
                PermissionOutcome::Cancelled
            }
        };

        match serde_json::to_value(&outcome) {
            Ok(value) => respond_ok(&rpc, id, value).await,
            Err(err) => {
                warn!(%err, "failed to serialize permission outcome");
                respond_err(&rpc, id, "internal error".to_owned()).await;
            }
        }
    });
}

/// Run a tool call off the dispatch loop.
fn handle_tool_call(rpc: &Arc<JsonRpcClient>, id: u64, params: Value, tools: Arc<ToolRegistry>) {
    let rpc = Arc::clone(rpc);
    tokio::spawn(async move {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        let args = params.get("arguments").cloned().unwrap_or(Value::Null);

        match tools.call(&name, args).await {
            Ok(result) => respond_ok(&rpc, id, result).await,
            Err(err) => respond_err(&rpc, id, err.to_string()).await,
        }
    });
}

async fn respond_ok(rpc: &JsonRpcClient, id: u64, result: Value) {
    if let Err(err) = rpc.respond(id, Some(result), None).await {
        warn!(%err, id, "failed to send rpc response");
    }
}

async fn respond_err(rpc: &JsonRpcClient, id: u64, message: String) {
    let error = RpcError {
        code: -32601,
        message,
        data: None,
    };
    if let Err(err) = rpc.respond(id, None, Some(error)).await {
        warn!(%err, id, "failed to send rpc error response");
    }
}
