//! Session orchestration.
//!
//! The orchestrator is the junction of four asynchronous event sources —
//! the IM webhook, each agent's stdout, child-process exits, and card
//! button callbacks — and one throttled output channel, the streaming
//! card. It owns the active-session table; each entry is guarded by its
//! own `tokio::sync::Mutex`, the per-session lock everything else keys
//! off.

pub mod actions;
pub mod active;
pub mod commands;
pub mod permission;
pub mod projects;
pub mod resolve;
pub mod router;
pub mod shell;
pub mod stream;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::acp::client::{spawn_dispatch, AcpClient, AcpEventHandler};
use crate::acp::jsonrpc::JsonRpcClient;
use crate::acp::protocol::{
    PermissionOutcome, RequestPermissionParams, SessionResult, SessionUpdate, SessionUpdateParams,
};
use crate::acp::tools::{ToolDefinition, ToolRegistry};
use crate::acp::{sse, transport};
use crate::config::GlobalConfig;
use crate::lark::client::LarkApi;
use crate::lark::events::{CardActionEvent, ChatType, InboundEvent, MessageEvent};
use crate::models::session::{Session, SessionStatus};
use crate::orchestrator::active::ActiveSession;
use crate::orchestrator::stream::StreamManager;
use crate::persistence::db::Database;
use crate::persistence::event_repo::EventRepo;
use crate::persistence::project_repo::ProjectRepo;
use crate::persistence::session_repo::SessionRepo;
use crate::process::{ProcessExit, ProcessManager};
use crate::{AppError, Result};

/// Reply shown when a prompt arrives while the agent is busy.
pub const MSG_AGENT_BUSY: &str = "Agent is currently working. Please wait.";
/// Reply shown when a command needs a session and none exists.
pub const MSG_NO_SESSION: &str = "No active session found.";

/// The session orchestrator. One instance per gateway process.
pub struct Orchestrator {
    pub(crate) config: Arc<GlobalConfig>,
    pub(crate) lark: Arc<dyn LarkApi>,
    pub(crate) stream: Arc<StreamManager>,
    pub(crate) sessions: SessionRepo,
    pub(crate) projects: ProjectRepo,
    pub(crate) events: EventRepo,
    pub(crate) procs: Arc<ProcessManager>,
    /// Active sessions keyed by session id; the inner mutex is the
    /// per-session lock.
    pub(crate) active: Mutex<HashMap<String, Arc<Mutex<ActiveSession>>>>,
    /// Reverse index: ACP session id → gateway session id.
    pub(crate) acp_index: Mutex<HashMap<String, String>>,
    /// Per-chat active project binding (in-memory by design).
    pub(crate) active_projects: Mutex<HashMap<String, String>>,
    pub(crate) shutdown: CancellationToken,
}

impl Orchestrator {
    /// Build the orchestrator over its collaborators.
    #[must_use]
    pub fn new(
        config: Arc<GlobalConfig>,
        lark: Arc<dyn LarkApi>,
        db: Arc<Database>,
        procs: Arc<ProcessManager>,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        let stream = Arc::new(StreamManager::new(
            Arc::clone(&lark),
            config.stream.clone(),
        ));
        Arc::new(Self {
            config,
            lark,
            stream,
            sessions: SessionRepo::new(Arc::clone(&db)),
            projects: ProjectRepo::new(Arc::clone(&db)),
            events: EventRepo::new(db),
            procs,
            active: Mutex::new(HashMap::new()),
            acp_index: Mutex::new(HashMap::new()),
            active_projects: Mutex::new(HashMap::new()),
            shutdown,
        })
    }

    /// Drive the event loops until shutdown.
    ///
    /// IM events and process exits are handled fire-and-forget so the
    /// webhook's ack budget is never blocked on ACP I/O.
    pub async fn run(
        self: Arc<Self>,
        mut event_rx: mpsc::Receiver<InboundEvent>,
        mut exit_rx: mpsc::Receiver<ProcessExit>,
    ) {
        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                event = event_rx.recv() => {
                    let Some(event) = event else { break };
                    let orch = Arc::clone(&self);
                    tokio::spawn(async move { orch.process_event(event).await });
                }
                exit = exit_rx.recv() => {
                    let Some(exit) = exit else { break };
                    let orch = Arc::clone(&self);
                    tokio::spawn(async move { orch.handle_process_exit(exit).await });
                }
            }
        }
        info!("orchestrator event loop exited");
    }

    /// Dedup and dispatch one inbound IM event.
    pub async fn process_event(self: Arc<Self>, event: InboundEvent) {
        match self.events.mark_processed(event.event_id()).await {
            Ok(true) => {}
            Ok(false) => {
                info!(event_id = %event.event_id(), "duplicate event acknowledged");
                return;
            }
            Err(err) => {
                error!(%err, "event dedup check failed, dropping event");
                return;
            }
        }

        match event {
            InboundEvent::Message(message) => {
                let message_id = message.message_id.clone();
                if let Err(err) = self.handle_message(message).await {
                    warn!(%err, "message handling failed");
                    self.reply_best_effort(&message_id, &format!("处理失败: {err}"))
                        .await;
                }
            }
            InboundEvent::CardAction(action) => {
                let message_id = action.open_message_id.clone();
                if let Err(err) = self.handle_card_action(action).await {
                    warn!(%err, "card action handling failed");
                    self.reply_best_effort(&message_id, &format!("处理失败: {err}"))
                        .await;
                }
            }
        }
    }

    /// Public entry point: one inbound message.
    ///
    /// # Errors
    ///
    /// Returns an error when handling fails in a way the caller should
    /// surface on the original message.
    pub async fn handle_message(self: &Arc<Self>, message: MessageEvent) -> Result<()> {
        if message.message_type != "text" {
            return Ok(());
        }
        if message.chat_type == ChatType::Group && !message.mentions_bot {
            return Ok(());
        }
        let text = message.text.trim().to_owned();
        if text.is_empty() {
            return Ok(());
        }

        match commands::parse_command(&text) {
            Some(commands::ParsedCommand::Shell { command_line, .. }) => {
                self.handle_shell_command(&message, &command_line).await
            }
            Some(commands::ParsedCommand::Slash { command, args, .. }) => {
                self.handle_slash_command(&message, &command, &args).await
            }
            None => self.handle_prompt(&message, &text).await,
        }
    }

    /// Public entry point: one card button callback.
    ///
    /// # Errors
    ///
    /// Returns an error when the action cannot be applied.
    pub async fn handle_card_action(self: &Arc<Self>, action: CardActionEvent) -> Result<()> {
        self.dispatch_card_action(action).await
    }

    /// Plain-text prompt path: resolve or create the session, then run a
    /// turn.
    async fn handle_prompt(self: &Arc<Self>, message: &MessageEvent, text: &str) -> Result<()> {
        let session = match self.resolve_session_for_message(message).await? {
            Some(session) => session,
            None => self.create_session_for_message(message, text).await?,
        };

        if session.status == SessionStatus::Running {
            self.reply_best_effort(&message.message_id, MSG_AGENT_BUSY)
                .await;
            return Ok(());
        }

        self.start_prompt(&session, text, &message.message_id).await
    }

    /// Create a session bound to the message's thread, inheriting the
    /// chat's active project directory.
    pub(crate) async fn create_session_for_message(
        &self,
        message: &MessageEvent,
        text: &str,
    ) -> Result<Session> {
        let project_id = self
            .active_projects
            .lock()
            .await
            .get(&message.chat_id)
            .cloned();

        let (working_dir, project_id) = match project_id {
            Some(id) => match self.projects.get_by_id(&id).await? {
                Some(project) => (
                    self.config
                        .base_working_dir
                        .join(&project.folder_name)
                        .to_string_lossy()
                        .into_owned(),
                    Some(id),
                ),
                None => (
                    self.config.base_working_dir.to_string_lossy().into_owned(),
                    None,
                ),
            },
            None => (
                self.config.base_working_dir.to_string_lossy().into_owned(),
                None,
            ),
        };

        let mut session = Session::new(
            message.chat_id.clone(),
            message.thread_id().to_owned(),
            message.sender_open_id.clone(),
            text.to_owned(),
            working_dir,
        );
        session.project_id = project_id;
        self.sessions.create(&session).await?;
        info!(session_id = %session.id, thread_id = %session.thread_id, "session created");
        Ok(session)
    }

    /// Run one conversational turn: ensure the agent connection, mark the
    /// session running, send the prompt, and settle state afterwards.
    pub(crate) async fn start_prompt(
        self: &Arc<Self>,
        session: &Session,
        text: &str,
        reply_to_message_id: &str,
    ) -> Result<()> {
        let handle = self.ensure_active(session).await?;

        let (client, acp_session_id) = {
            let mut active = handle.lock().await;
            active.last_prompt_message_id = reply_to_message_id.to_owned();
            (Arc::clone(&active.client), active.acp_session_id.clone())
        };

        if let Err(err) = self
            .sessions
            .update_status(&session.id, SessionStatus::Running)
            .await
        {
            // Lost a race with another prompt: surface the busy text
            // instead of a raw transition error.
            if matches!(err, AppError::SessionState(_)) {
                self.reply_best_effort(reply_to_message_id, MSG_AGENT_BUSY)
                    .await;
                return Ok(());
            }
            return Err(err);
        }

        // The prompt call blocks for the whole turn; updates stream in on
        // the dispatch task meanwhile. The session lock is NOT held here.
        let outcome = client.prompt(&acp_session_id, text).await;

        // Settle status first so a failure below leaves the session
        // resumable rather than stuck running.
        if let Err(err) = self
            .sessions
            .update_status(&session.id, SessionStatus::Idle)
            .await
        {
            warn!(%err, session_id = %session.id, "failed to settle session status");
        }

        let summary = match &outcome {
            Ok(result) => match result.stop_reason.as_deref() {
                Some("cancelled") => "已取消".to_owned(),
                _ => "完成".to_owned(),
            },
            Err(err) => format!("失败: {err}"),
        };

        {
            let mut active = handle.lock().await;
            if let Err(err) = self.stream.close(&mut active, &summary).await {
                warn!(%err, "failed to close streaming card");
            }
        }
        if let Err(err) = self
            .sessions
            .set_working_message_id(&session.id, None)
            .await
        {
            warn!(%err, "failed to clear working_message_id");
        }

        match outcome {
            Ok(result) => {
                info!(
                    session_id = %session.id,
                    stop_reason = result.stop_reason.as_deref().unwrap_or("unknown"),
                    "prompt turn finished"
                );
                Ok(())
            }
            Err(err) => {
                // Surface the failure and drop the broken connection.
                self.reply_best_effort(reply_to_message_id, &format!("智能体执行失败: {err}"))
                    .await;
                self.teardown_active(&session.id).await;
                Err(err)
            }
        }
    }

    /// Get or lazily create the [`ActiveSession`] for a session row.
    ///
    /// The session start protocol: spawn the agent (stdio or SSE), wrap it
    /// in a JSON-RPC client, `initialize`, then `session/load` when an ACP
    /// session id exists (falling back to `session/new` on rejection), and
    /// record the agent-side id.
    pub(crate) async fn ensure_active(
        self: &Arc<Self>,
        session: &Session,
    ) -> Result<Arc<Mutex<ActiveSession>>> {
        if let Some(handle) = self.active.lock().await.get(&session.id) {
            return Ok(Arc::clone(handle));
        }

        let conn_cancel = self.shutdown.child_token();

        // Transport: HTTP SSE when configured, stdio otherwise.
        let (line_tx, line_rx) = if let (Some(events_url), Some(send_url)) = (
            self.config.agent.sse_url.as_ref(),
            self.config.agent.sse_send_url.as_ref(),
        ) {
            let http = reqwest::Client::new();
            let sse_config = sse::SseConfig {
                events_url: events_url.replace("{session_id}", &session.id),
                send_url: send_url.replace("{session_id}", &session.id),
                heartbeat_timeout: std::time::Duration::from_millis(
                    self.config.agent.heartbeat_timeout_ms,
                ),
                max_retries: self.config.agent.max_retries,
            };
            sse::sse_transport(http, sse_config, conn_cancel.clone())
        } else {
            let info = self.procs.spawn(&session.id, &session.working_dir).await?;
            transport::stdio_transport(info.stdin, info.stdout, conn_cancel.clone())
        };

        let rpc = Arc::new(JsonRpcClient::new(line_tx, line_rx));
        let incoming = rpc
            .take_incoming()
            .ok_or_else(|| AppError::Acp("incoming channel already taken".into()))?;

        let tools = Arc::new(self.build_tool_registry(&session.id));
        let handler: Arc<dyn AcpEventHandler> = Arc::clone(self) as Arc<dyn AcpEventHandler>;
        // The dispatch task exits when conn_cancel fires or the stream ends.
        let _dispatch = spawn_dispatch(
            Arc::clone(&rpc),
            incoming,
            Some(handler),
            tools,
            conn_cancel.clone(),
        );

        let client = Arc::new(AcpClient::new(rpc));
        client.initialize().await?;

        // Resume first; fall back to a fresh agent session when the agent
        // no longer recognizes the stored id.
        let result: SessionResult = if let Some(ref acp_id) = session.acp_session_id {
            match client.resume_session(acp_id, &session.working_dir).await {
                Ok(result) => result,
                Err(err) => {
                    warn!(
                        %err,
                        session_id = %session.id,
                        "resume rejected, creating new agent session"
                    );
                    client.new_session(&session.working_dir).await?
                }
            }
        } else {
            client.new_session(&session.working_dir).await?
        };

        self.sessions
            .set_acp_session_id(&session.id, &result.session_id)
            .await?;

        let (available_modes, current_mode) = result.modes.map_or_else(
            || (Vec::new(), session.mode.clone()),
            |modes| (modes.available_modes, modes.current_mode_id),
        );
        let (available_models, current_model) = result.models.map_or_else(
            || (Vec::new(), None),
            |models| (models.available_models, Some(models.current_model_id)),
        );

        let active = ActiveSession {
            session_id: session.id.clone(),
            chat_id: session.chat_id.clone(),
            client,
            acp_session_id: result.session_id.clone(),
            available_commands: Vec::new(),
            available_models,
            available_modes,
            current_mode,
            current_model,
            config_options: result.config_options,
            current_plan: Vec::new(),
            streaming_card: None,
            permission_resolvers: HashMap::new(),
            tool_call_elements: HashMap::new(),
            card_sequences: HashMap::new(),
            last_prompt_message_id: String::new(),
            shell_child: None,
            conn_cancel,
        };

        let handle = Arc::new(Mutex::new(active));
        self.active
            .lock()
            .await
            .insert(session.id.clone(), Arc::clone(&handle));
        self.acp_index
            .lock()
            .await
            .insert(result.session_id, session.id.clone());

        info!(session_id = %session.id, "agent connection established");
        Ok(handle)
    }

    /// Gateway-side tools the agent can call back into.
    fn build_tool_registry(self: &Arc<Self>, session_id: &str) -> ToolRegistry {
        let mut registry = ToolRegistry::new();

        let lark = Arc::clone(&self.lark);
        let sessions = self.sessions.clone();
        let sid = session_id.to_owned();
        registry.register(
            ToolDefinition {
                name: "doc_read".to_owned(),
                description: "Read the raw content of the Lark document bound to this session"
                    .to_owned(),
                input_schema: json!({ "type": "object", "properties": {} }),
            },
            Arc::new(move |_args| {
                let lark = Arc::clone(&lark);
                let sessions = sessions.clone();
                let sid = sid.clone();
                Box::pin(async move {
                    let session = sessions
                        .get_by_id(&sid)
                        .await?
                        .ok_or_else(|| AppError::SessionNotFound(sid.clone()))?;
                    let doc_token = session
                        .doc_token
                        .ok_or_else(|| AppError::NotFound("session has no document".into()))?;
                    let content = lark.doc_read(&doc_token).await?;
                    Ok(json!({ "content": content }))
                })
            }),
        );

        let lark = Arc::clone(&self.lark);
        let sessions = self.sessions.clone();
        let sid = session_id.to_owned();
        registry.register(
            ToolDefinition {
                name: "doc_append".to_owned(),
                description: "Append markdown content to the Lark document bound to this session"
                    .to_owned(),
                input_schema: json!({
                    "type": "object",
                    "properties": { "content": { "type": "string" } },
                    "required": ["content"]
                }),
            },
            Arc::new(move |args| {
                let lark = Arc::clone(&lark);
                let sessions = sessions.clone();
                let sid = sid.clone();
                Box::pin(async move {
                    let content = args
                        .get("content")
                        .and_then(serde_json::Value::as_str)
                        .ok_or_else(|| AppError::NotFound("missing content argument".into()))?
                        .to_owned();
                    let session = sessions
                        .get_by_id(&sid)
                        .await?
                        .ok_or_else(|| AppError::SessionNotFound(sid.clone()))?;
                    let doc_token = session
                        .doc_token
                        .ok_or_else(|| AppError::NotFound("session has no document".into()))?;
                    lark.doc_append(&doc_token, &content).await?;
                    Ok(json!({ "ok": true }))
                })
            }),
        );

        registry
    }

    /// Drop a session's live state: cancel its connection, resolve pending
    /// permissions as cancelled, and kill the child.
    pub(crate) async fn teardown_active(&self, session_id: &str) {
        let handle = self.active.lock().await.remove(session_id);
        if let Some(handle) = handle {
            let mut active = handle.lock().await;
            active.conn_cancel.cancel();
            self.acp_index.lock().await.remove(&active.acp_session_id);

            for (_, pending) in active.permission_resolvers.drain() {
                pending.timer.abort();
                let _ = pending.tx.send(PermissionOutcome::Cancelled);
            }
        }
        if let Err(err) = self.procs.kill(session_id).await {
            warn!(%err, session_id, "failed to kill agent process during teardown");
        }
    }

    /// React to an agent child exiting: drop the session's live state and
    /// close its card with a failure summary.
    async fn handle_process_exit(self: Arc<Self>, exit: ProcessExit) {
        warn!(
            session_id = %exit.session_id,
            exit_code = ?exit.exit_code,
            "agent process exited"
        );

        let handle = self.active.lock().await.remove(&exit.session_id);
        if let Some(handle) = handle {
            let mut active = handle.lock().await;
            active.conn_cancel.cancel();
            self.acp_index.lock().await.remove(&active.acp_session_id);

            for (_, pending) in active.permission_resolvers.drain() {
                pending.timer.abort();
                let _ = pending.tx.send(PermissionOutcome::Cancelled);
            }

            let summary = exit.exit_code.map_or_else(
                || "智能体进程异常退出".to_owned(),
                |code| format!("智能体进程退出 (exit {code})"),
            );
            if let Err(err) = self.stream.close(&mut active, &summary).await {
                warn!(%err, "failed to close card after process exit");
            }
        }

        // A session left running would refuse the next prompt forever.
        if let Ok(Some(session)) = self.sessions.get_by_id(&exit.session_id).await {
            if session.status == SessionStatus::Running {
                if let Err(err) = self
                    .sessions
                    .update_status(&exit.session_id, SessionStatus::Idle)
                    .await
                {
                    warn!(%err, "failed to settle status after process exit");
                }
            }
        }
    }

    /// Cooperative shutdown: resolve permissions, close cards, kill agents.
    pub async fn shutdown(&self) {
        let drained: Vec<(String, Arc<Mutex<ActiveSession>>)> =
            self.active.lock().await.drain().collect();

        for (session_id, handle) in drained {
            let mut active = handle.lock().await;
            for (_, pending) in active.permission_resolvers.drain() {
                pending.timer.abort();
                let _ = pending.tx.send(PermissionOutcome::Cancelled);
            }
            if let Err(err) = self.stream.close(&mut active, "网关已关闭").await {
                warn!(%err, session_id, "failed to close card during shutdown");
            }
            active.conn_cancel.cancel();
        }

        self.procs.kill_all().await;
        info!("orchestrator shut down");
    }

    /// Reply with text, logging instead of propagating IM failures.
    pub(crate) async fn reply_best_effort(&self, message_id: &str, text: &str) {
        if let Err(err) = self.lark.reply_text(message_id, text).await {
            warn!(%err, message_id, "failed to send reply");
        }
    }

    /// Find the active handle for a session id.
    pub(crate) async fn active_handle(
        &self,
        session_id: &str,
    ) -> Option<Arc<Mutex<ActiveSession>>> {
        self.active.lock().await.get(session_id).cloned()
    }
}

#[async_trait]
impl AcpEventHandler for Orchestrator {
    async fn on_session_update(&self, params: SessionUpdateParams) {
        let session_id = {
            let index = self.acp_index.lock().await;
            index.get(&params.session_id).cloned()
        };
        let Some(session_id) = session_id else {
            warn!(acp_session_id = %params.session_id, "update for unknown session");
            return;
        };
        let Some(handle) = self.active_handle(&session_id).await else {
            return;
        };

        let update = SessionUpdate::from_value(&params.update);
        let mut active = handle.lock().await;
        let ctx = router::RouterCtx {
            stream: &self.stream,
            handle: &handle,
            sessions: &self.sessions,
        };
        router::route_update(ctx, &mut active, update).await;
    }

    async fn on_request_permission(&self, params: RequestPermissionParams) -> PermissionOutcome {
        self.handle_permission_request(params).await
    }
}
