//! Command parsing and slash-command dispatch.
//!
//! A message is a command iff its first non-space character is `/` or `!`.
//! `!` runs a shell command in the session's working directory; `/` runs a
//! local command, a configured prompt template, or an agent-recognized
//! command forwarded as the next prompt.

use std::sync::Arc;

use tracing::warn;

use crate::lark::cards;
use crate::lark::events::MessageEvent;
use crate::models::session::{Session, SessionStatus};
use crate::orchestrator::{Orchestrator, MSG_NO_SESSION};
use crate::Result;

/// A parsed chat command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedCommand {
    /// `!<command>` — run in the session's working directory.
    Shell {
        /// The literal command line after `!`, trimmed.
        command_line: String,
        /// The trimmed original text; re-parsing it reproduces this value.
        raw: String,
    },
    /// `/<command> [args]`.
    Slash {
        /// Lowercased command token without the slash.
        command: String,
        /// Remainder after the command token, trimmed.
        args: String,
        /// The trimmed original text; re-parsing it reproduces this value.
        raw: String,
    },
}

/// Parse a message's text into a command, if it is one.
///
/// Empty and whitespace-only messages are not commands, and neither is
/// text whose first non-space character is anything but `/` or `!`.
#[must_use]
pub fn parse_command(text: &str) -> Option<ParsedCommand> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Some(rest) = trimmed.strip_prefix('!') {
        return Some(ParsedCommand::Shell {
            command_line: rest.trim().to_owned(),
            raw: trimmed.to_owned(),
        });
    }

    if let Some(rest) = trimmed.strip_prefix('/') {
        let (token, args) = match rest.find(char::is_whitespace) {
            Some(pos) => (&rest[..pos], rest[pos..].trim()),
            None => (rest, ""),
        };
        return Some(ParsedCommand::Slash {
            command: token.to_lowercase(),
            args: args.to_owned(),
            raw: trimmed.to_owned(),
        });
    }

    None
}

impl Orchestrator {
    /// Dispatch a parsed `/command`.
    #[allow(clippy::too_many_lines)] // Dispatch table is inherently wide.
    pub(crate) async fn handle_slash_command(
        self: &Arc<Self>,
        message: &MessageEvent,
        command: &str,
        args: &str,
    ) -> Result<()> {
        match command {
            "help" => {
                self.reply_best_effort(&message.message_id, HELP_TEXT).await;
                Ok(())
            }
            "new" | "clear" => self.cmd_new_session(message).await,
            "list" | "resume" => self.cmd_list_sessions(message, false).await,
            "listall" => self.cmd_list_sessions(message, true).await,
            "project" => self.handle_project_command(message, args).await,
            _ => {
                // Everything below needs an existing session.
                let Some(session) = self.resolve_session_for_message(message).await? else {
                    self.reply_best_effort(&message.message_id, MSG_NO_SESSION)
                        .await;
                    return Ok(());
                };

                match command {
                    "stop" => self.cmd_stop(message, &session).await,
                    "kill" => self.cmd_kill_shell(message, &session).await,
                    "delete" => self.cmd_delete(message, &session).await,
                    "todo" | "plan" => self.cmd_plan(message, &session).await,
                    "solo" | "yolo" => self.cmd_solo(message, &session).await,
                    "mode" => self.cmd_mode(message, &session, args).await,
                    "model" => self.cmd_model(message, &session, args).await,
                    "info" => self.cmd_info(message, &session).await,
                    "command" => self.cmd_command_list(message, &session).await,
                    "config" => self.cmd_config(message, &session).await,
                    other => self.cmd_fallthrough(message, &session, other, args).await,
                }
            }
        }
    }

    /// `/new` — detach the current thread's session and start fresh.
    async fn cmd_new_session(self: &Arc<Self>, message: &MessageEvent) -> Result<()> {
        if let Some(existing) = self.resolve_session_for_message(message).await? {
            self.teardown_active(&existing.id).await;
        }
        let session = self.create_session_for_message(message, "").await?;
        self.reply_best_effort(
            &message.message_id,
            &format!("已创建新会话 `{}`，直接发送消息开始对话。", session.id),
        )
        .await;
        Ok(())
    }

    /// `/list` (scope-aware) and `/listall` (whole chat).
    async fn cmd_list_sessions(
        self: &Arc<Self>,
        message: &MessageEvent,
        whole_chat: bool,
    ) -> Result<()> {
        let project_id = self
            .active_projects
            .lock()
            .await
            .get(&message.chat_id)
            .cloned();

        let (title, sessions) = match (&project_id, whole_chat) {
            (Some(id), false) => {
                let sessions = self.sessions.list_by_project(id).await?;
                ("项目会话".to_owned(), sessions)
            }
            _ => {
                let sessions = self.sessions.list_by_chat(&message.chat_id).await?;
                ("会话列表".to_owned(), sessions)
            }
        };

        let card = cards::session_list_card(&title, &sessions);
        self.lark.reply_card(&message.message_id, &card).await?;
        Ok(())
    }

    /// `/stop` — cancel the in-flight prompt.
    async fn cmd_stop(self: &Arc<Self>, message: &MessageEvent, session: &Session) -> Result<()> {
        if session.status != SessionStatus::Running {
            self.reply_best_effort(&message.message_id, "当前没有正在执行的任务。")
                .await;
            return Ok(());
        }

        let Some(handle) = self.active_handle(&session.id).await else {
            // Running in the store but no live connection: settle it.
            self.sessions
                .update_status(&session.id, SessionStatus::Idle)
                .await?;
            self.reply_best_effort(&message.message_id, "会话已重置为空闲。")
                .await;
            return Ok(());
        };

        let (client, acp_session_id) = {
            let active = handle.lock().await;
            (Arc::clone(&active.client), active.acp_session_id.clone())
        };
        client.cancel(&acp_session_id).await?;
        // The pending prompt resolves with a cancelled stop reason, which
        // settles status and closes the card.
        self.reply_best_effort(&message.message_id, "已请求停止当前任务。")
            .await;
        Ok(())
    }

    /// `/kill` — terminate only the foreground shell subprocess.
    async fn cmd_kill_shell(
        self: &Arc<Self>,
        message: &MessageEvent,
        session: &Session,
    ) -> Result<()> {
        let Some(handle) = self.active_handle(&session.id).await else {
            self.reply_best_effort(&message.message_id, "没有正在运行的命令。")
                .await;
            return Ok(());
        };

        let child = {
            let active = handle.lock().await;
            active.shell_child.clone()
        };
        match child {
            Some(child) => {
                let mut child = child.lock().await;
                if let Err(err) = child.start_kill() {
                    warn!(%err, "failed to kill shell command");
                }
                self.reply_best_effort(&message.message_id, "已终止前台命令。")
                    .await;
            }
            None => {
                self.reply_best_effort(&message.message_id, "没有正在运行的命令。")
                    .await;
            }
        }
        Ok(())
    }

    /// `/delete` — stop, kill, and remove the session.
    async fn cmd_delete(self: &Arc<Self>, message: &MessageEvent, session: &Session) -> Result<()> {
        self.teardown_active(&session.id).await;
        self.sessions.delete(&session.id).await?;
        self.reply_best_effort(&message.message_id, &format!("会话 `{}` 已删除。", session.id))
            .await;
        Ok(())
    }

    /// `/todo` — render the cached plan snapshot.
    async fn cmd_plan(self: &Arc<Self>, message: &MessageEvent, session: &Session) -> Result<()> {
        let entries = match self.active_handle(&session.id).await {
            Some(handle) => handle.lock().await.current_plan.clone(),
            None => Vec::new(),
        };
        let card = cards::plan_card(&entries);
        self.lark.reply_card(&message.message_id, &card).await?;
        Ok(())
    }

    /// `/solo` — toggle between `default` and `bypassPermissions`.
    async fn cmd_solo(self: &Arc<Self>, message: &MessageEvent, session: &Session) -> Result<()> {
        let target = if session.mode == "bypassPermissions" {
            "default"
        } else {
            "bypassPermissions"
        };
        self.apply_mode(message, session, target).await
    }

    /// `/mode [name]` — switch mode or list the available ones.
    async fn cmd_mode(
        self: &Arc<Self>,
        message: &MessageEvent,
        session: &Session,
        args: &str,
    ) -> Result<()> {
        let handle = self.ensure_active(session).await?;

        if args.is_empty() {
            let (modes, current) = {
                let active = handle.lock().await;
                (active.available_modes.clone(), active.current_mode.clone())
            };
            let card = cards::mode_list_card(&session.id, &modes, &current);
            self.lark.reply_card(&message.message_id, &card).await?;
            return Ok(());
        }

        let resolved = handle.lock().await.resolve_mode(args);
        match resolved {
            Some(mode_id) => self.apply_mode(message, session, &mode_id).await,
            None => {
                // Unknown name: fall back to listing.
                let (modes, current) = {
                    let active = handle.lock().await;
                    (active.available_modes.clone(), active.current_mode.clone())
                };
                let card = cards::mode_list_card(&session.id, &modes, &current);
                self.lark.reply_card(&message.message_id, &card).await?;
                Ok(())
            }
        }
    }

    /// Apply a mode change through ACP and persist it.
    async fn apply_mode(
        self: &Arc<Self>,
        message: &MessageEvent,
        session: &Session,
        mode_id: &str,
    ) -> Result<()> {
        let handle = self.ensure_active(session).await?;
        let (client, acp_session_id) = {
            let active = handle.lock().await;
            (Arc::clone(&active.client), active.acp_session_id.clone())
        };
        client.set_session_mode(&acp_session_id, mode_id).await?;

        handle.lock().await.current_mode = mode_id.to_owned();
        self.sessions.update_mode(&session.id, mode_id).await?;
        self.reply_best_effort(&message.message_id, &format!("模式已切换为 `{mode_id}`。"))
            .await;
        Ok(())
    }

    /// `/model [name]` — switch model or list the available ones.
    async fn cmd_model(
        self: &Arc<Self>,
        message: &MessageEvent,
        session: &Session,
        args: &str,
    ) -> Result<()> {
        let handle = self.ensure_active(session).await?;

        if args.is_empty() {
            let (models, current) = {
                let active = handle.lock().await;
                (
                    active.available_models.clone(),
                    active.current_model.clone(),
                )
            };
            let card = cards::model_list_card(&session.id, &models, current.as_deref());
            self.lark.reply_card(&message.message_id, &card).await?;
            return Ok(());
        }

        let resolved = {
            let active = handle.lock().await;
            active
                .available_models
                .iter()
                .find(|model| {
                    model.model_id == args || model.name.eq_ignore_ascii_case(args)
                })
                .map(|model| model.model_id.clone())
        };
        let Some(model_id) = resolved else {
            self.reply_best_effort(&message.message_id, &format!("未找到模型: {args}"))
                .await;
            return Ok(());
        };

        let (client, acp_session_id) = {
            let active = handle.lock().await;
            (Arc::clone(&active.client), active.acp_session_id.clone())
        };
        client.set_session_model(&acp_session_id, &model_id).await?;
        handle.lock().await.current_model = Some(model_id.clone());
        self.reply_best_effort(&message.message_id, &format!("模型已切换为 `{model_id}`。"))
            .await;
        Ok(())
    }

    /// `/info` — session overview card.
    async fn cmd_info(self: &Arc<Self>, message: &MessageEvent, session: &Session) -> Result<()> {
        let model = match self.active_handle(&session.id).await {
            Some(handle) => handle.lock().await.current_model.clone(),
            None => None,
        };
        let project_title = match &session.project_id {
            Some(id) => self
                .projects
                .get_by_id(id)
                .await?
                .map(|project| project.title),
            None => None,
        };

        let card = cards::info_card(session, model.as_deref(), project_title.as_deref());
        self.lark.reply_card(&message.message_id, &card).await?;
        Ok(())
    }

    /// `/command` — list the agent's slash commands.
    async fn cmd_command_list(
        self: &Arc<Self>,
        message: &MessageEvent,
        session: &Session,
    ) -> Result<()> {
        let commands = match self.active_handle(&session.id).await {
            Some(handle) => handle.lock().await.available_commands.clone(),
            None => Vec::new(),
        };
        let card = cards::command_list_card(&session.id, &commands);
        self.lark.reply_card(&message.message_id, &card).await?;
        Ok(())
    }

    /// `/config` — list the agent's configuration options.
    async fn cmd_config(self: &Arc<Self>, message: &MessageEvent, session: &Session) -> Result<()> {
        let options = match self.active_handle(&session.id).await {
            Some(handle) => handle.lock().await.config_options.clone(),
            None => Vec::new(),
        };
        let card = cards::config_list_card(&session.id, &options);
        self.lark.reply_card(&message.message_id, &card).await?;
        Ok(())
    }

    /// Prompt templates, agent pass-through, then the unknown fallback.
    async fn cmd_fallthrough(
        self: &Arc<Self>,
        message: &MessageEvent,
        session: &Session,
        command: &str,
        args: &str,
    ) -> Result<()> {
        // Configured prompt template.
        if let Some(template) = self.config.prompt_commands.get(command) {
            let prompt = template.replace("{args}", args);
            return self.start_prompt(session, &prompt, &message.message_id).await;
        }

        // Agent-recognized command: forward verbatim.
        let recognized = match self.active_handle(&session.id).await {
            Some(handle) => handle
                .lock()
                .await
                .available_commands
                .iter()
                .any(|cmd| cmd.name == command),
            None => false,
        };
        if recognized {
            let prompt = if args.is_empty() {
                format!("/{command}")
            } else {
                format!("/{command} {args}")
            };
            return self.start_prompt(session, &prompt, &message.message_id).await;
        }

        self.reply_best_effort(&message.message_id, &format!("Unknown command: /{command}"))
            .await;
        Ok(())
    }
}

/// `/help` reply body.
const HELP_TEXT: &str = "可用命令:\n\
/help — 显示本帮助\n\
/new, /clear — 新建会话\n\
/list, /resume — 会话列表（当前项目）\n\
/listall — 全部会话\n\
/delete — 删除当前会话\n\
/stop — 停止当前任务\n\
/kill — 终止前台 shell 命令\n\
/todo, /plan — 查看任务计划\n\
/solo, /yolo — 切换免授权模式\n\
/mode [名称] — 查看/切换模式\n\
/model [名称] — 查看/切换模型\n\
/info — 会话信息\n\
/command — 智能体命令列表\n\
/config — 智能体配置\n\
/project new|list|info|edit|exit|root — 项目管理\n\
!<命令> — 在会话目录执行 shell 命令";
