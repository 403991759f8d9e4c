//! Card button callback dispatch.
//!
//! Card callbacks carry an `action` discriminator plus optional ids and a
//! form-value map. Unknown actions are logged and ignored.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::acp::protocol::PermissionOutcome;
use crate::lark::cards;
use crate::lark::events::CardActionEvent;
use crate::models::session::SessionStatus;
use crate::orchestrator::permission::resolve_permission;
use crate::orchestrator::{Orchestrator, MSG_NO_SESSION};
use crate::{AppError, Result};

impl Orchestrator {
    /// Route one card callback to the owning subsystem.
    pub(crate) async fn dispatch_card_action(
        self: &Arc<Self>,
        action: CardActionEvent,
    ) -> Result<()> {
        match action.action() {
            "permission_select" => self.action_permission_select(&action).await,
            "session_select" => self.action_session_select(&action).await,
            "session_delete" => self.action_session_delete(&action).await,
            "mode_select" => self.action_mode_select(&action).await,
            "model_select" => self.action_model_select(&action).await,
            "config_detail" => self.action_config_detail(&action).await,
            "config_select" => self.action_config_select(&action).await,
            "command_select" => self.action_command_select(&action).await,
            "project_create" | "project_edit" | "project_cancel" | "project_select" => {
                self.handle_project_action(&action).await
            }
            other => {
                debug!(action = other, "ignoring unknown card action");
                Ok(())
            }
        }
    }

    /// `permission_select` — resolve the pending request for this card.
    async fn action_permission_select(self: &Arc<Self>, action: &CardActionEvent) -> Result<()> {
        let session_id = required(action, "session_id")?;
        let option_id = required(action, "option_id")?;

        let Some(handle) = self.active_handle(&session_id).await else {
            warn!(%session_id, "permission click for inactive session");
            return Ok(());
        };

        let resolved = resolve_permission(
            &self.lark,
            &handle,
            &action.open_message_id,
            PermissionOutcome::Selected {
                option_id: option_id.clone(),
            },
            true,
        )
        .await;

        if !resolved {
            debug!(
                message_id = %action.open_message_id,
                "permission already resolved, ignoring click"
            );
        }
        Ok(())
    }

    /// `session_select` — resume a session and bind its project to the chat.
    async fn action_session_select(self: &Arc<Self>, action: &CardActionEvent) -> Result<()> {
        let session_id = required(action, "session_id")?;
        let Some(session) = self.sessions.get_by_id(&session_id).await? else {
            self.lark
                .update_message_card(&action.open_message_id, &cards::text_card(MSG_NO_SESSION))
                .await?;
            return Ok(());
        };

        {
            let mut bindings = self.active_projects.lock().await;
            match &session.project_id {
                Some(project_id) => {
                    bindings.insert(session.chat_id.clone(), project_id.clone());
                }
                None => {
                    bindings.remove(&session.chat_id);
                }
            }
        }
        self.sessions.touch(&session.id).await?;

        let text = format!("Resumed session: {}", session.prompt_prefix());
        self.lark
            .update_message_card(&action.open_message_id, &cards::text_card(&text))
            .await?;
        Ok(())
    }

    /// `session_delete` — stop, kill, and remove the session.
    async fn action_session_delete(self: &Arc<Self>, action: &CardActionEvent) -> Result<()> {
        let session_id = required(action, "session_id")?;

        if let Some(session) = self.sessions.get_by_id(&session_id).await? {
            if session.status == SessionStatus::Running {
                if let Some(handle) = self.active_handle(&session.id).await {
                    let (client, acp_id) = {
                        let active = handle.lock().await;
                        (Arc::clone(&active.client), active.acp_session_id.clone())
                    };
                    if let Err(err) = client.cancel(&acp_id).await {
                        warn!(%err, "cancel before delete failed");
                    }
                }
            }
            self.teardown_active(&session.id).await;
            self.sessions.delete(&session.id).await?;
        }

        self.lark
            .update_message_card(&action.open_message_id, &cards::text_card("会话已删除。"))
            .await?;
        Ok(())
    }

    /// `mode_select` — apply the chosen mode.
    async fn action_mode_select(self: &Arc<Self>, action: &CardActionEvent) -> Result<()> {
        let session_id = required(action, "session_id")?;
        let mode_id = required(action, "mode_id")?;

        let session = self
            .sessions
            .get_by_id(&session_id)
            .await?
            .ok_or_else(|| AppError::SessionNotFound(session_id.clone()))?;
        let handle = self.ensure_active(&session).await?;

        let (client, acp_session_id) = {
            let active = handle.lock().await;
            (Arc::clone(&active.client), active.acp_session_id.clone())
        };
        client.set_session_mode(&acp_session_id, &mode_id).await?;
        handle.lock().await.current_mode = mode_id.clone();
        self.sessions.update_mode(&session.id, &mode_id).await?;

        let label = {
            let active = handle.lock().await;
            active
                .available_modes
                .iter()
                .find(|mode| mode.id == mode_id)
                .map_or_else(|| mode_id.clone(), |mode| mode.name.clone())
        };
        self.lark
            .update_message_card(
                &action.open_message_id,
                &cards::text_card(&format!("模式已切换为 **{label}**。")),
            )
            .await?;
        Ok(())
    }

    /// `model_select` — apply the chosen model.
    async fn action_model_select(self: &Arc<Self>, action: &CardActionEvent) -> Result<()> {
        let session_id = required(action, "session_id")?;
        let model_id = required(action, "model_id")?;

        let session = self
            .sessions
            .get_by_id(&session_id)
            .await?
            .ok_or_else(|| AppError::SessionNotFound(session_id.clone()))?;
        let handle = self.ensure_active(&session).await?;

        let (client, acp_session_id) = {
            let active = handle.lock().await;
            (Arc::clone(&active.client), active.acp_session_id.clone())
        };
        client.set_session_model(&acp_session_id, &model_id).await?;
        handle.lock().await.current_model = Some(model_id.clone());

        let label = {
            let active = handle.lock().await;
            active
                .available_models
                .iter()
                .find(|model| model.model_id == model_id)
                .map_or_else(|| model_id.clone(), |model| model.name.clone())
        };
        self.lark
            .update_message_card(
                &action.open_message_id,
                &cards::text_card(&format!("模型已切换为 **{label}**。")),
            )
            .await?;
        Ok(())
    }

    /// `config_detail` — open a card with the option's value choices.
    async fn action_config_detail(self: &Arc<Self>, action: &CardActionEvent) -> Result<()> {
        let session_id = required(action, "session_id")?;
        let config_id = required(action, "config_id")?;

        let Some(handle) = self.active_handle(&session_id).await else {
            return Ok(());
        };
        let option = {
            let active = handle.lock().await;
            active
                .config_options
                .iter()
                .find(|opt| opt.id == config_id)
                .cloned()
        };
        let Some(option) = option else {
            warn!(%config_id, "config option not found");
            return Ok(());
        };

        let card = cards::config_detail_card(&session_id, &option);
        self.lark.send_card(&action.open_chat_id, &card).await?;
        Ok(())
    }

    /// `config_select` — apply the chosen value.
    async fn action_config_select(self: &Arc<Self>, action: &CardActionEvent) -> Result<()> {
        let session_id = required(action, "session_id")?;
        let config_id = required(action, "config_id")?;
        let config_value = required(action, "config_value")?;

        let Some(handle) = self.active_handle(&session_id).await else {
            return Ok(());
        };
        let (client, acp_session_id) = {
            let active = handle.lock().await;
            (Arc::clone(&active.client), active.acp_session_id.clone())
        };
        client
            .set_session_config_option(&acp_session_id, &config_id, &config_value)
            .await?;

        {
            let mut active = handle.lock().await;
            if let Some(option) = active
                .config_options
                .iter_mut()
                .find(|opt| opt.id == config_id)
            {
                option.current_value = Some(config_value.clone());
            }
        }

        self.lark
            .update_message_card(
                &action.open_message_id,
                &cards::text_card(&format!("配置 `{config_id}` 已更新为 `{config_value}`。")),
            )
            .await?;
        Ok(())
    }

    /// `command_select` — run the chosen agent command as a prompt.
    async fn action_command_select(self: &Arc<Self>, action: &CardActionEvent) -> Result<()> {
        let session_id = required(action, "session_id")?;
        let command_name = required(action, "command_name")?;

        let session = self
            .sessions
            .get_by_id(&session_id)
            .await?
            .ok_or_else(|| AppError::SessionNotFound(session_id.clone()))?;

        self.lark
            .update_message_card(
                &action.open_message_id,
                &cards::text_card(&format!("运行 **/{command_name}**…")),
            )
            .await?;

        if session.status == SessionStatus::Running {
            self.reply_best_effort(&action.open_message_id, super::MSG_AGENT_BUSY)
                .await;
            return Ok(());
        }

        self.start_prompt(
            &session,
            &format!("/{command_name}"),
            &action.open_message_id,
        )
        .await
    }
}

/// Extract a required string field from the callback value record.
fn required(action: &CardActionEvent, key: &str) -> Result<String> {
    action
        .value_str(key)
        .map(str::to_owned)
        .ok_or_else(|| AppError::NotFound(format!("card action missing {key}")))
}
