//! Project management: `/project` subcommands and project card actions.
//!
//! A project scopes sessions to a folder under the base working directory.
//! The folder is created on first creation and renamed on folder-name
//! edits; a rename onto an existing target fails.

use std::sync::Arc;

use tracing::{info, warn};

use crate::lark::cards;
use crate::lark::events::{CardActionEvent, MessageEvent};
use crate::models::project::Project;
use crate::orchestrator::Orchestrator;
use crate::{AppError, Result};

impl Orchestrator {
    /// `/project {new|list|info|edit|exit|root}`.
    pub(crate) async fn handle_project_command(
        self: &Arc<Self>,
        message: &MessageEvent,
        args: &str,
    ) -> Result<()> {
        let sub = args.split_whitespace().next().unwrap_or("list");

        match sub {
            "new" => {
                let card = cards::project_form_card("project_create", None);
                self.lark.reply_card(&message.message_id, &card).await?;
                Ok(())
            }
            "list" => {
                let projects = self.projects.list_by_chat(&message.chat_id).await?;
                let card = cards::project_list_card(&projects);
                self.lark.reply_card(&message.message_id, &card).await?;
                Ok(())
            }
            "info" => {
                let text = match self.current_project(&message.chat_id).await? {
                    Some(project) => format!(
                        "当前项目: **{}**\n目录: `{}`\n{}",
                        project.title,
                        self.config
                            .base_working_dir
                            .join(&project.folder_name)
                            .display(),
                        project.description.as_deref().unwrap_or("")
                    ),
                    None => "当前没有激活的项目。".to_owned(),
                };
                self.reply_best_effort(&message.message_id, &text).await;
                Ok(())
            }
            "edit" => match self.current_project(&message.chat_id).await? {
                Some(project) => {
                    let card = cards::project_form_card("project_edit", Some(&project));
                    self.lark.reply_card(&message.message_id, &card).await?;
                    Ok(())
                }
                None => {
                    self.reply_best_effort(&message.message_id, "当前没有激活的项目。")
                        .await;
                    Ok(())
                }
            },
            "exit" => {
                self.active_projects.lock().await.remove(&message.chat_id);
                self.reply_best_effort(&message.message_id, "已退出项目，新会话将使用基础目录。")
                    .await;
                Ok(())
            }
            "root" => {
                self.active_projects.lock().await.remove(&message.chat_id);
                self.reply_best_effort(
                    &message.message_id,
                    &format!("基础目录: `{}`", self.config.base_working_dir.display()),
                )
                .await;
                Ok(())
            }
            other => {
                self.reply_best_effort(
                    &message.message_id,
                    &format!("未知的子命令: {other}\n用法: /project new|list|info|edit|exit|root"),
                )
                .await;
                Ok(())
            }
        }
    }

    /// The chat's currently bound project, if any.
    async fn current_project(&self, chat_id: &str) -> Result<Option<Project>> {
        let project_id = self.active_projects.lock().await.get(chat_id).cloned();
        match project_id {
            Some(id) => self.projects.get_by_id(&id).await,
            None => Ok(None),
        }
    }

    /// Dispatch `project_*` card actions.
    pub(crate) async fn handle_project_action(
        self: &Arc<Self>,
        action: &CardActionEvent,
    ) -> Result<()> {
        match action.action() {
            "project_create" => self.project_create(action).await,
            "project_edit" => self.project_edit(action).await,
            "project_cancel" => {
                self.lark
                    .update_message_card(&action.open_message_id, &cards::text_card("已取消。"))
                    .await?;
                Ok(())
            }
            "project_select" => self.project_select(action).await,
            other => {
                warn!(action = other, "unexpected project action");
                Ok(())
            }
        }
    }

    /// Form submission: create the project and its folder, bind the chat.
    async fn project_create(self: &Arc<Self>, action: &CardActionEvent) -> Result<()> {
        let title = action
            .form_str("title")
            .unwrap_or_default()
            .trim()
            .to_owned();
        let folder_name = action
            .form_str("folder_name")
            .unwrap_or_default()
            .trim()
            .to_owned();
        let description = action
            .form_str("description")
            .map(str::trim)
            .filter(|desc| !desc.is_empty())
            .map(str::to_owned);

        if title.is_empty() {
            self.lark
                .update_message_card(
                    &action.open_message_id,
                    &cards::text_card("标题不能为空。"),
                )
                .await?;
            return Ok(());
        }

        let project = match Project::new(
            action.open_chat_id.clone(),
            action.operator_open_id.clone(),
            title,
            description,
            folder_name,
        ) {
            Ok(project) => project,
            Err(err) => {
                self.lark
                    .update_message_card(
                        &action.open_message_id,
                        &cards::text_card(&format!("创建失败: {err}")),
                    )
                    .await?;
                return Ok(());
            }
        };

        let folder = self.config.base_working_dir.join(&project.folder_name);
        tokio::fs::create_dir_all(&folder)
            .await
            .map_err(|err| AppError::Io(format!("failed to create project folder: {err}")))?;

        self.projects.create(&project).await?;
        self.active_projects
            .lock()
            .await
            .insert(project.chat_id.clone(), project.id.clone());

        info!(project_id = %project.id, folder = %folder.display(), "project created");
        self.lark
            .update_message_card(
                &action.open_message_id,
                &cards::text_card(&format!(
                    "项目 **{}** 已创建。\n目录: `{}`",
                    project.title,
                    folder.display()
                )),
            )
            .await?;
        Ok(())
    }

    /// Form submission: update the project, renaming its folder if needed.
    async fn project_edit(self: &Arc<Self>, action: &CardActionEvent) -> Result<()> {
        let project_id = action
            .value_str("project_id")
            .ok_or_else(|| AppError::NotFound("card action missing project_id".into()))?
            .to_owned();
        let Some(project) = self.projects.get_by_id(&project_id).await? else {
            return Err(AppError::ProjectNotFound(project_id));
        };

        let title = action
            .form_str("title")
            .map_or_else(|| project.title.clone(), |t| t.trim().to_owned());
        let folder_name = action
            .form_str("folder_name")
            .map_or_else(|| project.folder_name.clone(), |f| f.trim().to_owned());
        let description = action
            .form_str("description")
            .map(str::trim)
            .filter(|desc| !desc.is_empty())
            .map(str::to_owned)
            .or_else(|| project.description.clone());

        if folder_name != project.folder_name {
            let from = self.config.base_working_dir.join(&project.folder_name);
            let to = self.config.base_working_dir.join(&folder_name);
            if tokio::fs::metadata(&to).await.is_ok() {
                self.lark
                    .update_message_card(
                        &action.open_message_id,
                        &cards::text_card(&format!("目标目录已存在: `{}`", to.display())),
                    )
                    .await?;
                return Ok(());
            }
            tokio::fs::rename(&from, &to)
                .await
                .map_err(|err| AppError::Io(format!("failed to rename project folder: {err}")))?;
            info!(project_id = %project.id, from = %from.display(), to = %to.display(),
                "project folder renamed");
        }

        self.projects
            .update(&project.id, &title, description.as_deref(), &folder_name)
            .await?;

        self.lark
            .update_message_card(
                &action.open_message_id,
                &cards::text_card(&format!("项目 **{title}** 已更新。")),
            )
            .await?;
        Ok(())
    }

    /// Switch the chat onto a project and touch its most recent session.
    async fn project_select(self: &Arc<Self>, action: &CardActionEvent) -> Result<()> {
        let project_id = action
            .value_str("project_id")
            .ok_or_else(|| AppError::NotFound("card action missing project_id".into()))?
            .to_owned();
        let Some(project) = self.projects.get_by_id(&project_id).await? else {
            return Err(AppError::ProjectNotFound(project_id));
        };

        self.active_projects
            .lock()
            .await
            .insert(action.open_chat_id.clone(), project.id.clone());
        self.projects.touch(&project.id).await?;

        let resumed = match self.sessions.find_latest_in_project(&project.id).await? {
            Some(session) => {
                self.sessions.touch(&session.id).await?;
                format!("\nResumed session: {}", session.prompt_prefix())
            }
            None => String::new(),
        };

        self.lark
            .update_message_card(
                &action.open_message_id,
                &cards::text_card(&format!("Switched to project: {}{resumed}", project.title)),
            )
            .await?;
        Ok(())
    }
}
