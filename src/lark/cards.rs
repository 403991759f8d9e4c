//! Interactive card JSON builders.
//!
//! All cards use card JSON 2.0 so elements can be patched in place by id.
//! Builders return `serde_json::Value`; the element ids referenced by the
//! streaming card manager (`md_0`, `processing_indicator`) are fixed here.

use serde_json::{json, Value};

use crate::acp::protocol::{
    AgentCommand, ConfigOption, ModeEntry, ModelEntry, PermissionOption,
};
use crate::models::plan::PlanEntry;
use crate::models::project::Project;
use crate::models::session::Session;

/// Element id of the greyed placeholder in a fresh streaming card.
pub const PLACEHOLDER_ELEMENT_ID: &str = "md_0";
/// Element id of the processing indicator at the card's tail.
pub const PROCESSING_ELEMENT_ID: &str = "processing_indicator";

/// A markdown element with an explicit id.
#[must_use]
pub fn markdown_element(element_id: &str, content: &str) -> Value {
    json!({
        "tag": "markdown",
        "element_id": element_id,
        "content": content,
    })
}

/// The spinner row kept at the bottom of a live streaming card.
#[must_use]
pub fn processing_indicator() -> Value {
    markdown_element(
        PROCESSING_ELEMENT_ID,
        "<font color='grey'>⏳ 处理中…</font>",
    )
}

/// Grey duration marker replacing the indicator when the card closes.
#[must_use]
pub fn duration_marker(seconds: u64) -> Value {
    markdown_element(
        PROCESSING_ELEMENT_ID,
        &format!("<font color='grey'>⏱ {seconds}s</font>"),
    )
}

/// A fresh streaming card: greyed placeholder plus processing indicator.
#[must_use]
pub fn streaming_card(summary: &str) -> Value {
    json!({
        "schema": "2.0",
        "config": {
            "streaming_mode": true,
            "summary": { "content": summary },
        },
        "body": {
            "elements": [
                markdown_element(PLACEHOLDER_ELEMENT_ID, "<font color='grey'>Pending...</font>"),
                processing_indicator(),
            ],
        },
    })
}

/// Streaming-mode settings patch.
#[must_use]
pub fn streaming_settings(streaming_mode: bool, summary: &str) -> Value {
    json!({
        "config": {
            "streaming_mode": streaming_mode,
            "summary": { "content": summary },
        }
    })
}

/// Icon shown for a tool call, by kind and status.
#[must_use]
pub fn tool_icon(kind: &str, status: &str) -> &'static str {
    match status {
        "completed" => "✅",
        "failed" => "❌",
        _ => match kind {
            "read" => "📖",
            "search" => "🔍",
            "execute" => "💻",
            "edit" => "✏️",
            "fetch" => "🌐",
            _ => "🔧",
        },
    }
}

/// Tool call element body.
#[must_use]
pub fn tool_call_element(
    element_id: &str,
    kind: &str,
    status: &str,
    title: &str,
    label: &str,
    duration: Option<u64>,
) -> Value {
    let icon = tool_icon(kind, status);
    let mut content = if label.is_empty() {
        format!("{icon} **{title}**")
    } else {
        format!("{icon} **{title}** `{label}`")
    };
    if let Some(secs) = duration {
        let color = if status == "failed" { "red" } else { "green" };
        content.push_str(&format!(" <font color='{color}'>{secs}s</font>"));
    }
    markdown_element(element_id, &content)
}

/// Colored shell footer line: `Ns · Exit: 0`, `Ns · Signal: TERM`, …
#[must_use]
pub fn shell_footer_element(element_id: &str, color: &str, text: &str) -> Value {
    markdown_element(element_id, &format!("<font color='{color}'>{text}</font>"))
}

/// A static one-section card.
#[must_use]
pub fn text_card(text: &str) -> Value {
    json!({
        "schema": "2.0",
        "body": { "elements": [ { "tag": "markdown", "content": text } ] },
    })
}

/// Button carrying a callback value record.
fn callback_button(text: &str, value: Value) -> Value {
    json!({
        "tag": "button",
        "text": { "tag": "plain_text", "content": text },
        "type": "default",
        "behaviors": [ { "type": "callback", "value": value } ],
    })
}

/// Permission card: one interactive container per option.
#[must_use]
pub fn permission_card(session_id: &str, tool_description: &str, options: &[PermissionOption]) -> Value {
    let mut elements = vec![json!({
        "tag": "markdown",
        "content": format!("🔐 **需要授权**\n{tool_description}"),
    })];

    let buttons: Vec<Value> = options
        .iter()
        .map(|opt| {
            callback_button(
                &opt.name,
                json!({
                    "action": "permission_select",
                    "session_id": session_id,
                    "option_id": opt.option_id,
                }),
            )
        })
        .collect();
    elements.push(json!({ "tag": "column_set", "columns": [ {
        "tag": "column",
        "elements": buttons,
    } ] }));

    json!({
        "schema": "2.0",
        "header": {
            "template": "orange",
            "title": { "tag": "plain_text", "content": "权限请求" },
        },
        "body": { "elements": elements },
    })
}

/// Permission card after the user picked an option.
#[must_use]
pub fn permission_resolved_card(tool_description: &str, chosen: &str) -> Value {
    json!({
        "schema": "2.0",
        "header": {
            "template": "green",
            "title": { "tag": "plain_text", "content": "权限请求" },
        },
        "body": { "elements": [ {
            "tag": "markdown",
            "content": format!("🔐 {tool_description}\n✔ 已选择: **{chosen}**"),
        } ] },
    })
}

/// Session list card with resume and delete buttons.
#[must_use]
pub fn session_list_card(title: &str, sessions: &[Session]) -> Value {
    let mut elements = Vec::new();
    for session in sessions {
        elements.push(json!({
            "tag": "markdown",
            "content": format!("**{}**\n<font color='grey'>{}</font>",
                session.prompt_prefix(),
                session.updated_at.format("%Y-%m-%d %H:%M")),
        }));
        elements.push(json!({ "tag": "column_set", "columns": [ {
            "tag": "column",
            "elements": [
                callback_button("继续", json!({
                    "action": "session_select",
                    "session_id": session.id,
                })),
                callback_button("删除", json!({
                    "action": "session_delete",
                    "session_id": session.id,
                })),
            ],
        } ] }));
    }
    if sessions.is_empty() {
        elements.push(json!({ "tag": "markdown", "content": "_暂无会话_" }));
    }

    json!({
        "schema": "2.0",
        "header": { "title": { "tag": "plain_text", "content": title } },
        "body": { "elements": elements },
    })
}

/// Project list card with select buttons.
#[must_use]
pub fn project_list_card(projects: &[Project]) -> Value {
    let mut elements = Vec::new();
    for project in projects {
        let description = project.description.as_deref().unwrap_or("");
        elements.push(json!({
            "tag": "markdown",
            "content": format!("**{}** `{}`\n{description}", project.title, project.folder_name),
        }));
        elements.push(json!({ "tag": "column_set", "columns": [ {
            "tag": "column",
            "elements": [
                callback_button("切换", json!({
                    "action": "project_select",
                    "project_id": project.id,
                })),
                callback_button("编辑", json!({
                    "action": "project_edit",
                    "project_id": project.id,
                })),
            ],
        } ] }));
    }
    if projects.is_empty() {
        elements.push(json!({ "tag": "markdown", "content": "_暂无项目，使用 /project new 创建_" }));
    }

    json!({
        "schema": "2.0",
        "header": { "title": { "tag": "plain_text", "content": "项目列表" } },
        "body": { "elements": elements },
    })
}

/// Project creation/edit form card.
#[must_use]
pub fn project_form_card(action: &str, project: Option<&Project>) -> Value {
    let (title, folder, description) = project.map_or(("", "", ""), |p| {
        (
            p.title.as_str(),
            p.folder_name.as_str(),
            p.description.as_deref().unwrap_or(""),
        )
    });
    let mut value = json!({ "action": action });
    if let Some(p) = project {
        value["project_id"] = Value::String(p.id.clone());
    }

    json!({
        "schema": "2.0",
        "header": { "title": { "tag": "plain_text", "content": "项目信息" } },
        "body": { "elements": [ {
            "tag": "form",
            "name": "project_form",
            "elements": [
                { "tag": "input", "name": "title", "required": true,
                  "default_value": title,
                  "label": { "tag": "plain_text", "content": "标题" } },
                { "tag": "input", "name": "folder_name", "required": true,
                  "default_value": folder,
                  "label": { "tag": "plain_text", "content": "文件夹名" } },
                { "tag": "input", "name": "description", "required": false,
                  "default_value": description,
                  "label": { "tag": "plain_text", "content": "描述" } },
                { "tag": "column_set", "columns": [ { "tag": "column", "elements": [
                    { "tag": "button", "name": "submit",
                      "text": { "tag": "plain_text", "content": "提交" },
                      "form_action_type": "submit", "type": "primary",
                      "behaviors": [ { "type": "callback", "value": value } ] },
                    { "tag": "button", "name": "cancel",
                      "text": { "tag": "plain_text", "content": "取消" },
                      "form_action_type": "reset",
                      "behaviors": [ { "type": "callback",
                        "value": { "action": "project_cancel" } } ] },
                ] } ] },
            ],
        } ] },
    })
}

/// Mode selection card.
#[must_use]
pub fn mode_list_card(session_id: &str, modes: &[ModeEntry], current: &str) -> Value {
    let elements: Vec<Value> = modes
        .iter()
        .map(|mode| {
            let marker = if mode.id == current { " ✔" } else { "" };
            json!({ "tag": "column_set", "columns": [ { "tag": "column", "elements": [
                callback_button(&format!("{}{marker}", mode.name), json!({
                    "action": "mode_select",
                    "session_id": session_id,
                    "mode_id": mode.id,
                })),
            ] } ] })
        })
        .collect();

    json!({
        "schema": "2.0",
        "header": { "title": { "tag": "plain_text", "content": "选择模式" } },
        "body": { "elements": elements },
    })
}

/// Model selection card.
#[must_use]
pub fn model_list_card(session_id: &str, models: &[ModelEntry], current: Option<&str>) -> Value {
    let elements: Vec<Value> = models
        .iter()
        .map(|model| {
            let marker = if Some(model.model_id.as_str()) == current { " ✔" } else { "" };
            json!({ "tag": "column_set", "columns": [ { "tag": "column", "elements": [
                callback_button(&format!("{}{marker}", model.name), json!({
                    "action": "model_select",
                    "session_id": session_id,
                    "model_id": model.model_id,
                })),
            ] } ] })
        })
        .collect();

    json!({
        "schema": "2.0",
        "header": { "title": { "tag": "plain_text", "content": "选择模型" } },
        "body": { "elements": elements },
    })
}

/// Config option overview card; each option opens a detail card.
#[must_use]
pub fn config_list_card(session_id: &str, options: &[ConfigOption]) -> Value {
    let mut elements = Vec::new();
    for option in options {
        let current = option.current_value.as_deref().unwrap_or("—");
        elements.push(json!({
            "tag": "markdown",
            "content": format!("**{}**: `{current}`", option.name),
        }));
        elements.push(json!({ "tag": "column_set", "columns": [ { "tag": "column", "elements": [
            callback_button("修改", json!({
                "action": "config_detail",
                "session_id": session_id,
                "config_id": option.id,
            })),
        ] } ] }));
    }
    if options.is_empty() {
        elements.push(json!({ "tag": "markdown", "content": "_该智能体未提供配置项_" }));
    }

    json!({
        "schema": "2.0",
        "header": { "title": { "tag": "plain_text", "content": "配置" } },
        "body": { "elements": elements },
    })
}

/// Value choices of one config option.
#[must_use]
pub fn config_detail_card(session_id: &str, option: &ConfigOption) -> Value {
    let elements: Vec<Value> = option
        .values
        .iter()
        .map(|value| {
            let marker = if option.current_value.as_deref() == Some(value.id.as_str()) {
                " ✔"
            } else {
                ""
            };
            json!({ "tag": "column_set", "columns": [ { "tag": "column", "elements": [
                callback_button(&format!("{}{marker}", value.name), json!({
                    "action": "config_select",
                    "session_id": session_id,
                    "config_id": option.id,
                    "config_value": value.id,
                })),
            ] } ] })
        })
        .collect();

    json!({
        "schema": "2.0",
        "header": { "title": { "tag": "plain_text", "content": option.name } },
        "body": { "elements": elements },
    })
}

/// Agent slash command list; selecting one runs it as a prompt.
#[must_use]
pub fn command_list_card(session_id: &str, commands: &[AgentCommand]) -> Value {
    let mut elements = Vec::new();
    for command in commands {
        let description = command.description.as_deref().unwrap_or("");
        elements.push(json!({
            "tag": "markdown",
            "content": format!("**/{}**\n{description}", command.name),
        }));
        elements.push(json!({ "tag": "column_set", "columns": [ { "tag": "column", "elements": [
            callback_button("运行", json!({
                "action": "command_select",
                "session_id": session_id,
                "command_name": command.name,
            })),
        ] } ] }));
    }
    if commands.is_empty() {
        elements.push(json!({ "tag": "markdown", "content": "_智能体未注册命令_" }));
    }

    json!({
        "schema": "2.0",
        "header": { "title": { "tag": "plain_text", "content": "智能体命令" } },
        "body": { "elements": elements },
    })
}

/// Plan snapshot card rendered by `/todo`.
#[must_use]
pub fn plan_card(entries: &[PlanEntry]) -> Value {
    let content = if entries.is_empty() {
        "_暂无计划_".to_owned()
    } else {
        entries
            .iter()
            .map(|entry| {
                let priority = match entry.priority {
                    crate::models::plan::PlanPriority::High => "high",
                    crate::models::plan::PlanPriority::Medium => "medium",
                    crate::models::plan::PlanPriority::Low => "low",
                };
                format!(
                    "{} {} <font color='grey'>({priority})</font>",
                    entry.status_glyph(),
                    entry.content,
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    json!({
        "schema": "2.0",
        "header": { "title": { "tag": "plain_text", "content": "任务计划" } },
        "body": { "elements": [ { "tag": "markdown", "content": content } ] },
    })
}

/// Session info card rendered by `/info`.
#[must_use]
pub fn info_card(
    session: &Session,
    model: Option<&str>,
    project_title: Option<&str>,
) -> Value {
    let status = match session.status {
        crate::models::session::SessionStatus::Idle => "idle",
        crate::models::session::SessionStatus::Running => "running",
    };
    let lines = [
        format!("**会话**: `{}`", session.id),
        format!("**目录**: `{}`", session.working_dir),
        format!("**模式**: `{}`", session.mode),
        format!("**模型**: `{}`", model.unwrap_or("—")),
        format!("**项目**: {}", project_title.unwrap_or("—")),
        format!("**状态**: {status}"),
    ];

    json!({
        "schema": "2.0",
        "header": { "title": { "tag": "plain_text", "content": "会话信息" } },
        "body": { "elements": [ { "tag": "markdown", "content": lines.join("\n") } ] },
    })
}
