//! ACP message types.
//!
//! Covers `initialize`, `session/new`, `session/load`, `session/prompt`,
//! `session/cancel`, the `session/set_*` configuration calls, the
//! `session/update` notification with all its discriminated variants, and
//! `session/request_permission`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::plan::{PlanEntry, PlanPriority, PlanStatus};

// ── Method names ─────────────────────────────────────────────────────────────

/// `initialize` request.
pub const METHOD_INITIALIZE: &str = "initialize";
/// `session/new` request.
pub const METHOD_SESSION_NEW: &str = "session/new";
/// `session/load` request (resume an existing agent session).
pub const METHOD_SESSION_LOAD: &str = "session/load";
/// `session/prompt` request.
pub const METHOD_SESSION_PROMPT: &str = "session/prompt";
/// `session/cancel` notification.
pub const METHOD_SESSION_CANCEL: &str = "session/cancel";
/// `session/set_mode` request.
pub const METHOD_SET_MODE: &str = "session/set_mode";
/// `session/set_model` request.
pub const METHOD_SET_MODEL: &str = "session/set_model";
/// `session/set_config_option` request.
pub const METHOD_SET_CONFIG_OPTION: &str = "session/set_config_option";
/// `session/update` inbound notification.
pub const METHOD_SESSION_UPDATE: &str = "session/update";
/// `session/request_permission` inbound call.
pub const METHOD_REQUEST_PERMISSION: &str = "session/request_permission";
/// Ext method listing locally registered tools.
pub const METHOD_TOOL_LIST: &str = "autocoder/tool/list";
/// Ext method invoking a locally registered tool.
pub const METHOD_TOOL_CALL: &str = "autocoder/tool/call";

/// Protocol version this client speaks.
pub const PROTOCOL_VERSION: u16 = 1;

// ── Handshake ────────────────────────────────────────────────────────────────

/// Client identity reported during `initialize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    /// Client name.
    pub name: String,
    /// Client version.
    pub version: String,
}

/// Parameters for the `initialize` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Client identity.
    pub client_info: ClientInfo,
    /// Highest protocol version the client understands.
    pub protocol_version: u16,
}

// ── Session lifecycle ────────────────────────────────────────────────────────

/// Parameters for the `session/new` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionNewParams {
    /// Working directory the agent operates in.
    pub cwd: String,
    /// MCP server descriptors passed through to the agent.
    pub mcp_servers: Vec<Value>,
    /// Optional opaque metadata.
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

/// Parameters for the `session/load` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionLoadParams {
    /// Agent-side session id to resume.
    pub session_id: String,
    /// Working directory the agent operates in.
    pub cwd: String,
}

/// Result returned after creating or loading a session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResult {
    /// Agent-side session id.
    pub session_id: String,
    /// Interaction modes the agent supports.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modes: Option<ModesInfo>,
    /// Models the agent can switch between.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub models: Option<ModelsInfo>,
    /// Agent-exposed configuration options.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub config_options: Vec<ConfigOption>,
}

/// Available interaction modes reported by the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModesInfo {
    /// All modes the agent offers.
    pub available_modes: Vec<ModeEntry>,
    /// Currently selected mode id.
    pub current_mode_id: String,
}

/// A single interaction mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModeEntry {
    /// Stable mode id (e.g. `default`, `bypassPermissions`).
    pub id: String,
    /// Display name.
    pub name: String,
    /// Optional description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Available models reported by the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelsInfo {
    /// All models the agent offers.
    pub available_models: Vec<ModelEntry>,
    /// Currently selected model id.
    pub current_model_id: String,
}

/// A single model the agent can use.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelEntry {
    /// Stable model id.
    pub model_id: String,
    /// Display name.
    pub name: String,
    /// Optional description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// An agent-exposed configuration option with its value choices.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigOption {
    /// Stable option id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Currently selected value id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_value: Option<String>,
    /// Possible values.
    #[serde(default)]
    pub values: Vec<ConfigValue>,
}

/// One selectable value of a [`ConfigOption`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigValue {
    /// Stable value id.
    pub id: String,
    /// Display name.
    pub name: String,
}

// ── Prompting ────────────────────────────────────────────────────────────────

/// One block of prompt content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text.
    Text {
        /// The text payload.
        text: String,
    },
}

/// Parameters for the `session/prompt` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPromptParams {
    /// Agent-side session id.
    pub session_id: String,
    /// Prompt content blocks.
    pub prompt: Vec<ContentBlock>,
}

/// Result returned after a prompt completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPromptResult {
    /// Why the turn ended: `end_turn`, `cancelled`, `refusal`, …
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
}

/// Parameters for the `session/cancel` notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCancelParams {
    /// Agent-side session id.
    pub session_id: String,
}

/// Parameters for `session/set_mode`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetModeParams {
    /// Agent-side session id.
    pub session_id: String,
    /// Mode id to switch to.
    pub mode_id: String,
}

/// Parameters for `session/set_model`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetModelParams {
    /// Agent-side session id.
    pub session_id: String,
    /// Model id to switch to.
    pub model_id: String,
}

/// Parameters for `session/set_config_option`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetConfigOptionParams {
    /// Agent-side session id.
    pub session_id: String,
    /// Option id being set.
    pub config_id: String,
    /// Selected value id.
    pub value: String,
}

// ── Session updates ──────────────────────────────────────────────────────────

/// Parameters for the `session/update` notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUpdateParams {
    /// Agent-side session id the update belongs to.
    pub session_id: String,
    /// The raw update payload, discriminated by its `sessionUpdate` field.
    pub update: Value,
}

/// A parsed session update. Not serde-derived: the nested `sessionUpdate`
/// discriminator requires manual dispatch.
#[derive(Debug, Clone)]
pub enum SessionUpdate {
    /// A chunk of the agent's response text.
    AgentMessageChunk {
        /// Text fragment.
        text: String,
    },
    /// A chunk of the agent's internal reasoning.
    AgentThoughtChunk {
        /// Text fragment.
        text: String,
    },
    /// A new tool call.
    ToolCall(ToolCallInfo),
    /// An incremental update to an existing tool call.
    ToolCallUpdate(ToolCallUpdateInfo),
    /// The agent's current plan snapshot.
    Plan(Vec<PlanEntry>),
    /// The agent switched interaction mode.
    CurrentModeUpdate {
        /// New mode id.
        mode_id: String,
    },
    /// Updated list of agent-recognized slash commands.
    AvailableCommandsUpdate(Vec<AgentCommand>),
    /// Updated configuration options.
    ConfigOptionUpdate(Vec<ConfigOption>),
    /// Updated session metadata.
    SessionInfoUpdate {
        /// New session title.
        title: Option<String>,
    },
    /// Unrecognized update type, preserved as raw JSON.
    Unknown(Value),
}

impl SessionUpdate {
    /// Parse a session update from its raw JSON [`Value`].
    ///
    /// The value is expected to carry a `"sessionUpdate"` string field that
    /// acts as a type discriminator; anything else becomes
    /// [`SessionUpdate::Unknown`].
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        let update_type = value
            .get("sessionUpdate")
            .and_then(Value::as_str)
            .unwrap_or("");

        match update_type {
            "agent_message_chunk" => Self::AgentMessageChunk {
                text: chunk_text(value),
            },
            "agent_thought_chunk" => Self::AgentThoughtChunk {
                text: chunk_text(value),
            },
            "tool_call" => Self::ToolCall(ToolCallInfo {
                tool_call_id: str_field(value, "toolCallId"),
                title: str_field(value, "title"),
                kind: str_field(value, "kind"),
                status: str_field(value, "status"),
                raw_input: value.get("rawInput").cloned(),
            }),
            "tool_call_update" => Self::ToolCallUpdate(ToolCallUpdateInfo {
                tool_call_id: str_field(value, "toolCallId"),
                status: value
                    .get("status")
                    .and_then(Value::as_str)
                    .map(str::to_owned),
                title: value
                    .get("title")
                    .and_then(Value::as_str)
                    .map(str::to_owned),
            }),
            "plan" => Self::Plan(parse_plan_entries(value)),
            "current_mode_update" => Self::CurrentModeUpdate {
                mode_id: str_field(value, "currentModeId"),
            },
            "available_commands_update" => {
                let commands = value
                    .get("availableCommands")
                    .or_else(|| value.get("commands"))
                    .and_then(Value::as_array)
                    .map(|arr| {
                        arr.iter()
                            .map(|cmd| AgentCommand {
                                name: str_field(cmd, "name"),
                                description: cmd
                                    .get("description")
                                    .and_then(Value::as_str)
                                    .map(str::to_owned),
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                Self::AvailableCommandsUpdate(commands)
            }
            "config_option_update" => {
                let options = value
                    .get("configOptions")
                    .and_then(Value::as_array)
                    .map(|arr| {
                        arr.iter()
                            .filter_map(|opt| {
                                serde_json::from_value::<ConfigOption>(opt.clone()).ok()
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                Self::ConfigOptionUpdate(options)
            }
            "session_info_update" => Self::SessionInfoUpdate {
                title: value
                    .get("title")
                    .and_then(Value::as_str)
                    .map(str::to_owned),
            },
            _ => Self::Unknown(value.clone()),
        }
    }
}

fn chunk_text(value: &Value) -> String {
    value
        .get("content")
        .and_then(|c| c.get("text"))
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_owned()
}

fn str_field(value: &Value, field: &str) -> String {
    value
        .get(field)
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_owned()
}

fn parse_plan_entries(value: &Value) -> Vec<PlanEntry> {
    value
        .get("entries")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .map(|entry| PlanEntry {
                    content: str_field(entry, "content"),
                    priority: match entry.get("priority").and_then(Value::as_str) {
                        Some("high") => PlanPriority::High,
                        Some("low") => PlanPriority::Low,
                        _ => PlanPriority::Medium,
                    },
                    status: match entry.get("status").and_then(Value::as_str) {
                        Some("in_progress") => PlanStatus::InProgress,
                        Some("completed") => PlanStatus::Completed,
                        _ => PlanStatus::Pending,
                    },
                })
                .collect()
        })
        .unwrap_or_default()
}

/// A slash command the agent recognizes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCommand {
    /// Command name, without the leading slash.
    pub name: String,
    /// Optional description shown in the `/command` card.
    pub description: Option<String>,
}

/// Information about a tool call initiated by the agent.
#[derive(Debug, Clone)]
pub struct ToolCallInfo {
    /// Agent-assigned tool call id.
    pub tool_call_id: String,
    /// Display title.
    pub title: String,
    /// Tool kind: `read`, `search`, `execute`, `edit`, …
    pub kind: String,
    /// Current status: `pending`, `in_progress`, `completed`, `failed`.
    pub status: String,
    /// Raw tool input, used to derive a display label.
    pub raw_input: Option<Value>,
}

/// An incremental update to an in-progress tool call.
#[derive(Debug, Clone)]
pub struct ToolCallUpdateInfo {
    /// Agent-assigned tool call id.
    pub tool_call_id: String,
    /// New status, if reported.
    pub status: Option<String>,
    /// New title, if reported.
    pub title: Option<String>,
}

// ── Permissions ──────────────────────────────────────────────────────────────

/// Parameters of an inbound `session/request_permission` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPermissionParams {
    /// Agent-side session id.
    pub session_id: String,
    /// The tool call awaiting permission, as raw JSON.
    pub tool_call: Value,
    /// Choices offered to the user.
    pub options: Vec<PermissionOption>,
}

/// One permission choice.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionOption {
    /// Stable option id echoed back in the outcome.
    pub option_id: String,
    /// Display name.
    pub name: String,
    /// Option kind hint: `allow_once`, `allow_always`, `reject_once`, …
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// Outcome of a permission request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum PermissionOutcome {
    /// The user picked an option.
    #[serde(rename = "selected")]
    Selected {
        /// The chosen option id.
        #[serde(rename = "optionId")]
        option_id: String,
    },
    /// The request timed out or was cancelled.
    #[serde(rename = "cancelled")]
    Cancelled,
}
