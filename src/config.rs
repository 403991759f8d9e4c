//! Global configuration parsing and validation.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{AppError, Result};

/// Nested Lark application credentials and webhook settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct LarkConfig {
    /// Application ID issued by the Lark developer console.
    pub app_id: String,
    /// Application secret used to mint tenant access tokens.
    pub app_secret: String,
    /// Bind address for the inbound event webhook.
    #[serde(default = "default_webhook_addr")]
    pub webhook_addr: String,
    /// Open API base URL; overridable for the Feishu (CN) endpoint.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Verification token echoed in `url_verification` challenges.
    #[serde(default)]
    pub verification_token: String,
}

fn default_webhook_addr() -> String {
    "0.0.0.0:9470".to_owned()
}

fn default_api_base() -> String {
    "https://open.larksuite.com".to_owned()
}

/// Agent subprocess launch settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AgentConfig {
    /// Agent CLI binary (e.g., `claude-code-acp`).
    pub command: String,
    /// Arguments passed to the agent binary.
    #[serde(default)]
    pub args: Vec<String>,
    /// Optional SSE endpoint template; when set the agent is reached over
    /// HTTP instead of stdio. `{session_id}` is substituted per session.
    #[serde(default)]
    pub sse_url: Option<String>,
    /// Paired send URL template for SSE writes.
    #[serde(default)]
    pub sse_send_url: Option<String>,
    /// Milliseconds without SSE bytes before the reader reconnects.
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,
    /// Maximum SSE reconnect attempts; `None` retries forever.
    #[serde(default)]
    pub max_retries: Option<u32>,
}

fn default_heartbeat_timeout_ms() -> u64 {
    60_000
}

/// Streaming card tuning knobs.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct StreamConfig {
    /// Delay between the first unflushed byte and the card patch.
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    /// Maximum bytes of content a single card will carry.
    #[serde(default = "default_max_content_length")]
    pub max_content_length: usize,
    /// Idle window after which IM considers streaming mode closed.
    #[serde(default = "default_auto_close_ms")]
    pub auto_close_ms: u64,
}

fn default_flush_interval_ms() -> u64 {
    150
}

fn default_max_content_length() -> usize {
    100 * 1024
}

fn default_auto_close_ms() -> u64 {
    10 * 60 * 1000
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: default_flush_interval_ms(),
            max_content_length: default_max_content_length(),
            auto_close_ms: default_auto_close_ms(),
        }
    }
}

/// Configurable timeout values (seconds) for blocking flows.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TimeoutConfig {
    /// Permission card timeout before the request resolves as cancelled.
    #[serde(default = "default_permission_seconds")]
    pub permission_seconds: u64,
    /// Foreground shell command timeout.
    #[serde(default = "default_shell_seconds")]
    pub shell_seconds: u64,
    /// Age after which processed-event rows are pruned.
    #[serde(default = "default_event_max_age_seconds")]
    pub event_max_age_seconds: u64,
}

fn default_permission_seconds() -> u64 {
    5 * 60
}

fn default_shell_seconds() -> u64 {
    5 * 60
}

fn default_event_max_age_seconds() -> u64 {
    60 * 60
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            permission_seconds: default_permission_seconds(),
            shell_seconds: default_shell_seconds(),
            event_max_age_seconds: default_event_max_age_seconds(),
        }
    }
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Base working directory; sessions without a project run here, and
    /// project folders are created beneath it.
    pub base_working_dir: PathBuf,
    /// Path to the `SQLite` database file.
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    /// Lark application settings.
    pub lark: LarkConfig,
    /// Agent subprocess settings.
    pub agent: AgentConfig,
    /// Streaming card tuning.
    #[serde(default)]
    pub stream: StreamConfig,
    /// Timeout settings.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// Prompt command templates, e.g. `refactor = "Refactor {args} ..."`.
    /// `{args}` is replaced with the command's argument text.
    #[serde(default)]
    pub prompt_commands: BTreeMap<String, String>,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and normalize paths.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Path to the `SQLite` database file, derived from the base dir when
    /// not set explicitly.
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| self.base_working_dir.join(".lark-agent-gateway").join("gateway.db"))
    }

    fn validate(&mut self) -> Result<()> {
        if self.lark.app_id.is_empty() || self.lark.app_secret.is_empty() {
            return Err(AppError::Config(
                "lark.app_id and lark.app_secret must be set".into(),
            ));
        }

        if self.agent.command.is_empty() && self.agent.sse_url.is_none() {
            return Err(AppError::Config(
                "agent.command must be set unless agent.sse_url is configured".into(),
            ));
        }

        if self.agent.sse_url.is_some() != self.agent.sse_send_url.is_some() {
            return Err(AppError::Config(
                "agent.sse_url and agent.sse_send_url must be set together".into(),
            ));
        }

        if self.stream.flush_interval_ms == 0 {
            return Err(AppError::Config(
                "stream.flush_interval_ms must be greater than zero".into(),
            ));
        }

        fs::create_dir_all(&self.base_working_dir)
            .map_err(|err| AppError::Config(format!("base_working_dir invalid: {err}")))?;
        let canonical = self
            .base_working_dir
            .canonicalize()
            .map_err(|err| AppError::Config(format!("base_working_dir invalid: {err}")))?;
        self.base_working_dir = canonical;

        Ok(())
    }
}

/// Commented configuration template written by `--init`.
pub const CONFIG_TEMPLATE: &str = r#"# lark-agent-gateway configuration

# Directory where sessions run; project folders are created beneath it.
base_working_dir = "~/agent-workspaces"

# Optional explicit database path. Defaults to
# <base_working_dir>/.lark-agent-gateway/gateway.db
# db_path = "/var/lib/lark-agent-gateway/gateway.db"

[lark]
app_id = "cli_xxxxxxxxxxxx"
app_secret = "xxxxxxxxxxxxxxxx"
# Address the event webhook listens on.
webhook_addr = "0.0.0.0:9470"
# Use https://open.feishu.cn for Feishu tenants.
api_base = "https://open.larksuite.com"
verification_token = ""

[agent]
command = "claude-code-acp"
args = []
# Reach the agent over HTTP SSE instead of stdio:
# sse_url = "https://agent.example.com/sessions/{session_id}/events"
# sse_send_url = "https://agent.example.com/sessions/{session_id}/send"

[stream]
flush_interval_ms = 150
max_content_length = 102400
auto_close_ms = 600000

[timeouts]
permission_seconds = 300
shell_seconds = 300
event_max_age_seconds = 3600

[prompt_commands]
# refactor = "Refactor the following target, keeping behavior identical: {args}"
"#;
