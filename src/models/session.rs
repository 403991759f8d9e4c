//! Session model and lifecycle helpers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status for an agent session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// No prompt is in flight.
    Idle,
    /// An ACP prompt is outstanding for this session.
    Running,
}

/// Session domain entity persisted in `SQLite`.
///
/// A session binds one IM thread to one ACP agent conversation. The
/// `thread_id` is the reply-root of the conversation, or the originating
/// message id when the message has no reply-root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Session {
    /// Unique record identifier.
    pub id: String,
    /// IM conversation the session lives in.
    pub chat_id: String,
    /// Reply-root binding the session to one thread.
    pub thread_id: String,
    /// Open ID of the user who started the session.
    pub creator_id: String,
    /// Current lifecycle status.
    pub status: SessionStatus,
    /// First prompt sent to the agent; shown in session lists.
    pub initial_prompt: String,
    /// Agent-side session id; set after the first `session/new`.
    pub acp_session_id: Option<String>,
    /// Absolute working directory the agent runs in.
    pub working_dir: String,
    /// Optional Lark document bound to the session for doc tools.
    pub doc_token: Option<String>,
    /// IM message whose card is currently streaming, if any.
    pub working_message_id: Option<String>,
    /// Current ACP mode id.
    pub mode: String,
    /// Owning project, if the session runs inside one.
    pub project_id: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last activity timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Construct a new idle session with a generated identifier.
    #[must_use]
    pub fn new(
        chat_id: String,
        thread_id: String,
        creator_id: String,
        initial_prompt: String,
        working_dir: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            chat_id,
            thread_id,
            creator_id,
            status: SessionStatus::Idle,
            initial_prompt,
            acp_session_id: None,
            working_dir,
            doc_token: None,
            working_message_id: None,
            mode: "default".to_owned(),
            project_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Determine whether a lifecycle transition is permitted.
    ///
    /// Only `idle → running` and `running → idle` are legal.
    #[must_use]
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        matches!(
            (self.status, next),
            (SessionStatus::Idle, SessionStatus::Running)
                | (SessionStatus::Running, SessionStatus::Idle)
        )
    }

    /// Short prefix of the initial prompt used in card labels.
    #[must_use]
    pub fn prompt_prefix(&self) -> String {
        let mut prefix: String = self.initial_prompt.chars().take(30).collect();
        if self.initial_prompt.chars().count() > 30 {
            prefix.push('…');
        }
        prefix
    }
}
