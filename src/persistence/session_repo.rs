//! Session repository for `SQLite` persistence.

use std::sync::Arc;

use chrono::Utc;

use crate::models::session::{Session, SessionStatus};
use crate::{AppError, Result};

use super::db::Database;

/// Repository wrapper around `SQLite` for session records.
#[derive(Clone)]
pub struct SessionRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct SessionRow {
    id: String,
    chat_id: String,
    thread_id: String,
    creator_id: String,
    status: String,
    initial_prompt: String,
    acp_session_id: Option<String>,
    working_dir: String,
    doc_token: Option<String>,
    working_message_id: Option<String>,
    mode: String,
    project_id: Option<String>,
    created_at: String,
    updated_at: String,
}

impl SessionRow {
    /// Convert a database row into the domain model.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if enum or timestamp parsing fails.
    fn into_session(self) -> Result<Session> {
        let status = parse_status(&self.status)?;
        let created_at = chrono::DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| AppError::Db(format!("invalid created_at: {e}")))?
            .with_timezone(&Utc);
        let updated_at = chrono::DateTime::parse_from_rfc3339(&self.updated_at)
            .map_err(|e| AppError::Db(format!("invalid updated_at: {e}")))?
            .with_timezone(&Utc);

        Ok(Session {
            id: self.id,
            chat_id: self.chat_id,
            thread_id: self.thread_id,
            creator_id: self.creator_id,
            status,
            initial_prompt: self.initial_prompt,
            acp_session_id: self.acp_session_id,
            working_dir: self.working_dir,
            doc_token: self.doc_token,
            working_message_id: self.working_message_id,
            mode: self.mode,
            project_id: self.project_id,
            created_at,
            updated_at,
        })
    }
}

/// Parse a status string into the domain enum.
fn parse_status(s: &str) -> Result<SessionStatus> {
    match s {
        "idle" => Ok(SessionStatus::Idle),
        "running" => Ok(SessionStatus::Running),
        other => Err(AppError::Db(format!("invalid session status: {other}"))),
    }
}

/// Serialize a status enum to its database string.
fn status_str(s: SessionStatus) -> &'static str {
    match s {
        SessionStatus::Idle => "idle",
        SessionStatus::Running => "running",
    }
}

impl SessionRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a new session record.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the database insert fails.
    pub async fn create(&self, session: &Session) -> Result<Session> {
        let status = status_str(session.status);
        let created_at = session.created_at.to_rfc3339();
        let updated_at = session.updated_at.to_rfc3339();

        sqlx::query(
            "INSERT INTO sessions (id, chat_id, thread_id, creator_id, status, initial_prompt,
             acp_session_id, working_dir, doc_token, working_message_id, mode, project_id,
             created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        )
        .bind(&session.id)
        .bind(&session.chat_id)
        .bind(&session.thread_id)
        .bind(&session.creator_id)
        .bind(status)
        .bind(&session.initial_prompt)
        .bind(&session.acp_session_id)
        .bind(&session.working_dir)
        .bind(&session.doc_token)
        .bind(&session.working_message_id)
        .bind(&session.mode)
        .bind(&session.project_id)
        .bind(&created_at)
        .bind(&updated_at)
        .execute(self.db.as_ref())
        .await?;

        Ok(session.clone())
    }

    /// Retrieve a session by identifier.
    ///
    /// Returns `Ok(None)` if the session does not exist.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<Session>> {
        let row: Option<SessionRow> = sqlx::query_as("SELECT * FROM sessions WHERE id = ?1")
            .bind(id)
            .fetch_optional(self.db.as_ref())
            .await?;

        row.map(SessionRow::into_session).transpose()
    }

    /// Find the most recent session bound to a thread.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn find_by_thread(&self, thread_id: &str) -> Result<Option<Session>> {
        let row: Option<SessionRow> = sqlx::query_as(
            "SELECT * FROM sessions WHERE thread_id = ?1 ORDER BY updated_at DESC LIMIT 1",
        )
        .bind(thread_id)
        .fetch_optional(self.db.as_ref())
        .await?;

        row.map(SessionRow::into_session).transpose()
    }

    /// Find the most recently touched session in a chat.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn find_latest_in_chat(&self, chat_id: &str) -> Result<Option<Session>> {
        let row: Option<SessionRow> = sqlx::query_as(
            "SELECT * FROM sessions WHERE chat_id = ?1 ORDER BY updated_at DESC LIMIT 1",
        )
        .bind(chat_id)
        .fetch_optional(self.db.as_ref())
        .await?;

        row.map(SessionRow::into_session).transpose()
    }

    /// Find the most recently touched session in a project.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn find_latest_in_project(&self, project_id: &str) -> Result<Option<Session>> {
        let row: Option<SessionRow> = sqlx::query_as(
            "SELECT * FROM sessions WHERE project_id = ?1 ORDER BY updated_at DESC LIMIT 1",
        )
        .bind(project_id)
        .fetch_optional(self.db.as_ref())
        .await?;

        row.map(SessionRow::into_session).transpose()
    }

    /// List all sessions in a chat, most recently touched first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_by_chat(&self, chat_id: &str) -> Result<Vec<Session>> {
        let rows: Vec<SessionRow> = sqlx::query_as(
            "SELECT * FROM sessions WHERE chat_id = ?1 ORDER BY updated_at DESC",
        )
        .bind(chat_id)
        .fetch_all(self.db.as_ref())
        .await?;

        rows.into_iter().map(SessionRow::into_session).collect()
    }

    /// List all sessions in a project, most recently touched first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_by_project(&self, project_id: &str) -> Result<Vec<Session>> {
        let rows: Vec<SessionRow> = sqlx::query_as(
            "SELECT * FROM sessions WHERE project_id = ?1 ORDER BY updated_at DESC",
        )
        .bind(project_id)
        .fetch_all(self.db.as_ref())
        .await?;

        rows.into_iter().map(SessionRow::into_session).collect()
    }

    /// Update session status and `updated_at` timestamp.
    ///
    /// Validates the `idle ↔ running` transition before applying the
    /// update. Returns the updated session entity.
    ///
    /// # Errors
    ///
    /// Returns `AppError::SessionState` if the transition is invalid and
    /// `AppError::SessionNotFound` if the session does not exist.
    pub async fn update_status(&self, id: &str, status: SessionStatus) -> Result<Session> {
        let current = self
            .get_by_id(id)
            .await?
            .ok_or_else(|| AppError::SessionNotFound(format!("session {id} not found")))?;

        if !current.can_transition_to(status) {
            return Err(AppError::SessionState(format!(
                "invalid status transition: {} -> {}",
                status_str(current.status),
                status_str(status)
            )));
        }

        let now = Utc::now().to_rfc3339();
        let status_s = status_str(status);

        sqlx::query("UPDATE sessions SET status = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(status_s)
            .bind(&now)
            .bind(id)
            .execute(self.db.as_ref())
            .await?;

        self.get_by_id(id)
            .await?
            .ok_or_else(|| AppError::SessionNotFound(format!("session {id} not found after update")))
    }

    /// Store the agent-side session id after `session/new` succeeds.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn set_acp_session_id(&self, id: &str, acp_session_id: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();

        sqlx::query("UPDATE sessions SET acp_session_id = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(acp_session_id)
            .bind(&now)
            .bind(id)
            .execute(self.db.as_ref())
            .await?;

        Ok(())
    }

    /// Update the ACP mode recorded for a session.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn update_mode(&self, id: &str, mode: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();

        sqlx::query("UPDATE sessions SET mode = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(mode)
            .bind(&now)
            .bind(id)
            .execute(self.db.as_ref())
            .await?;

        Ok(())
    }

    /// Set or clear the IM message id whose card is currently streaming.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn set_working_message_id(&self, id: &str, message_id: Option<&str>) -> Result<()> {
        let now = Utc::now().to_rfc3339();

        sqlx::query("UPDATE sessions SET working_message_id = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(message_id)
            .bind(&now)
            .bind(id)
            .execute(self.db.as_ref())
            .await?;

        Ok(())
    }

    /// Bind or unbind a session to a project and update its working dir.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn set_project(
        &self,
        id: &str,
        project_id: Option<&str>,
        working_dir: &str,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "UPDATE sessions SET project_id = ?1, working_dir = ?2, updated_at = ?3 WHERE id = ?4",
        )
        .bind(project_id)
        .bind(working_dir)
        .bind(&now)
        .bind(id)
        .execute(self.db.as_ref())
        .await?;

        Ok(())
    }

    /// Update the display title (stored as the initial prompt).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn update_title(&self, id: &str, title: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();

        sqlx::query("UPDATE sessions SET initial_prompt = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(title)
            .bind(&now)
            .bind(id)
            .execute(self.db.as_ref())
            .await?;

        Ok(())
    }

    /// Bump the `updated_at` timestamp.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn touch(&self, id: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();

        sqlx::query("UPDATE sessions SET updated_at = ?1 WHERE id = ?2")
            .bind(&now)
            .bind(id)
            .execute(self.db.as_ref())
            .await?;

        Ok(())
    }

    /// Delete a session row.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the delete fails.
    pub async fn delete(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM sessions WHERE id = ?1")
            .bind(id)
            .execute(self.db.as_ref())
            .await?;

        Ok(())
    }
}
