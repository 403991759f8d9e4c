//! Thread-to-session resolution.
//!
//! An inbound message maps to a session by, in order: its reply-root
//! thread, the chat's active project recency, then chat-wide recency.

use crate::lark::events::MessageEvent;
use crate::models::session::Session;
use crate::orchestrator::Orchestrator;
use crate::Result;

impl Orchestrator {
    /// Pick the session an inbound message belongs to.
    ///
    /// Returns `Ok(None)` when no session exists yet; the caller decides
    /// whether to create one.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if a lookup fails.
    pub(crate) async fn resolve_session_for_message(
        &self,
        message: &MessageEvent,
    ) -> Result<Option<Session>> {
        // 1. A reply targets the session bound to its thread; a reply into
        //    an unbound thread starts a fresh session there.
        if let Some(ref root_id) = message.root_id {
            return self.sessions.find_by_thread(root_id).await;
        }

        // 2. Top-level message: prefer the active project's most recent
        //    session, then the chat's.
        let project_id = self
            .active_projects
            .lock()
            .await
            .get(&message.chat_id)
            .cloned();
        if let Some(project_id) = project_id {
            if let Some(session) = self.sessions.find_latest_in_project(&project_id).await? {
                return Ok(Some(session));
            }
        }

        self.sessions.find_latest_in_chat(&message.chat_id).await
    }
}
