//! Streaming card management.
//!
//! Owns the per-session "working" card: creation, throttled text flushes,
//! placeholder replacement, tool-call element insertion, auto-reopen after
//! long idles, and the close protocol.
//!
//! Invariants:
//! - every patch carries a sequence allocated under the session lock —
//!   sequences are per-card and strictly increasing;
//! - flushes are throttled to one per `flush_interval`; a scheduled timer
//!   is invalidated by bumping `flush_generation` before a forced flush;
//! - card content is clamped to `max_content_length`, dropping the tail.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::StreamConfig;
use crate::lark::cards;
use crate::lark::client::{InsertPosition, LarkApi};
use crate::orchestrator::active::{ActiveSession, StreamingCard, ToolCallElement};
use crate::Result;

/// Summary shown while a permission card is waiting, when no text exists.
pub const WAITING_FOR_PERMISSION: &str = "(等待授权)";
/// Summary shown when pausing for a generic interaction with no text.
pub const WAITING_FOR_INTERACTION: &str = "(等待操作)";

/// Allocate the next per-card sequence; callers hold the session lock.
fn alloc_seq(sequences: &mut HashMap<String, u64>, card_id: &str) -> u64 {
    ActiveSession::alloc_sequence(sequences, card_id)
}

/// Shared streaming card manager; one instance serves every session.
pub struct StreamManager {
    lark: Arc<dyn LarkApi>,
    config: StreamConfig,
}

impl StreamManager {
    /// Create a manager over the IM client.
    #[must_use]
    pub fn new(lark: Arc<dyn LarkApi>, config: StreamConfig) -> Self {
        Self { lark, config }
    }

    /// Ensure the session has an open streaming card, creating one as a
    /// reply to `reply_to_message_id` if needed. Returns the card's
    /// message id when a card was newly created.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Lark` if card creation fails.
    pub async fn ensure_card(
        &self,
        session: &mut ActiveSession,
        reply_to_message_id: &str,
    ) -> Result<Option<String>> {
        if session.streaming_card.is_some() {
            return Ok(None);
        }

        let card_json = cards::streaming_card("");
        let card_id = self.lark.create_card_entity(&card_json).await?;
        let message_id = self
            .lark
            .reply_card_entity(reply_to_message_id, &card_id)
            .await?;

        debug!(
            session_id = %session.session_id,
            %card_id, %message_id, "streaming card created"
        );
        session.streaming_card = Some(StreamingCard::new(card_id, message_id.clone()));
        Ok(Some(message_id))
    }

    /// Append text to the card and schedule a throttled flush.
    ///
    /// Caller holds the session lock (`session` is borrowed from inside
    /// `handle`); the armed timer re-acquires it when it fires.
    pub fn append_text(
        self: &Arc<Self>,
        handle: &Arc<Mutex<ActiveSession>>,
        session: &mut ActiveSession,
        text: &str,
    ) {
        let max_len = self.config.max_content_length;
        let Some(card) = session.streaming_card.as_mut() else {
            return;
        };

        if card.accumulated_text.len() < max_len {
            let room = max_len - card.accumulated_text.len();
            let mut take = room.min(text.len());
            // Do not split a UTF-8 code point at the cap.
            while take < text.len() && !text.is_char_boundary(take) {
                take -= 1;
            }
            card.accumulated_text.push_str(&text[..take]);
        }

        if card.flush_scheduled {
            return;
        }
        card.flush_scheduled = true;
        let generation = card.flush_generation;

        let manager = Arc::clone(self);
        let handle = Arc::clone(handle);
        let delay = Duration::from_millis(self.config.flush_interval_ms);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut session = handle.lock().await;
            let still_armed = session
                .streaming_card
                .as_ref()
                .is_some_and(|card| card.flush_scheduled && card.flush_generation == generation);
            if still_armed {
                if let Err(err) = manager.flush(&mut session).await {
                    warn!(%err, "scheduled card flush failed");
                }
            }
        });
    }

    /// Flush accumulated text to the active element.
    ///
    /// No-op when nothing changed since the last flush. Creates the active
    /// element on first use, replacing the greyed placeholder in place.
    /// Cancels any armed timer, so it doubles as the forced flush.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Lark` if a card patch fails. Allocated sequences
    /// stay consumed, so a later flush still lands.
    pub async fn flush(&self, session: &mut ActiveSession) -> Result<()> {
        {
            let Some(card) = session.streaming_card.as_mut() else {
                return Ok(());
            };
            card.flush_scheduled = false;
            card.flush_generation += 1;
            if card.accumulated_text == card.last_flushed_text {
                return Ok(());
            }
        }

        self.reopen_if_needed(session).await?;

        let state = &mut *session;
        let Some(card) = state.streaming_card.as_mut() else {
            return Ok(());
        };
        let sequences = &mut state.card_sequences;
        let card_id = card.card_id.clone();
        let content = card.accumulated_text[card.element_start..].to_owned();

        let element_id = if let Some(ref id) = card.active_element_id {
            id.clone()
        } else if card.placeholder_replaced {
            // A tool call finalized the previous element; open a new one.
            let id = card.next_markdown_id();
            card.active_element_id = Some(id.clone());
            let element = cards::markdown_element(&id, "");
            let seq = alloc_seq(sequences, &card_id);
            self.lark
                .add_card_elements(
                    &card_id,
                    InsertPosition::InsertBefore,
                    Some(cards::PROCESSING_ELEMENT_ID),
                    &[element],
                    seq,
                )
                .await?;
            id
        } else {
            // First flush: replace the greyed placeholder in place.
            card.placeholder_replaced = true;
            card.active_element_id = Some(cards::PLACEHOLDER_ELEMENT_ID.to_owned());
            cards::PLACEHOLDER_ELEMENT_ID.to_owned()
        };

        let seq = alloc_seq(sequences, &card_id);
        self.lark
            .stream_card_text(&card_id, &element_id, &content, seq)
            .await?;

        card.last_flushed_text = card.accumulated_text.clone();
        card.last_flush_at = std::time::Instant::now();
        Ok(())
    }

    /// Insert a tool-call element before the processing indicator,
    /// finalizing the active text element.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Lark` if the card patch fails.
    pub async fn insert_tool_element(
        &self,
        session: &mut ActiveSession,
        tool_call_id: &str,
        kind: &str,
        status: &str,
        title: &str,
        label: &str,
    ) -> Result<()> {
        self.flush(session).await?;
        self.reopen_if_needed(session).await?;

        let state = &mut *session;
        let Some(card) = state.streaming_card.as_mut() else {
            return Ok(());
        };
        let sequences = &mut state.card_sequences;
        let card_id = card.card_id.clone();

        if !card.placeholder_replaced {
            // First child is a tool call: the placeholder is deleted, not
            // replaced.
            card.placeholder_replaced = true;
            let seq = alloc_seq(sequences, &card_id);
            self.lark
                .delete_card_element(&card_id, cards::PLACEHOLDER_ELEMENT_ID, seq)
                .await?;
        }

        card.active_element_id = None;
        card.mark_element_boundary();
        let element_id = card.next_tool_id();

        let element = cards::tool_call_element(&element_id, kind, status, title, label, None);
        let seq = alloc_seq(sequences, &card_id);
        self.lark
            .add_card_elements(
                &card_id,
                InsertPosition::InsertBefore,
                Some(cards::PROCESSING_ELEMENT_ID),
                &[element],
                seq,
            )
            .await?;

        state.tool_call_elements.insert(
            tool_call_id.to_owned(),
            ToolCallElement {
                element_id,
                card_id,
                kind: kind.to_owned(),
                label: label.to_owned(),
                title: title.to_owned(),
                started_at: std::time::Instant::now(),
            },
        );
        Ok(())
    }

    /// Patch a tracked tool element in place.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Lark` if the card patch fails.
    pub async fn patch_tool_element(
        &self,
        session: &mut ActiveSession,
        tool_call_id: &str,
        status: &str,
        title: Option<&str>,
    ) -> Result<()> {
        let Some(tracked) = session.tool_call_elements.get(tool_call_id).cloned() else {
            return Ok(());
        };

        let duration = if matches!(status, "completed" | "failed") {
            Some(tracked.started_at.elapsed().as_secs())
        } else {
            None
        };

        let element = cards::tool_call_element(
            &tracked.element_id,
            &tracked.kind,
            status,
            title.unwrap_or(&tracked.title),
            &tracked.label,
            duration,
        );
        let seq = alloc_seq(&mut session.card_sequences, &tracked.card_id);
        self.lark
            .patch_card_element(&tracked.card_id, &tracked.element_id, &element, seq)
            .await
    }

    /// Pause the card for a permission prompt: force-flush and close
    /// streaming mode with a short summary.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Lark` if the settings patch fails.
    pub async fn pause(&self, session: &mut ActiveSession, empty_summary: &str) -> Result<()> {
        if let Err(err) = self.flush(session).await {
            warn!(%err, "flush before pause failed");
        }

        let state = &mut *session;
        let Some(card) = state.streaming_card.as_mut() else {
            return Ok(());
        };
        let summary = pause_summary(&card.accumulated_text, empty_summary);
        card.streaming_open = false;
        let card_id = card.card_id.clone();

        let settings = cards::streaming_settings(false, &summary);
        let seq = alloc_seq(&mut state.card_sequences, &card_id);
        self.lark
            .update_card_settings(&card_id, &settings, seq)
            .await
    }

    /// Close the card: replace the processing indicator with a duration
    /// marker, leave streaming mode with a summary, and release the card.
    ///
    /// Returns the message id whose `working_message_id` binding should be
    /// cleared.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Lark` if the final settings patch fails; card
    /// state is released regardless so the session can start fresh.
    pub async fn close(
        &self,
        session: &mut ActiveSession,
        summary: &str,
    ) -> Result<Option<String>> {
        if let Err(err) = self.flush(session).await {
            warn!(%err, "flush before close failed");
        }

        let Some(mut card) = session.streaming_card.take() else {
            return Ok(None);
        };
        // Invalidate any armed timer.
        card.flush_generation += 1;
        card.flush_scheduled = false;

        let card_id = card.card_id.clone();
        let elapsed = card.created_at.elapsed().as_secs();

        let marker = cards::duration_marker(elapsed);
        let seq = alloc_seq(&mut session.card_sequences, &card_id);
        if let Err(err) = self
            .lark
            .patch_card_element(&card_id, cards::PROCESSING_ELEMENT_ID, &marker, seq)
            .await
        {
            warn!(%err, %card_id, "failed to patch duration marker");
        }

        let settings = cards::streaming_settings(false, summary);
        let seq = alloc_seq(&mut session.card_sequences, &card_id);
        let result = self
            .lark
            .update_card_settings(&card_id, &settings, seq)
            .await;

        session.card_sequences.remove(&card_id);
        session
            .tool_call_elements
            .retain(|_, el| el.card_id != card_id);

        result.map(|()| Some(card.message_id))
    }

    /// Re-enable streaming mode when IM has auto-closed it.
    async fn reopen_if_needed(&self, session: &mut ActiveSession) -> Result<()> {
        let auto_close = Duration::from_millis(self.config.auto_close_ms);
        let state = &mut *session;
        let Some(card) = state.streaming_card.as_mut() else {
            return Ok(());
        };

        let closed = !card.streaming_open || card.last_flush_at.elapsed() >= auto_close;
        if !closed {
            return Ok(());
        }

        card.streaming_open = true;
        card.last_flush_at = std::time::Instant::now();
        let card_id = card.card_id.clone();

        let settings = cards::streaming_settings(true, "");
        let seq = alloc_seq(&mut state.card_sequences, &card_id);
        debug!(%card_id, "re-enabling card streaming mode");
        self.lark
            .update_card_settings(&card_id, &settings, seq)
            .await
    }

    /// Insert a caller-built element before the processing indicator,
    /// finalizing the active text element. The closure receives the
    /// allocated element id.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Lark` if the card patch fails.
    pub async fn insert_element(
        &self,
        session: &mut ActiveSession,
        build: impl FnOnce(&str) -> Value + Send,
    ) -> Result<()> {
        self.reopen_if_needed(session).await?;

        let state = &mut *session;
        let Some(card) = state.streaming_card.as_mut() else {
            return Ok(());
        };
        card.active_element_id = None;
        card.mark_element_boundary();
        let element_id = card.next_markdown_id();
        let card_id = card.card_id.clone();

        let element = build(&element_id);
        let seq = alloc_seq(&mut state.card_sequences, &card_id);
        self.lark
            .add_card_elements(
                &card_id,
                InsertPosition::InsertBefore,
                Some(cards::PROCESSING_ELEMENT_ID),
                &[element],
                seq,
            )
            .await
    }
}

/// Summary used when pausing: head of the text, or the waiting literal.
#[must_use]
pub fn pause_summary(accumulated: &str, empty_summary: &str) -> String {
    let trimmed = accumulated.trim();
    if trimmed.is_empty() {
        empty_summary.to_owned()
    } else {
        let head: String = trimmed.chars().take(100).collect();
        if trimmed.chars().count() > 100 {
            format!("{head}…")
        } else {
            head
        }
    }
}
