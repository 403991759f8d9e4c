//! In-memory per-session state.
//!
//! One [`ActiveSession`] exists per session with a live agent connection.
//! The orchestrator stores them behind `Arc<tokio::sync::Mutex<_>>`; that
//! mutex *is* the per-session lock — every mutation of streaming state,
//! sequences, tool elements, or permission resolvers happens under it.

use std::collections::HashMap;
use std::time::Instant;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::acp::client::AcpClient;
use crate::acp::protocol::{
    AgentCommand, ConfigOption, ModeEntry, ModelEntry, PermissionOption, PermissionOutcome,
};
use crate::models::plan::PlanEntry;

/// The per-session streaming card, when one is open.
#[derive(Debug)]
pub struct StreamingCard {
    /// Card entity id; sequences are scoped to it.
    pub card_id: String,
    /// IM message the card entity is attached to.
    pub message_id: String,
    /// Markdown element currently receiving appended text.
    pub active_element_id: Option<String>,
    /// Counter feeding `md_<n>` / `tool_<n>` element ids.
    pub element_counter: u32,
    /// All text received for the card so far.
    pub accumulated_text: String,
    /// Text as of the last successful flush.
    pub last_flushed_text: String,
    /// Bumped to invalidate a scheduled flush timer.
    pub flush_generation: u64,
    /// Whether a flush timer is currently armed.
    pub flush_scheduled: bool,
    /// Creation time, for the closing duration marker.
    pub created_at: Instant,
    /// Whether IM still considers the card in streaming mode.
    pub streaming_open: bool,
    /// Last flush time, for auto-reopen after long idles.
    pub last_flush_at: Instant,
    /// Whether the greyed `md_0` placeholder has been replaced or removed.
    pub placeholder_replaced: bool,
    /// Byte offset in `accumulated_text` where the active element begins.
    pub element_start: usize,
}

impl StreamingCard {
    /// Fresh state for a just-created card entity.
    #[must_use]
    pub fn new(card_id: String, message_id: String) -> Self {
        let now = Instant::now();
        Self {
            card_id,
            message_id,
            active_element_id: None,
            element_counter: 0,
            accumulated_text: String::new(),
            last_flushed_text: String::new(),
            flush_generation: 0,
            flush_scheduled: false,
            created_at: now,
            streaming_open: true,
            last_flush_at: now,
            placeholder_replaced: false,
            element_start: 0,
        }
    }

    /// Finalize the active element: subsequent text belongs to a new one.
    pub fn mark_element_boundary(&mut self) {
        self.element_start = self.accumulated_text.len();
    }

    /// Allocate the next markdown element id.
    pub fn next_markdown_id(&mut self) -> String {
        self.element_counter += 1;
        format!("md_{}", self.element_counter)
    }

    /// Allocate the next tool element id.
    pub fn next_tool_id(&mut self) -> String {
        self.element_counter += 1;
        format!("tool_{}", self.element_counter)
    }
}

/// A card element tracking one agent tool call.
#[derive(Debug, Clone)]
pub struct ToolCallElement {
    /// Card element id.
    pub element_id: String,
    /// Card the element lives in.
    pub card_id: String,
    /// Tool kind (`read`, `edit`, …).
    pub kind: String,
    /// Short argument label shown next to the title.
    pub label: String,
    /// Display title.
    pub title: String,
    /// When the tool call started, for the completion duration.
    pub started_at: Instant,
}

/// A pending permission request awaiting a card click or timeout.
pub struct PendingPermission {
    /// Resolves the agent's `session/request_permission` call.
    pub tx: oneshot::Sender<PermissionOutcome>,
    /// The options offered, used to label the resolved card.
    pub options: Vec<PermissionOption>,
    /// Tool description shown on the card.
    pub tool_description: String,
    /// Timeout task; aborted when the user clicks first.
    pub timer: JoinHandle<()>,
}

/// Live state of one session with an agent connection.
pub struct ActiveSession {
    /// Gateway session id.
    pub session_id: String,
    /// Chat the session lives in.
    pub chat_id: String,
    /// Typed ACP client for the agent connection.
    pub client: std::sync::Arc<AcpClient>,
    /// Agent-side session id.
    pub acp_session_id: String,
    /// Slash commands the agent recognizes.
    pub available_commands: Vec<AgentCommand>,
    /// Models the agent can switch between.
    pub available_models: Vec<ModelEntry>,
    /// Modes the agent supports.
    pub available_modes: Vec<ModeEntry>,
    /// Currently selected mode id.
    pub current_mode: String,
    /// Currently selected model id.
    pub current_model: Option<String>,
    /// Agent-exposed configuration options.
    pub config_options: Vec<ConfigOption>,
    /// Latest plan snapshot.
    pub current_plan: Vec<PlanEntry>,
    /// The open streaming card, if any.
    pub streaming_card: Option<StreamingCard>,
    /// Pending permission resolvers keyed by permission-card message id.
    pub permission_resolvers: HashMap<String, PendingPermission>,
    /// Tool-call elements keyed by ACP tool-call id.
    pub tool_call_elements: HashMap<String, ToolCallElement>,
    /// Monotonic sequence counters keyed by card id.
    pub card_sequences: HashMap<String, u64>,
    /// Message the next streaming card should reply to.
    pub last_prompt_message_id: String,
    /// Foreground shell child, when a `!command` is running.
    pub shell_child: Option<std::sync::Arc<tokio::sync::Mutex<tokio::process::Child>>>,
    /// Cancellation for the connection's transport and dispatch tasks.
    pub conn_cancel: CancellationToken,
}

impl ActiveSession {
    /// Allocate the next sequence for a card.
    ///
    /// The only legal way to obtain a sequence: callers hold the session
    /// lock, so consecutive calls return strictly increasing values per
    /// card id.
    pub fn next_sequence_for_card(&mut self, card_id: &str) -> u64 {
        Self::alloc_sequence(&mut self.card_sequences, card_id)
    }

    /// Sequence allocation over a borrowed counter map, for callers that
    /// already hold disjoint field borrows of the session.
    pub fn alloc_sequence(sequences: &mut HashMap<String, u64>, card_id: &str) -> u64 {
        let seq = sequences.entry(card_id.to_owned()).or_insert(0);
        *seq += 1;
        *seq
    }

    /// Resolve a mode id or case-insensitive name to its id.
    #[must_use]
    pub fn resolve_mode(&self, query: &str) -> Option<String> {
        self.available_modes
            .iter()
            .find(|mode| mode.id == query || mode.name.eq_ignore_ascii_case(query))
            .map(|mode| mode.id.clone())
    }
}
