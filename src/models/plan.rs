//! Agent plan snapshot types.

use serde::{Deserialize, Serialize};

/// Priority of a plan entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlanPriority {
    /// Must-do item.
    High,
    /// Normal item.
    Medium,
    /// Nice-to-have item.
    Low,
}

/// Progress state of a plan entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    /// Not started.
    Pending,
    /// Currently being worked on.
    InProgress,
    /// Done.
    Completed,
}

/// A single step in the agent's reported plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct PlanEntry {
    /// Human-readable step description.
    pub content: String,
    /// Step priority.
    pub priority: PlanPriority,
    /// Step progress state.
    pub status: PlanStatus,
}

impl PlanEntry {
    /// Glyph shown in front of the entry in the `/todo` card.
    #[must_use]
    pub fn status_glyph(&self) -> &'static str {
        match self.status {
            PlanStatus::Pending => "\u{2610}",
            PlanStatus::InProgress => "\u{25b6}",
            PlanStatus::Completed => "\u{2611}",
        }
    }
}
