//! Local tool registry served over the ACP connection.
//!
//! The agent can discover gateway-side tools via `autocoder/tool/list` and
//! invoke them via `autocoder/tool/call`. Each tool is a name, a JSON
//! schema, and an async handler.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{AppError, Result};

/// Boxed future returned by tool handlers.
pub type ToolFuture = Pin<Box<dyn Future<Output = Result<Value>> + Send>>;

/// Async handler invoked for `autocoder/tool/call`.
pub type ToolHandler = Arc<dyn Fn(Value) -> ToolFuture + Send + Sync>;

/// Descriptor returned by `autocoder/tool/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Tool name used in `autocoder/tool/call`.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON schema of the tool's input object.
    pub input_schema: Value,
}

struct ToolEntry {
    definition: ToolDefinition,
    handler: ToolHandler,
}

/// Registry of gateway-side tools exposed to the agent.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolEntry>,
}

impl ToolRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any previous tool with the same name.
    pub fn register(&mut self, definition: ToolDefinition, handler: ToolHandler) {
        self.tools
            .insert(definition.name.clone(), ToolEntry { definition, handler });
    }

    /// Snapshot of all registered tool definitions.
    #[must_use]
    pub fn list(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .values()
            .map(|entry| entry.definition.clone())
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Dispatch a call by tool name.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for unregistered names; handler errors
    /// propagate unchanged.
    pub async fn call(&self, name: &str, args: Value) -> Result<Value> {
        let entry = self
            .tools
            .get(name)
            .ok_or_else(|| AppError::NotFound(format!("tool '{name}' is not registered")))?;
        (entry.handler)(args).await
    }
}
