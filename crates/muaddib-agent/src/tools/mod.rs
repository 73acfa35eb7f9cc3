//! Tool system for the agent's tool-calling loop.
//!
//! Defines the `Tool` trait every executor implements, the baseline tool
//! roster, and helpers for converting tools to LLM API format.

pub mod artifacts;
pub mod chronicle;
pub mod execute_code;
pub mod generate_image;
pub mod make_plan;
pub mod oracle;
pub mod progress_report;
pub mod quest;
pub mod visit_webpage;
pub mod web_search;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::provider::ToolDefinition;
use crate::types::ToolPersistType;

/// Result of executing a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Text content returned to the LLM.
    pub content: String,
    /// Whether the tool execution failed.
    pub is_error: bool,
    /// True if `content` carries at least one base64 image blob.
    #[serde(default)]
    pub has_image: bool,
    /// Opaque structured detail, surfaced alongside `content` when the
    /// handler builds a `ToolResultBlock` for persistence.
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}

impl ToolResult {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
            has_image: false,
            details: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: message.into(),
            is_error: true,
            has_image: false,
            details: None,
        }
    }

    pub fn with_image(mut self) -> Self {
        self.has_image = true;
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Trait every tool implements.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name for this tool (e.g. "web_search").
    fn name(&self) -> &str;
    /// Human-readable description of what this tool does.
    fn description(&self) -> &str;
    /// JSON Schema for the tool's input parameters.
    fn input_schema(&self) -> serde_json::Value;
    /// Execute the tool with the given input.
    async fn execute(&self, input: serde_json::Value) -> ToolResult;
    /// Declares whether and how this tool's effects should be recorded in
    /// the chronicle. Most tools are transient (`None`).
    fn persist_type(&self) -> ToolPersistType {
        ToolPersistType::None
    }
}

/// Static catalog of all built-in tools (name, description) — useful for
/// help listings without instantiating any tool.
pub fn tool_catalog() -> Vec<(&'static str, &'static str)> {
    vec![
        ("web_search", "Search the web for a query"),
        ("visit_webpage", "Fetch and read the contents of a URL"),
        ("execute_code", "Run Python or Bash in a sandboxed environment"),
        ("share_artifact", "Publish text content as a durable artifact URL"),
        ("edit_artifact", "Edit a previously published artifact in place"),
        ("oracle", "Consult a separate, more capable model for a sub-question"),
        ("generate_image", "Generate an image from a text prompt"),
        ("chronicle_read", "Read a past chapter of this conversation's chronicle"),
        ("chronicle_append", "Append a paragraph to the current chronicle chapter"),
        ("quest_start", "Begin tracking a long-running goal"),
        ("subquest_start", "Begin tracking a sub-goal of the active quest"),
        ("quest_snooze", "Schedule a wake-up to resume the active quest"),
        ("progress_report", "Emit a user-visible progress update"),
        ("make_plan", "Persist a plan for the current arc"),
    ]
}

/// Convert a slice of tools to API-level tool definitions.
pub fn to_definitions(tools: &[Box<dyn Tool>]) -> Vec<ToolDefinition> {
    tools
        .iter()
        .map(|t| ToolDefinition {
            name: t.name().to_string(),
            description: t.description().to_string(),
            input_schema: t.input_schema(),
        })
        .collect()
}

/// Selects the quest-related subset of the baseline roster for one run,
/// based on whether a quest is active and, if so, whether it is a
/// top-level quest (`id` has no dot) or a sub-quest (`id` contains a dot).
pub fn quest_tool_names_for(active_quest_id: Option<&str>) -> &'static [&'static str] {
    match active_quest_id {
        None => &["quest_start"],
        Some(id) if id.contains('.') => &["quest_snooze"],
        Some(_) => &["subquest_start", "quest_snooze"],
    }
}
