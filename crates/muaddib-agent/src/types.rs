//! Core data model: the unit of work entering the system, the keys that
//! serialise concurrent work per conversation, and the records the command
//! resolver and session runner hand back to the message handler.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The unit of work entering the system from a transport adapter.
///
/// Immutable once constructed. `arc()` derives the conversation scope that
/// keys all per-conversation state (history, chronicle, sandbox).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomMessage {
    pub server_tag: String,
    pub channel_name: String,
    pub nick: String,
    pub mynick: String,
    /// Mention-stripped text.
    pub content: String,
    pub platform_id: Option<String>,
    pub thread_id: Option<String>,
    pub thread_starter_id: Option<String>,
    #[serde(default)]
    pub secrets: HashMap<String, String>,
}

impl RoomMessage {
    pub fn arc(&self) -> String {
        format!("{}#{}", self.server_tag, self.channel_name)
    }

    pub fn is_from_bot(&self) -> bool {
        self.nick == self.mynick
    }
}

/// A per-arc sub-scope serialising concurrent agent runs.
///
/// Threaded messages key on the thread; unthreaded messages key per sender
/// so distinct users in the same channel run in parallel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SteeringKey {
    pub arc: String,
    /// `None` represents the wildcard subject `"*"` (threaded rooms key on
    /// the thread, not the sender).
    pub subject_nick: Option<String>,
    pub thread_id: Option<String>,
}

impl SteeringKey {
    pub fn for_message(msg: &RoomMessage) -> Self {
        if let Some(thread_id) = &msg.thread_id {
            Self {
                arc: msg.arc(),
                subject_nick: None,
                thread_id: Some(thread_id.clone()),
            }
        } else {
            Self {
                arc: msg.arc(),
                subject_nick: Some(msg.nick.clone()),
                thread_id: None,
            }
        }
    }
}

impl std::fmt::Display for SteeringKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}::{}::{}",
            self.arc,
            self.subject_nick.as_deref().unwrap_or("*"),
            self.thread_id.as_deref().unwrap_or("-"),
        )
    }
}

/// Whether a queued message demands a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkKind {
    /// Addressed to the bot, must produce a reply.
    Command,
    /// Overheard, may be folded into context.
    Passive,
}

/// The outcome a queued work item settles with.
#[derive(Debug, Clone)]
pub enum WorkOutcome {
    /// Drained as context, compacted away, or released passively — no reply.
    Finished,
    /// The runner produced a reply (commands only).
    Replied(String),
    /// The session aborted or was released with pending commands; caller
    /// must retry as a new runner. Distinct from transport/model errors.
    Retry,
    /// The session aborted with a real error.
    Failed(String),
}

/// Semantic reasoning-effort tiers a mode may request of the model adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Low,
    Medium,
    High,
}

/// Effective runtime settings for a resolved mode, after merging
/// trigger-level overrides, mode-level settings, and defaults.
#[derive(Debug, Clone)]
pub struct ResolvedRuntime {
    pub model: String,
    pub prompt: String,
    pub reasoning_effort: Option<ReasoningEffort>,
    /// `None` = all tools allowed.
    pub allowed_tools: Option<Vec<String>>,
    pub steering: bool,
    pub auto_reduce_context: bool,
    pub include_chapter_summary: bool,
    pub vision_model: Option<String>,
    pub history_size: usize,
}

/// Output of the command resolver.
#[derive(Debug, Clone)]
pub struct ResolvedCommand {
    pub mode_key: String,
    pub selected_trigger: String,
    pub selected_automatically: bool,
    pub runtime: ResolvedRuntime,
    pub query_text: String,
    pub no_context: bool,
    pub model_override: Option<String>,
    pub error: Option<String>,
    pub help_requested: bool,
}

impl ResolvedCommand {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            mode_key: String::new(),
            selected_trigger: String::new(),
            selected_automatically: false,
            runtime: ResolvedRuntime {
                model: String::new(),
                prompt: String::new(),
                reasoning_effort: None,
                allowed_tools: None,
                steering: false,
                auto_reduce_context: false,
                include_chapter_summary: false,
                vision_model: None,
                history_size: 0,
            },
            query_text: String::new(),
            no_context: false,
            model_override: None,
            error: Some(message.into()),
            help_requested: false,
        }
    }

    pub fn help() -> Self {
        let mut r = Self::error("");
        r.error = None;
        r.help_requested = true;
        r
    }
}

/// Integer token counters and matching cost floats, additive under
/// field-wise summation.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_write_tokens: u64,
    pub total_tokens: u64,
    pub input_cost: f64,
    pub output_cost: f64,
    pub cache_read_cost: f64,
    pub cache_write_cost: f64,
    pub total_cost: f64,
}

impl std::ops::Add for Usage {
    type Output = Usage;
    fn add(self, rhs: Usage) -> Usage {
        Usage {
            input_tokens: self.input_tokens + rhs.input_tokens,
            output_tokens: self.output_tokens + rhs.output_tokens,
            cache_read_tokens: self.cache_read_tokens + rhs.cache_read_tokens,
            cache_write_tokens: self.cache_write_tokens + rhs.cache_write_tokens,
            total_tokens: self.total_tokens + rhs.total_tokens,
            input_cost: self.input_cost + rhs.input_cost,
            output_cost: self.output_cost + rhs.output_cost,
            cache_read_cost: self.cache_read_cost + rhs.cache_read_cost,
            cache_write_cost: self.cache_write_cost + rhs.cache_write_cost,
            total_cost: self.total_cost + rhs.total_cost,
        }
    }
}

impl std::iter::Sum for Usage {
    fn sum<I: Iterator<Item = Usage>>(iter: I) -> Usage {
        iter.fold(Usage::default(), std::ops::Add::add)
    }
}

/// A single content block within an assistant message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    Thinking { text: String },
    ToolCall { id: String, name: String, input: serde_json::Value },
    Image { media_type: String, data: String },
}

/// The canonical record produced per agent turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantMessage {
    pub content: Vec<ContentBlock>,
    pub stop_reason: String,
    pub usage: Usage,
    pub provider: String,
    pub model: String,
}

impl AssistantMessage {
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    pub fn tool_calls(&self) -> Vec<(&str, &str, &serde_json::Value)> {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolCall { id, name, input } => {
                    Some((id.as_str(), name.as_str(), input))
                }
                _ => None,
            })
            .collect()
    }

    pub fn has_image_tool_result(results: &[ToolResultBlock]) -> bool {
        results.iter().any(|r| r.has_image)
    }
}

/// A tool result paired by tool-call id with the assistant turn that
/// requested it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResultBlock {
    pub tool_call_id: String,
    pub content: String,
    pub is_error: bool,
    pub has_image: bool,
    pub details: Option<serde_json::Value>,
}

/// Controls whether and how a tool's effects are recorded in the chronicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolPersistType {
    None,
    Summary,
    Artifact,
}

/// Output of the session runner.
#[derive(Debug, Clone)]
pub struct PromptResult {
    pub text: String,
    pub stop_reason: String,
    pub usage: Usage,
    pub iterations: u32,
    pub tool_calls_count: u32,
    pub vision_fallback_activated: Option<String>,
    pub refusal_fallback_activated: Option<String>,
    /// Full message list for downstream persistence/summary generation.
    pub messages: Vec<AssistantMessage>,
}
