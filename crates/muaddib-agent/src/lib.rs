//! Agentic dispatch core: command resolution, the steering queue, the
//! session runner's tool-calling loop, and the baseline tool roster.
//!
//! Channel adapters (IRC, Discord, Slack) depend on this crate and drive it
//! through [`resolver::CommandResolver`], [`steering::SteeringQueue`], and
//! [`runner::SessionRunner`]; none of those types know which transport they
//! are running behind.

pub mod error;
pub mod handler;
pub mod provider;
pub mod refusal;
pub mod registry;
pub mod resolver;
pub mod router;
pub mod runner;
pub mod steering;
pub mod stream;
pub mod thinking;
pub mod tools;
pub mod types;

mod anthropic;
mod anthropic_stream;
mod ollama;
mod openai;
mod prompt;

pub mod health;

pub use anthropic::AnthropicProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;

pub use error::{AgentError, Result};
pub use handler::{ContextReducer, MessageHandler, ReplySender, SummaryGenerator, ToolSetBuilder};
pub use resolver::{Classifier, CommandResolver, HistoryMessage};
pub use router::{ProviderRouter, ProviderSlot};
pub use runner::{ModelResolver, PromptRequest, SessionRunner, SteeringProvider};
pub use steering::SteeringQueue;
pub use tools::{Tool, ToolResult};
pub use types::{
    AssistantMessage, ContentBlock, ReasoningEffort, ResolvedCommand, ResolvedRuntime, RoomMessage,
    SteeringKey, ToolPersistType, ToolResultBlock, Usage, WorkKind, WorkOutcome,
};
