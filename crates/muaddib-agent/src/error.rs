//! Error taxonomy for the agentic dispatch core.
//!
//! Locally recoverable classes (refusal, empty completion, tool error,
//! session retry) are absorbed inside the runner or handler; everything
//! else propagates to the handler's top-level catch, which aborts the
//! steering session and surfaces a short diagnostic.

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("command parse error: {0}")]
    CommandParse(String),

    #[error("model error: {0}")]
    Model(String),

    #[error("refusal: {0}")]
    Refusal(String),

    #[error("reached tool-call limit ({max} iterations)")]
    IterationLimit { max: u32 },

    #[error("Agent produced empty completion.")]
    EmptyCompletion,

    #[error("tool error ({tool}): {message}")]
    Tool { tool: String, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    /// Internal signal: a queued command was released mid-flight because the
    /// runner finished before it could be serviced. Not a user-facing error —
    /// the caller must re-enter as a new runner.
    #[error("session released before this item was serviced; retry as new runner")]
    SessionRetry,
}

impl AgentError {
    /// Short diagnostic code for log correlation, matching the crate
    /// boundary's error kinds one-to-one.
    pub fn code(&self) -> &'static str {
        match self {
            AgentError::Config(_) => "agent.config",
            AgentError::CommandParse(_) => "agent.command_parse",
            AgentError::Model(_) => "agent.model",
            AgentError::Refusal(_) => "agent.refusal",
            AgentError::IterationLimit { .. } => "agent.iteration_limit",
            AgentError::EmptyCompletion => "agent.empty_completion",
            AgentError::Tool { .. } => "agent.tool",
            AgentError::Transport(_) => "agent.transport",
            AgentError::SessionRetry => "agent.session_retry",
        }
    }

    /// True for errors that the handler should retry locally rather than
    /// surface as a fatal reply (only the steering retry sentinel today).
    pub fn is_retry(&self) -> bool {
        matches!(self, AgentError::SessionRetry)
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;

impl From<crate::provider::ProviderError> for AgentError {
    fn from(e: crate::provider::ProviderError) -> Self {
        AgentError::Model(e.to_string())
    }
}
