//! Collapses a room's context window into one summarised message when a
//! mode has `auto_reduce_context` set, via `context_reducer` config.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use muaddib_agent::handler::ContextReducer;
use muaddib_agent::AgentError;

use crate::llm::complete;
use crate::providers::DefaultModelResolver;

pub struct LlmContextReducer {
    resolver: Arc<DefaultModelResolver>,
    model: String,
    prompt: String,
}

impl LlmContextReducer {
    pub fn new(resolver: Arc<DefaultModelResolver>, model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self { resolver, model: model.into(), prompt: prompt.into() }
    }
}

#[async_trait]
impl ContextReducer for LlmContextReducer {
    async fn reduce(&self, messages: &[Value]) -> Result<Value, AgentError> {
        let transcript = messages
            .iter()
            .map(|m| {
                let role = m.get("role").and_then(|v| v.as_str()).unwrap_or("user");
                let content = m.get("content").and_then(|v| v.as_str()).unwrap_or("");
                format!("{role}: {content}")
            })
            .collect::<Vec<_>>()
            .join("\n");

        let summary = complete(&self.resolver, &self.model, &self.prompt, &transcript)
            .await
            .map_err(AgentError::Model)?;

        Ok(serde_json::json!({ "role": "user", "content": format!("<context-summary>{summary}</context-summary>") }))
    }
}
