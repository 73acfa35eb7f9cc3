//! `oracle` — consults a separate, possibly more capable model as a nested
//! session, with `oracle`, `progress_report`, and the quest tools excluded
//! from its own tool set to prevent recursion and irrelevant side effects.

use async_trait::async_trait;

use super::{Tool, ToolResult};
use crate::error::AgentError;
use crate::runner::{ModelResolver, PromptRequest, SessionRunner};

const EXCLUDED_FOR_ORACLE: &[&str] =
    &["oracle", "progress_report", "quest_start", "subquest_start", "quest_snooze"];

pub struct OracleTool {
    resolver: Box<dyn ModelResolver>,
    model: String,
    system_prompt: String,
    /// Already filtered down to exclude `EXCLUDED_FOR_ORACLE`, so the nested
    /// run can borrow this directly as `PromptRequest::tools`.
    tools: Vec<Box<dyn Tool>>,
    max_iterations: u32,
    /// The outer conversation's assembled context at consult time — the
    /// oracle inherits it rather than running blind.
    context_messages: Vec<serde_json::Value>,
}

impl OracleTool {
    /// `tools` is the outer conversation's full roster; entries in
    /// `EXCLUDED_FOR_ORACLE` are dropped before the nested session ever sees
    /// them. `context_messages` is the outer run's assembled context.
    pub fn new(
        resolver: Box<dyn ModelResolver>,
        model: impl Into<String>,
        system_prompt: impl Into<String>,
        tools: Vec<Box<dyn Tool>>,
        max_iterations: u32,
        context_messages: Vec<serde_json::Value>,
    ) -> Self {
        let tools = tools
            .into_iter()
            .filter(|t| !EXCLUDED_FOR_ORACLE.contains(&t.name()))
            .collect();
        Self {
            resolver,
            model: model.into(),
            system_prompt: system_prompt.into(),
            tools,
            max_iterations,
            context_messages,
        }
    }

    fn translate_error(err: &AgentError) -> String {
        let message = err.to_string();
        let lower = message.to_lowercase();
        if lower.contains("iteration") || lower.contains("max") {
            "The oracle exhausted its turn budget without reaching a conclusion.".to_string()
        } else {
            format!("Oracle error: {message}")
        }
    }
}

#[async_trait]
impl Tool for OracleTool {
    fn name(&self) -> &str {
        "oracle"
    }

    fn description(&self) -> &str {
        "Consult a separate, more capable model for a focused sub-question."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let query = match input.get("query").and_then(|v| v.as_str()) {
            Some(q) if !q.trim().is_empty() => q.to_string(),
            _ => return ToolResult::error("oracle requires a non-empty 'query'"),
        };

        let request = PromptRequest {
            model: self.model.clone(),
            system_prompt: self.system_prompt.clone(),
            prompt_text: query,
            context_messages: self.context_messages.clone(),
            thinking_level: None,
            vision_fallback_model: None,
            refusal_fallback_model: None,
            tools: &self.tools,
        };

        let runner = SessionRunner::new(self.max_iterations);
        match runner.run(self.resolver.as_ref(), request, None).await {
            Ok(result) => ToolResult::success(result.text),
            Err(e) => ToolResult::error(Self::translate_error(&e)),
        }
    }

    fn persist_type(&self) -> crate::types::ToolPersistType {
        crate::types::ToolPersistType::Summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translates_iteration_errors_to_polite_message() {
        let err = AgentError::IterationLimit { max: 8 };
        let msg = OracleTool::translate_error(&err);
        assert!(msg.contains("exhausted"));
    }

    #[test]
    fn translates_other_errors_with_oracle_prefix() {
        let err = AgentError::Transport("connection reset".to_string());
        let msg = OracleTool::translate_error(&err);
        assert!(msg.starts_with("Oracle error:"));
    }

    #[test]
    fn excludes_recursive_and_quest_tools() {
        assert!(EXCLUDED_FOR_ORACLE.contains(&"oracle"));
        assert!(EXCLUDED_FOR_ORACLE.contains(&"progress_report"));
        assert!(EXCLUDED_FOR_ORACLE.contains(&"quest_start"));
    }
}
