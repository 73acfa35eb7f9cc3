//! Session runner — drives one logical reply against a model adapter:
//! prompt → turn loop → optional tool dispatch → optional refusal/vision
//! fallback → final text. Aggregates usage and iteration counters into a
//! `PromptResult`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::AgentError;
use crate::provider::{ChatRequest, LlmProvider, ProviderError};
use crate::refusal::is_refusal;
use crate::thinking::ThinkingLevel;
use crate::tools::{Tool, ToolResult};
use crate::types::{AssistantMessage, ContentBlock, PromptResult, Usage};

/// Exact meta-prompt reissued on an empty completion, verbatim per the
/// agent-loop contract so downstream transcripts are recognisable.
const EMPTY_COMPLETION_META: &str =
    "<meta>No valid text or tool use found in response. Please try again.</meta>";

const EMPTY_COMPLETION_MAX_RETRIES: u32 = 3;

/// Truncation budget (bytes) for debug-level logging of message/tool
/// payloads. Strings over budget get a head slice plus a marker.
const DEBUG_LOG_BYTE_BUDGET: usize = 2000;

/// Resolves a fully-qualified `provider:model` spec to a live adapter.
/// Unqualified strings must be rejected by the implementation with a
/// configuration error before a provider is ever dialled.
#[async_trait]
pub trait ModelResolver: Send + Sync {
    async fn resolve(&self, model_spec: &str) -> Result<Arc<dyn LlmProvider>, AgentError>;
}

/// Supplies ambient room messages that arrived while the runner is mid-turn.
/// Drained between turns only, never mid-turn.
#[async_trait]
pub trait SteeringProvider: Send + Sync {
    async fn drain(&self) -> Vec<String>;
}

/// Inputs to a single session-runner invocation.
pub struct PromptRequest<'a> {
    pub model: String,
    pub system_prompt: String,
    pub prompt_text: String,
    /// Prior turns as raw API-shaped JSON messages (role/content), oldest
    /// first. Empty for a fresh conversation.
    pub context_messages: Vec<Value>,
    pub thinking_level: Option<ThinkingLevel>,
    pub vision_fallback_model: Option<String>,
    pub refusal_fallback_model: Option<String>,
    pub tools: &'a [Box<dyn Tool>],
}

pub struct SessionRunner {
    pub max_iterations: u32,
}

impl SessionRunner {
    pub fn new(max_iterations: u32) -> Self {
        Self { max_iterations }
    }

    pub async fn run(
        &self,
        resolver: &dyn ModelResolver,
        req: PromptRequest<'_>,
        steering: Option<&dyn SteeringProvider>,
    ) -> Result<PromptResult, AgentError> {
        let mut current_model = req.model.clone();
        let mut raw_messages = req.context_messages.clone();
        raw_messages.push(serde_json::json!({ "role": "user", "content": req.prompt_text }));

        let mut messages: Vec<AssistantMessage> = Vec::new();
        let mut iterations: u32 = 0;
        let mut tool_calls_count: u32 = 0;
        let mut vision_fallback_activated: Option<String> = None;
        let mut refusal_fallback_activated: Option<String> = None;
        let mut refusal_fallback_used = false;
        let mut empty_retries = 0u32;

        loop {
            let provider = resolver.resolve(&current_model).await?;
            let turn = self
                .run_turn(
                    provider.as_ref(),
                    &current_model,
                    &req.system_prompt,
                    &mut raw_messages,
                    req.tools,
                    req.thinking_level,
                    &mut iterations,
                    &mut tool_calls_count,
                    &mut messages,
                )
                .await;

            let outcome = match turn {
                Ok(o) => o,
                Err(AgentError::Model(msg)) if !refusal_fallback_used && is_refusal(&msg) => {
                    match self.engage_refusal_fallback(&req, &mut current_model) {
                        Some(fallback) => {
                            refusal_fallback_used = true;
                            refusal_fallback_activated = Some(fallback);
                            continue;
                        }
                        None => return Err(AgentError::Refusal(msg)),
                    }
                }
                Err(e) => return Err(e),
            };

            match outcome {
                TurnOutcome::ToolCallsPending => {
                    // Vision fallback: switch model once if any tool result
                    // this turn carried image content and a fallback is set.
                    if vision_fallback_activated.is_none() {
                        if let Some(ref vision_model) = req.vision_fallback_model {
                            if self.last_turn_had_image(&raw_messages) {
                                current_model = vision_model.clone();
                                vision_fallback_activated = Some(vision_model.clone());
                                info!(model = %vision_model, "switched to vision fallback model");
                            }
                        }
                    }
                    if iterations >= self.max_iterations {
                        warn!(max = self.max_iterations, "agent loop reached iteration cap");
                        return Err(AgentError::IterationLimit { max: self.max_iterations });
                    }
                    if let Some(provider) = self.drain_steering(steering, &mut raw_messages).await
                    {
                        let _ = provider;
                    }
                    continue;
                }
                TurnOutcome::Final => {
                    let text_so_far = messages.last().map(|m| m.text()).unwrap_or_default();
                    if !refusal_fallback_used && is_refusal(&text_so_far) {
                        if let Some(fallback) = self.engage_refusal_fallback(&req, &mut current_model) {
                            refusal_fallback_used = true;
                            refusal_fallback_activated = Some(fallback);
                            continue;
                        }
                    }
                    break;
                }
            }
        }

        let last_text = messages.last().map(|m| m.text()).unwrap_or_default();
        let final_text = if last_text.trim().is_empty() {
            match self
                .retry_empty_completion(
                    resolver,
                    &mut current_model,
                    &req,
                    &mut raw_messages,
                    &mut iterations,
                    &mut tool_calls_count,
                    &mut messages,
                    &mut empty_retries,
                )
                .await
            {
                Ok(text) => text,
                Err(e) => return Err(e),
            }
        } else {
            last_text
        };

        let usage: Usage = messages.iter().map(|m| m.usage).sum();
        let stop_reason = messages
            .last()
            .map(|m| m.stop_reason.clone())
            .unwrap_or_else(|| "stop".to_string());

        Ok(PromptResult {
            text: final_text,
            stop_reason,
            usage,
            iterations,
            tool_calls_count,
            vision_fallback_activated,
            refusal_fallback_activated,
            messages,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_turn(
        &self,
        provider: &dyn LlmProvider,
        model: &str,
        system: &str,
        raw_messages: &mut Vec<Value>,
        tools: &[Box<dyn Tool>],
        thinking_level: Option<ThinkingLevel>,
        iterations: &mut u32,
        tool_calls_count: &mut u32,
        messages: &mut Vec<AssistantMessage>,
    ) -> Result<TurnOutcome, AgentError> {
        let req = ChatRequest {
            model: model.to_string(),
            system: system.to_string(),
            system_prompt: None,
            messages: Vec::new(),
            max_tokens: 4096,
            stream: false,
            thinking: thinking_level,
            tools: crate::tools::to_definitions(tools),
            raw_messages: Some(raw_messages.clone()),
        };

        debug!(
            model,
            payload = %truncate_for_log(&format!("{raw_messages:?}")),
            "dispatching agent turn"
        );

        let response = provider.send(&req).await.map_err(to_agent_error)?;
        *iterations += 1;

        let mut content = Vec::new();
        if !response.content.is_empty() {
            content.push(ContentBlock::Text {
                text: response.content.clone(),
            });
        }
        for call in &response.tool_calls {
            content.push(ContentBlock::ToolCall {
                id: call.id.clone(),
                name: call.name.clone(),
                input: call.input.clone(),
            });
        }

        let assistant = AssistantMessage {
            content,
            stop_reason: response.stop_reason.clone(),
            usage: Usage {
                input_tokens: response.tokens_in as u64,
                output_tokens: response.tokens_out as u64,
                cache_read_tokens: 0,
                cache_write_tokens: 0,
                total_tokens: (response.tokens_in + response.tokens_out) as u64,
                ..Default::default()
            },
            provider: provider.name().to_string(),
            model: model.to_string(),
        };

        debug!(
            text = %truncate_for_log(&assistant.text()),
            stop_reason = %assistant.stop_reason,
            "agent turn produced assistant message"
        );

        if assistant.stop_reason == "error" {
            messages.push(assistant);
            return Err(AgentError::Model(
                "provider returned stop_reason=error".to_string(),
            ));
        }

        let has_tool_calls = !response.tool_calls.is_empty();
        messages.push(assistant);

        if !has_tool_calls || response.stop_reason != "tool_use" {
            info!(iterations = *iterations, "agent loop complete");
            return Ok(TurnOutcome::Final);
        }

        let mut assistant_content: Vec<Value> = Vec::new();
        let last = messages.last().unwrap();
        if !last.text().is_empty() {
            assistant_content.push(serde_json::json!({ "type": "text", "text": last.text() }));
        }
        for call in &response.tool_calls {
            assistant_content.push(serde_json::json!({
                "type": "tool_use",
                "id": call.id,
                "name": call.name,
                "input": call.input,
            }));
        }
        raw_messages.push(serde_json::json!({ "role": "assistant", "content": assistant_content }));

        let mut tool_result_content: Vec<Value> = Vec::new();
        for call in &response.tool_calls {
            *tool_calls_count += 1;
            let result = dispatch_tool(tools, &call.name, call.input.clone()).await;
            debug!(
                tool = %call.name,
                result = %truncate_for_log(&result.content),
                is_error = result.is_error,
                "tool call completed"
            );
            tool_result_content.push(serde_json::json!({
                "type": "tool_result",
                "tool_use_id": call.id,
                "content": result.content,
                "is_error": result.is_error,
            }));
        }
        raw_messages.push(serde_json::json!({ "role": "user", "content": tool_result_content }));

        Ok(TurnOutcome::ToolCallsPending)
    }

    fn last_turn_had_image(&self, raw_messages: &[Value]) -> bool {
        raw_messages
            .last()
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_array())
            .map(|blocks| {
                blocks.iter().any(|b| {
                    b.get("type").and_then(|t| t.as_str()) == Some("tool_result")
                        && b.get("content")
                            .and_then(|c| c.as_str())
                            .map(|s| s.contains("data:image/"))
                            .unwrap_or(false)
                })
            })
            .unwrap_or(false)
    }

    fn engage_refusal_fallback(
        &self,
        req: &PromptRequest<'_>,
        current_model: &mut String,
    ) -> Option<String> {
        let fallback = req.refusal_fallback_model.clone()?;
        *current_model = fallback.clone();
        info!(model = %fallback, "switched to refusal fallback model");
        Some(fallback)
    }

    async fn drain_steering(
        &self,
        steering: Option<&dyn SteeringProvider>,
        raw_messages: &mut Vec<Value>,
    ) -> Option<()> {
        let steering = steering?;
        for line in steering.drain().await {
            raw_messages.push(serde_json::json!({ "role": "user", "content": line }));
        }
        Some(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn retry_empty_completion(
        &self,
        resolver: &dyn ModelResolver,
        current_model: &mut String,
        req: &PromptRequest<'_>,
        raw_messages: &mut Vec<Value>,
        iterations: &mut u32,
        tool_calls_count: &mut u32,
        messages: &mut Vec<AssistantMessage>,
        empty_retries: &mut u32,
    ) -> Result<String, AgentError> {
        while *empty_retries < EMPTY_COMPLETION_MAX_RETRIES {
            *empty_retries += 1;
            warn!(attempt = *empty_retries, "empty completion, reissuing meta-prompt");
            raw_messages.push(serde_json::json!({ "role": "user", "content": EMPTY_COMPLETION_META }));
            let provider = resolver.resolve(current_model).await?;
            loop {
                let outcome = self
                    .run_turn(
                        provider.as_ref(),
                        current_model,
                        &req.system_prompt,
                        raw_messages,
                        req.tools,
                        req.thinking_level,
                        iterations,
                        tool_calls_count,
                        messages,
                    )
                    .await?;
                if matches!(outcome, TurnOutcome::Final) {
                    break;
                }
            }
            let text = messages.last().map(|m| m.text()).unwrap_or_default();
            if !text.trim().is_empty() {
                return Ok(text);
            }
        }
        Err(AgentError::EmptyCompletion)
    }
}

enum TurnOutcome {
    Final,
    ToolCallsPending,
}

async fn dispatch_tool(tools: &[Box<dyn Tool>], name: &str, input: Value) -> ToolResult {
    match tools.iter().find(|t| t.name() == name) {
        Some(tool) => tool.execute(input).await,
        None => ToolResult::error(format!("unknown tool: {name}")),
    }
}

fn to_agent_error(e: ProviderError) -> AgentError {
    AgentError::Model(e.to_string())
}

fn truncate_for_log(s: &str) -> String {
    if s.len() <= DEBUG_LOG_BYTE_BUDGET {
        return s.to_string();
    }
    let mut end = DEBUG_LOG_BYTE_BUDGET;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... [truncated, {} bytes total]", &s[..end], s.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ChatResponse, ToolCall};

    struct AlwaysText(String);

    #[async_trait]
    impl LlmProvider for AlwaysText {
        fn name(&self) -> &str {
            "mock"
        }
        async fn send(&self, _req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            Ok(ChatResponse {
                content: self.0.clone(),
                model: "mock-model".to_string(),
                tokens_in: 10,
                tokens_out: 5,
                stop_reason: "stop".to_string(),
                tool_calls: Vec::new(),
            })
        }
    }

    struct OneToolCallThenText;

    #[async_trait]
    impl LlmProvider for OneToolCallThenText {
        fn name(&self) -> &str {
            "mock"
        }
        async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            let turn_count = req.raw_messages.as_ref().map(|m| m.len()).unwrap_or(0);
            if turn_count <= 1 {
                Ok(ChatResponse {
                    content: String::new(),
                    model: "mock-model".to_string(),
                    tokens_in: 10,
                    tokens_out: 5,
                    stop_reason: "tool_use".to_string(),
                    tool_calls: vec![ToolCall {
                        id: "call1".to_string(),
                        name: "noop".to_string(),
                        input: serde_json::json!({}),
                    }],
                })
            } else {
                Ok(ChatResponse {
                    content: "done".to_string(),
                    model: "mock-model".to_string(),
                    tokens_in: 10,
                    tokens_out: 5,
                    stop_reason: "stop".to_string(),
                    tool_calls: Vec::new(),
                })
            }
        }
    }

    struct AlwaysEmpty;

    #[async_trait]
    impl LlmProvider for AlwaysEmpty {
        fn name(&self) -> &str {
            "mock"
        }
        async fn send(&self, _req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            Ok(ChatResponse {
                content: String::new(),
                model: "mock-model".to_string(),
                tokens_in: 1,
                tokens_out: 0,
                stop_reason: "stop".to_string(),
                tool_calls: Vec::new(),
            })
        }
    }

    struct NoopTool;

    #[async_trait]
    impl Tool for NoopTool {
        fn name(&self) -> &str {
            "noop"
        }
        fn description(&self) -> &str {
            "does nothing"
        }
        fn input_schema(&self) -> Value {
            serde_json::json!({ "type": "object" })
        }
        async fn execute(&self, _input: Value) -> ToolResult {
            ToolResult::success("ok")
        }
        fn persist_type(&self) -> crate::types::ToolPersistType {
            crate::types::ToolPersistType::None
        }
    }

    struct FixedResolver(Arc<dyn LlmProvider>);

    #[async_trait]
    impl ModelResolver for FixedResolver {
        async fn resolve(&self, _model_spec: &str) -> Result<Arc<dyn LlmProvider>, AgentError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn simple_turn_returns_text_with_no_tools() {
        let resolver = FixedResolver(Arc::new(AlwaysText("hello there".to_string())));
        let runner = SessionRunner::new(25);
        let tools: Vec<Box<dyn Tool>> = Vec::new();
        let req = PromptRequest {
            model: "anthropic:claude".to_string(),
            system_prompt: "be nice".to_string(),
            prompt_text: "hi".to_string(),
            context_messages: Vec::new(),
            thinking_level: None,
            vision_fallback_model: None,
            refusal_fallback_model: None,
            tools: &tools,
        };
        let result = runner.run(&resolver, req, None).await.unwrap();
        assert_eq!(result.text, "hello there");
        assert_eq!(result.iterations, 1);
        assert_eq!(result.tool_calls_count, 0);
    }

    #[tokio::test]
    async fn tool_call_then_final_text_drives_loop_twice() {
        let resolver = FixedResolver(Arc::new(OneToolCallThenText));
        let runner = SessionRunner::new(25);
        let tools: Vec<Box<dyn Tool>> = vec![Box::new(NoopTool)];
        let req = PromptRequest {
            model: "anthropic:claude".to_string(),
            system_prompt: "be nice".to_string(),
            prompt_text: "hi".to_string(),
            context_messages: Vec::new(),
            thinking_level: None,
            vision_fallback_model: None,
            refusal_fallback_model: None,
            tools: &tools,
        };
        let result = runner.run(&resolver, req, None).await.unwrap();
        assert_eq!(result.text, "done");
        assert_eq!(result.tool_calls_count, 1);
        assert_eq!(result.iterations, 2);
    }

    #[tokio::test]
    async fn empty_completion_exhausts_retries_and_fails() {
        let resolver = FixedResolver(Arc::new(AlwaysEmpty));
        let runner = SessionRunner::new(25);
        let tools: Vec<Box<dyn Tool>> = Vec::new();
        let req = PromptRequest {
            model: "anthropic:claude".to_string(),
            system_prompt: "be nice".to_string(),
            prompt_text: "hi".to_string(),
            context_messages: Vec::new(),
            thinking_level: None,
            vision_fallback_model: None,
            refusal_fallback_model: None,
            tools: &tools,
        };
        let result = runner.run(&resolver, req, None).await;
        assert!(matches!(result, Err(AgentError::EmptyCompletion)));
    }

    #[tokio::test]
    async fn usage_is_summed_across_turns() {
        let resolver = FixedResolver(Arc::new(OneToolCallThenText));
        let runner = SessionRunner::new(25);
        let tools: Vec<Box<dyn Tool>> = vec![Box::new(NoopTool)];
        let req = PromptRequest {
            model: "anthropic:claude".to_string(),
            system_prompt: "be nice".to_string(),
            prompt_text: "hi".to_string(),
            context_messages: Vec::new(),
            thinking_level: None,
            vision_fallback_model: None,
            refusal_fallback_model: None,
            tools: &tools,
        };
        let result = runner.run(&resolver, req, None).await.unwrap();
        assert_eq!(result.usage.input_tokens, 20);
        assert_eq!(result.usage.output_tokens, 10);
    }
}
