//! Message handler pipeline — the single entry point transports call for
//! every inbound [`RoomMessage`]. Wires together the command resolver, the
//! steering queue, and the session runner into the ten-step flow: ignore
//! filter, persistence, resolution, queue decision, context assembly, tool
//! assembly, run, post-process, send/persist/followups, release/abort.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use muaddib_core::config::{CommandConfig, MuaddibConfig};
use muaddib_memory::manager::MemoryManager;

use crate::error::AgentError;
use crate::resolver::{Classifier, CommandResolver, HistoryMessage};
use crate::runner::{ModelResolver, PromptRequest, SessionRunner, SteeringProvider};
use crate::steering::SteeringQueue;
use crate::thinking::ThinkingLevel;
use crate::tools::artifacts::ArtifactStore;
use crate::tools::Tool;
use crate::types::{
    PromptResult, ReasoningEffort, ResolvedCommand, RoomMessage, SteeringKey, WorkKind, WorkOutcome,
};

fn thinking_level_for(effort: ReasoningEffort) -> ThinkingLevel {
    match effort {
        ReasoningEffort::Low => ThinkingLevel::Low,
        ReasoningEffort::Medium => ThinkingLevel::Medium,
        ReasoningEffort::High => ThinkingLevel::High,
    }
}

/// Delivers the final reply text back to the originating transport.
#[async_trait]
pub trait ReplySender: Send + Sync {
    async fn send(&self, text: &str) -> Result<(), AgentError>;
}

/// Builds the tool roster for one run, filtered by `allowed_tools` and
/// extended with whichever quest tools apply to `active_quest_id` (see
/// [`crate::tools::quest_tool_names_for`]). `outer_context` is the run's
/// assembled context messages, handed through so context-dependent tools
/// (e.g. `oracle`) can inherit the surrounding conversation.
pub trait ToolSetBuilder: Send + Sync {
    fn build(
        &self,
        allowed_tools: Option<&[String]>,
        active_quest_id: Option<&str>,
        outer_context: &[Value],
    ) -> Vec<Box<dyn Tool>>;
}

/// Collapses old context turns into a single `<context_summary>` message.
/// Implemented over a cheap model call in production.
#[async_trait]
pub trait ContextReducer: Send + Sync {
    async fn reduce(&self, messages: &[Value]) -> Result<Value, AgentError>;
}

/// Generates a short textual note over a completed run's tool-use trace for
/// the chronicle followup (§4.5 step 9). Implemented over a cheap model call.
#[async_trait]
pub trait SummaryGenerator: Send + Sync {
    async fn summarize(&self, result: &PromptResult) -> Option<String>;
}

/// Threshold above which a reply is published as an artifact instead of
/// sent inline, per the length policy in §4.5 step 8. Chars, not bytes —
/// close enough for the ASCII-heavy replies this system produces.
const HEAD_EXCERPT_CHARS: usize = 1500;

/// Wires the command resolver, steering queue, and session runner into the
/// end-to-end message pipeline described in §4.5.
pub struct MessageHandler {
    config: Arc<MuaddibConfig>,
    memory: Arc<MemoryManager>,
    steering: Arc<SteeringQueue>,
    runner: Arc<SessionRunner>,
    model_resolver: Arc<dyn ModelResolver>,
    tool_set: Arc<dyn ToolSetBuilder>,
    classifier: Option<Arc<dyn Classifier>>,
    context_reducer: Option<Arc<dyn ContextReducer>>,
    summary_generator: Option<Arc<dyn SummaryGenerator>>,
    artifacts: Option<Arc<ArtifactStore>>,
}

impl MessageHandler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<MuaddibConfig>,
        memory: Arc<MemoryManager>,
        steering: Arc<SteeringQueue>,
        runner: Arc<SessionRunner>,
        model_resolver: Arc<dyn ModelResolver>,
        tool_set: Arc<dyn ToolSetBuilder>,
    ) -> Self {
        Self {
            config,
            memory,
            steering,
            runner,
            model_resolver,
            tool_set,
            classifier: None,
            context_reducer: None,
            summary_generator: None,
            artifacts: None,
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn with_context_reducer(mut self, reducer: Arc<dyn ContextReducer>) -> Self {
        self.context_reducer = Some(reducer);
        self
    }

    pub fn with_summary_generator(mut self, generator: Arc<dyn SummaryGenerator>) -> Self {
        self.summary_generator = Some(generator);
        self
    }

    pub fn with_artifacts(mut self, store: Arc<ArtifactStore>) -> Self {
        self.artifacts = Some(store);
        self
    }

    /// Step 1: rooms are keyed by transport tag (`serverTag`) — one room per
    /// IRC network, Discord guild set, or Slack workspace.
    fn command_config(&self, msg: &RoomMessage) -> CommandConfig {
        self.config
            .rooms
            .get(&msg.server_tag)
            .map(|r| r.command.clone())
            .unwrap_or_default()
    }

    /// Entry point transports call for every inbound message.
    pub async fn handle(&self, msg: RoomMessage, reply: &dyn ReplySender) {
        if self.is_ignored(&msg) {
            return;
        }

        if let Err(e) = self.persist_incoming(&msg) {
            tracing::warn!(error = %e, arc = %msg.arc(), "failed to persist incoming message");
        }

        // Never reply to our own messages reflected back by the transport.
        if msg.is_from_bot() {
            return;
        }

        let mut current = msg;
        loop {
            let cmd_cfg = self.command_config(&current);
            let resolved = self.resolve(&current, &cmd_cfg).await;

            if let Some(text) = short_circuit_reply(&resolved) {
                let _ = reply.send(&text).await;
                return;
            }

            if !resolved.runtime.steering || resolved.no_context {
                let outcome = self.run_and_postprocess(&current, &cmd_cfg, &resolved).await;
                self.deliver(outcome, reply).await;
                return;
            }

            match self.handle_via_steering(current.clone(), resolved, reply).await {
                ControlFlow::Done => return,
                ControlFlow::Retry => continue,
            }
        }
    }

    fn is_ignored(&self, msg: &RoomMessage) -> bool {
        self.command_config(msg)
            .ignore_users
            .iter()
            .any(|u| u == &msg.nick)
    }

    fn persist_incoming(&self, msg: &RoomMessage) -> Result<i64, muaddib_memory::error::MemoryError> {
        let role = if msg.is_from_bot() { "assistant" } else { "user" };
        self.memory.add_message(
            &msg.arc(),
            msg.thread_id.as_deref(),
            msg.thread_starter_id.as_deref(),
            role,
            &msg.nick,
            &msg.content,
            msg.platform_id.as_deref(),
            None,
        )
    }

    async fn resolve(&self, msg: &RoomMessage, cmd_cfg: &CommandConfig) -> ResolvedCommand {
        let history = self.classifier_history(&msg.arc(), cmd_cfg.history_size);
        let resolver = CommandResolver::new(cmd_cfg);
        resolver
            .resolve(&msg.arc(), &msg.content, &history, self.classifier.as_deref())
            .await
    }

    fn classifier_history(&self, arc: &str, limit: usize) -> Vec<HistoryMessage> {
        self.memory
            .get_context(arc, limit, None, None)
            .unwrap_or_default()
            .into_iter()
            .map(|m| HistoryMessage { role: m.role, text: m.content })
            .collect()
    }

    /// Queue decision + runner/follower split (§4.5 step 4).
    async fn handle_via_steering(
        &self,
        msg: RoomMessage,
        resolved: ResolvedCommand,
        reply: &dyn ReplySender,
    ) -> ControlFlow {
        let enq = self.steering.enqueue_command(msg, resolved.selected_trigger.clone());
        if !enq.is_runner {
            match enq.handle.wait().await {
                WorkOutcome::Replied(text) => {
                    let _ = reply.send(&text).await;
                    return ControlFlow::Done;
                }
                WorkOutcome::Failed(e) => {
                    let _ = reply.send(&format!("error: {e}")).await;
                    return ControlFlow::Done;
                }
                WorkOutcome::Finished => return ControlFlow::Done,
                WorkOutcome::Retry => return ControlFlow::Retry,
            }
        }

        let key = enq.key.clone();
        self.steering
            .drain_session(&key, |message, kind| {
                let key = key.clone();
                async move {
                    match kind {
                        WorkKind::Command => {
                            let cmd_cfg = self.command_config(&message);
                            let resolved = self.resolve(&message, &cmd_cfg).await;
                            if let Some(text) = short_circuit_reply(&resolved) {
                                let _ = reply.send(&text).await;
                                return WorkOutcome::Replied(text);
                            }
                            let outcome = self.run_and_postprocess(&message, &cmd_cfg, &resolved).await;
                            self.deliver_and_convert(outcome, reply, &key).await
                        }
                        WorkKind::Passive => WorkOutcome::Finished,
                    }
                }
            })
            .await;
        self.steering.release_session(&key);
        ControlFlow::Done
    }

    async fn deliver_and_convert(
        &self,
        outcome: Result<String, AgentError>,
        reply: &dyn ReplySender,
        key: &SteeringKey,
    ) -> WorkOutcome {
        match outcome {
            Ok(text) => {
                let _ = reply.send(&text).await;
                WorkOutcome::Replied(text)
            }
            Err(e) => {
                tracing::error!(error = %e, %key, "run failed");
                let _ = reply.send(&format!("error: {e}")).await;
                WorkOutcome::Failed(e.to_string())
            }
        }
    }

    async fn deliver(&self, outcome: Result<String, AgentError>, reply: &dyn ReplySender) {
        match outcome {
            Ok(text) => {
                let _ = reply.send(&text).await;
            }
            Err(e) => {
                tracing::error!(error = %e, "run failed");
                let _ = reply.send(&format!("error: {e}")).await;
            }
        }
    }

    /// Steps 5-9: context assembly, tool set assembly, run, post-process,
    /// send/persist/followups. Returns the final reply text.
    async fn run_and_postprocess(
        &self,
        msg: &RoomMessage,
        cmd_cfg: &CommandConfig,
        resolved: &ResolvedCommand,
    ) -> Result<String, AgentError> {
        let arc = msg.arc();

        let context_messages = self.assemble_context(&arc, msg, resolved).await;

        let tools = self.tool_set.build(resolved.runtime.allowed_tools.as_deref(), None, &context_messages);

        let steering_provider = QueueSteeringProvider {
            steering: Arc::clone(&self.steering),
            key: SteeringKey::for_message(msg),
        };

        let req = PromptRequest {
            model: resolved.runtime.model.clone(),
            system_prompt: resolved.runtime.prompt.clone(),
            prompt_text: resolved.query_text.clone(),
            context_messages,
            thinking_level: resolved.runtime.reasoning_effort.map(thinking_level_for),
            vision_fallback_model: resolved.runtime.vision_model.clone(),
            refusal_fallback_model: self.config.router.refusal_fallback_model.clone(),
            tools: &tools,
        };

        let result = self
            .runner
            .run(self.model_resolver.as_ref(), req, Some(&steering_provider as &dyn SteeringProvider))
            .await?;

        let reply_text = self.apply_length_policy(cmd_cfg.response_max_bytes, result.text.clone()).await;
        let annotated = annotate_fallbacks(reply_text, &result);

        if let Err(e) = self.memory.add_message(
            &arc,
            msg.thread_id.as_deref(),
            msg.thread_starter_id.as_deref(),
            "assistant",
            &msg.mynick,
            &annotated,
            None,
            Some(&resolved.mode_key),
        ) {
            tracing::warn!(error = %e, %arc, "failed to persist assistant reply");
        }

        self.emit_followups(&arc, &result).await;

        Ok(annotated)
    }

    async fn assemble_context(&self, arc: &str, msg: &RoomMessage, resolved: &ResolvedCommand) -> Vec<Value> {
        let mut messages: Vec<Value> = Vec::new();

        if resolved.runtime.include_chapter_summary {
            if let Ok(chapter) = self.memory.get_chapter_context_messages(arc) {
                for paragraph in chapter {
                    messages.push(serde_json::json!({ "role": "user", "content": paragraph }));
                }
            }
        }

        let history = self
            .memory
            .get_context(arc, resolved.runtime.history_size, msg.thread_id.as_deref(), msg.thread_starter_id.as_deref())
            .unwrap_or_default();

        for stored in &history {
            // Drop the triggering message itself — it is re-sent as the
            // prompt text, not as prior context.
            if stored.nick == msg.nick && stored.content == msg.content {
                continue;
            }
            let role = if stored.role == "assistant" { "assistant" } else { "user" };
            messages.push(serde_json::json!({ "role": role, "content": stored.content }));
        }

        if resolved.runtime.auto_reduce_context {
            if let Some(reducer) = &self.context_reducer {
                if let Ok(reduced) = reducer.reduce(&messages).await {
                    return vec![reduced];
                }
            }
        }

        messages
    }

    /// §4.5 step 8, length policy: publish the full text as an artifact and
    /// reply with a head excerpt plus the URL when it exceeds the triggering
    /// room's configured budget.
    async fn apply_length_policy(&self, limit: usize, text: String) -> String {
        if text.len() <= limit {
            return text;
        }
        let Some(store) = &self.artifacts else { return text };
        match store.write_text(&text, "txt").await {
            Ok(url) => {
                let excerpt: String = text.chars().take(HEAD_EXCERPT_CHARS).collect();
                format!("{excerpt}\n\n[full reply: {url}]")
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to publish oversized reply as artifact");
                text
            }
        }
    }

    async fn emit_followups(&self, arc: &str, result: &PromptResult) {
        if result.usage.total_cost > 0.0 {
            if let Err(e) = self.memory.log_llm_call(
                arc,
                &result.messages.last().map(|m| m.model.clone()).unwrap_or_default(),
                &muaddib_memory::types::UsageRecord {
                    tokens_in: result.usage.input_tokens,
                    tokens_out: result.usage.output_tokens,
                    cache_read: result.usage.cache_read_tokens,
                    cache_write: result.usage.cache_write_tokens,
                    cost_usd: result.usage.total_cost,
                },
            ) {
                tracing::warn!(error = %e, "failed to log llm call cost");
            }
        }

        if let Some(generator) = &self.summary_generator {
            if let Some(summary) = generator.summarize(result).await {
                if let Err(e) = self.memory.append_paragraph(arc, &summary) {
                    tracing::warn!(error = %e, "failed to append run summary to chronicle");
                }
            }
        }
    }
}

enum ControlFlow {
    Done,
    Retry,
}

fn short_circuit_reply(resolved: &ResolvedCommand) -> Option<String> {
    if let Some(err) = &resolved.error {
        return Some(err.clone());
    }
    if resolved.help_requested {
        return Some("Available commands: !help, !c (skip context)".to_string());
    }
    None
}

fn annotate_fallbacks(mut text: String, result: &PromptResult) -> String {
    if let Some(model) = &result.vision_fallback_activated {
        text.push_str(&format!(" [image fallback to {model}]"));
    }
    if let Some(model) = &result.refusal_fallback_activated {
        text.push_str(&format!(" [refusal fallback to {model}]"));
    }
    text
}

/// Bridges the steering queue's raw `drain_steering_context` strings into
/// the runner's [`SteeringProvider`] contract.
struct QueueSteeringProvider {
    steering: Arc<SteeringQueue>,
    key: SteeringKey,
}

#[async_trait]
impl SteeringProvider for QueueSteeringProvider {
    async fn drain(&self) -> Vec<String> {
        self.steering.drain_steering_context(&self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    use muaddib_core::config::{ModeConfig, RoomConfig};

    fn mode(model: &str, triggers: &[&str], steering: bool) -> ModeConfig {
        ModeConfig {
            model: model.to_string(),
            prompt: "be helpful".to_string(),
            triggers: triggers.iter().map(|s| s.to_string()).collect(),
            reasoning_effort: None,
            allowed_tools: None,
            steering,
            auto_reduce_context: false,
            include_chapter_summary: false,
            vision_model: None,
            history_size: None,
        }
    }

    fn config_with_room(steering: bool) -> MuaddibConfig {
        let mut modes = HashMap::new();
        modes.insert("serious".to_string(), mode("mock:model", &["!s"], steering));
        let command = CommandConfig {
            history_size: 20,
            default_mode: "serious".to_string(),
            modes,
            mode_classifier: None,
            channel_modes: HashMap::new(),
            response_max_bytes: 4000,
            ignore_users: vec!["spammer".to_string()],
        };
        let mut rooms = HashMap::new();
        rooms.insert("irc".to_string(), RoomConfig { command, proactive: Default::default() });
        MuaddibConfig { rooms, ..Default::default() }
    }

    fn memory() -> Arc<MemoryManager> {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        muaddib_memory::db::init_db(&conn).unwrap();
        Arc::new(MemoryManager::new(conn))
    }

    struct EmptyTools;
    impl ToolSetBuilder for EmptyTools {
        fn build(
            &self,
            _allowed: Option<&[String]>,
            _active_quest_id: Option<&str>,
            _outer_context: &[Value],
        ) -> Vec<Box<dyn Tool>> {
            Vec::new()
        }
    }

    struct FixedResolver(Arc<dyn crate::provider::LlmProvider>);
    #[async_trait]
    impl ModelResolver for FixedResolver {
        async fn resolve(&self, _model_spec: &str) -> Result<Arc<dyn crate::provider::LlmProvider>, AgentError> {
            Ok(self.0.clone())
        }
    }

    struct AlwaysText(String);
    #[async_trait]
    impl crate::provider::LlmProvider for AlwaysText {
        fn name(&self) -> &str {
            "mock"
        }
        async fn send(&self, _req: &crate::provider::ChatRequest) -> Result<crate::provider::ChatResponse, crate::provider::ProviderError> {
            Ok(crate::provider::ChatResponse {
                content: self.0.clone(),
                model: "mock-model".to_string(),
                tokens_in: 1,
                tokens_out: 1,
                stop_reason: "stop".to_string(),
                tool_calls: Vec::new(),
            })
        }
    }

    struct CapturingReply(StdMutex<Vec<String>>);
    impl CapturingReply {
        fn new() -> Self {
            Self(StdMutex::new(Vec::new()))
        }
        fn sent(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }
    #[async_trait]
    impl ReplySender for CapturingReply {
        async fn send(&self, text: &str) -> Result<(), AgentError> {
            self.0.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    fn handler(steering: bool) -> MessageHandler {
        let config = Arc::new(config_with_room(steering));
        let memory = memory();
        let steering_q = Arc::new(SteeringQueue::new());
        let runner = Arc::new(SessionRunner::new(25));
        let resolver: Arc<dyn ModelResolver> = Arc::new(FixedResolver(Arc::new(AlwaysText("hi there".to_string()))));
        MessageHandler::new(config, memory, steering_q, runner, resolver, Arc::new(EmptyTools))
    }

    fn msg(nick: &str, content: &str) -> RoomMessage {
        RoomMessage {
            server_tag: "irc".to_string(),
            channel_name: "test".to_string(),
            nick: nick.to_string(),
            mynick: "muaddib".to_string(),
            content: content.to_string(),
            platform_id: None,
            thread_id: None,
            thread_starter_id: None,
            secrets: Default::default(),
        }
    }

    #[tokio::test]
    async fn ignored_sender_produces_no_reply() {
        let h = handler(false);
        let reply = CapturingReply::new();
        h.handle(msg("spammer", "!s hi"), &reply).await;
        assert!(reply.sent().is_empty());
    }

    #[tokio::test]
    async fn bot_echo_is_not_re_replied_to() {
        let h = handler(false);
        let reply = CapturingReply::new();
        h.handle(msg("muaddib", "hello"), &reply).await;
        assert!(reply.sent().is_empty());
    }

    #[tokio::test]
    async fn unknown_trigger_replies_with_error_text() {
        let h = handler(false);
        let reply = CapturingReply::new();
        h.handle(msg("alice", "!bogus hi"), &reply).await;
        let sent = reply.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("Unknown command"));
    }

    #[tokio::test]
    async fn help_token_short_circuits_with_help_text() {
        let h = handler(false);
        let reply = CapturingReply::new();
        h.handle(msg("alice", "!help"), &reply).await;
        let sent = reply.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("Available commands"));
    }

    #[tokio::test]
    async fn non_steering_mode_runs_synchronously_and_replies() {
        let h = handler(false);
        let reply = CapturingReply::new();
        h.handle(msg("alice", "!s hi there"), &reply).await;
        let sent = reply.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0], "hi there");
    }

    #[tokio::test]
    async fn steering_mode_runs_via_queue_and_replies() {
        let h = handler(true);
        let reply = CapturingReply::new();
        h.handle(msg("alice", "!s hi there"), &reply).await;
        let sent = reply.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0], "hi there");
    }

    #[test]
    fn fallback_annotations_are_appended() {
        let result = PromptResult {
            text: "answer".to_string(),
            stop_reason: "stop".to_string(),
            usage: Default::default(),
            iterations: 1,
            tool_calls_count: 0,
            vision_fallback_activated: Some("openai:gpt-4o".to_string()),
            refusal_fallback_activated: None,
            messages: Vec::new(),
        };
        let out = annotate_fallbacks("answer".to_string(), &result);
        assert_eq!(out, "answer [image fallback to openai:gpt-4o]");
    }
}
