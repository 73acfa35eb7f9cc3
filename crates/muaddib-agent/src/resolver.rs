//! Command resolver — parses a room message's prefix tokens, decides the
//! mode/trigger (explicit, channel policy, or classifier), and assembles the
//! effective runtime settings for the session runner.

use std::collections::HashMap;

use async_trait::async_trait;
use muaddib_core::config::{CommandConfig, ModeConfig};

use crate::types::{ReasoningEffort, ResolvedCommand, ResolvedRuntime};

/// A single prior message in the resolver's view of history, for classifier
/// routing only (`role` is `"user"` or `"assistant"`).
#[derive(Debug, Clone)]
pub struct HistoryMessage {
    pub role: String,
    pub text: String,
}

/// Classifies recent history into one of the room's configured mode labels.
/// Implemented over a model call in production; scripted in tests.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, history: &[HistoryMessage]) -> Result<String, String>;
}

const HELP_TOKEN: &str = "!help";
const NO_CONTEXT_TOKEN: &str = "!c";

/// Resolves room messages against one room's `CommandConfig`.
pub struct CommandResolver<'a> {
    config: &'a CommandConfig,
    /// trigger token → mode key, built once from `config.modes`.
    triggers: HashMap<&'a str, &'a str>,
}

impl<'a> CommandResolver<'a> {
    pub fn new(config: &'a CommandConfig) -> Self {
        let mut triggers = HashMap::new();
        for (mode_key, mode) in &config.modes {
            for trigger in &mode.triggers {
                triggers.insert(trigger.as_str(), mode_key.as_str());
            }
        }
        Self { config, triggers }
    }

    fn mode(&self, mode_key: &str) -> Option<&'a ModeConfig> {
        self.config.modes.get(mode_key)
    }

    fn default_trigger(&self, mode_key: &str) -> Option<&'a str> {
        self.mode(mode_key)?.triggers.first().map(String::as_str)
    }

    fn build_runtime(&self, mode_key: &str) -> Option<ResolvedRuntime> {
        let mode = self.mode(mode_key)?;
        Some(ResolvedRuntime {
            model: mode.model.clone(),
            prompt: mode.prompt.clone(),
            reasoning_effort: mode.reasoning_effort.as_deref().and_then(parse_effort),
            allowed_tools: mode.allowed_tools.clone(),
            steering: mode.steering,
            auto_reduce_context: mode.auto_reduce_context,
            include_chapter_summary: mode.include_chapter_summary,
            vision_model: mode.vision_model.clone(),
            history_size: mode.history_size.unwrap_or(self.config.history_size),
        })
    }

    /// Resolve one message. `arc` is `serverTag#channelName`; `classifier`
    /// is consulted only when the channel's policy requires it.
    pub async fn resolve(
        &self,
        arc: &str,
        content: &str,
        history: &[HistoryMessage],
        classifier: Option<&dyn Classifier>,
    ) -> ResolvedCommand {
        let tokens: Vec<&str> = content.split_whitespace().collect();

        let mut no_context = false;
        let mut explicit_trigger: Option<&str> = None;
        let mut model_override: Option<String> = None;
        let mut consumed = 0usize;

        for tok in &tokens {
            if *tok == HELP_TOKEN {
                return ResolvedCommand::help();
            }
            if *tok == NO_CONTEXT_TOKEN {
                no_context = true;
                consumed += 1;
                continue;
            }
            if let Some(stripped) = tok.strip_prefix('@') {
                if model_override.is_none() && !stripped.is_empty() {
                    model_override = Some(stripped.to_string());
                    consumed += 1;
                    continue;
                }
                // A second `@…` token is not a prefix token; stop consuming.
                break;
            }
            if let Some(trigger_word) = tok.strip_prefix('!') {
                let trigger = *tok;
                if self.triggers.contains_key(trigger) {
                    if explicit_trigger.is_some() {
                        return ResolvedCommand::error(format!(
                            "Only one mode trigger is allowed per message (got a second: '{trigger}')"
                        ));
                    }
                    explicit_trigger = Some(trigger);
                    consumed += 1;
                    continue;
                }
                return ResolvedCommand::error(format!("Unknown command '!{trigger_word}'"));
            }
            break;
        }

        let query_text = tokens[consumed..].join(" ").trim().to_string();

        let (mode_key, selected_trigger, selected_automatically) = if let Some(trigger) =
            explicit_trigger
        {
            let mode_key = self.triggers.get(trigger).copied().unwrap();
            (mode_key.to_string(), trigger.to_string(), false)
        } else {
            match self.resolve_via_channel_policy(arc, history, classifier).await {
                Ok(pair) => pair,
                Err(e) => return ResolvedCommand::error(e),
            }
        };

        let mut runtime = match self.build_runtime(&mode_key) {
            Some(r) => r,
            None => {
                return ResolvedCommand::error(format!(
                    "internal error: resolved mode '{mode_key}' has no configuration"
                ))
            }
        };
        if let Some(ref model) = model_override {
            // `@model` overrides only the model identifier, not the rest of
            // the mode's runtime — it is preserved through classifier routing.
            runtime.model = model.clone();
        }

        ResolvedCommand {
            mode_key,
            selected_trigger,
            selected_automatically,
            runtime,
            query_text,
            no_context,
            model_override,
            error: None,
            help_requested: false,
        }
    }

    async fn resolve_via_channel_policy(
        &self,
        arc: &str,
        history: &[HistoryMessage],
        classifier: Option<&dyn Classifier>,
    ) -> Result<(String, String, bool), String> {
        let policy = self
            .config
            .channel_modes
            .get(arc)
            .map(String::as_str)
            .unwrap_or(self.config.default_mode.as_str());

        if let Some(forced_mode_key) = policy.strip_prefix("classifier:") {
            let label = self.run_classifier(history, classifier).await?;
            let trigger = self.label_to_trigger(&label)?;
            let picked_mode = self.triggers.get(trigger.as_str()).copied().unwrap_or("");
            if picked_mode == forced_mode_key {
                return Ok((picked_mode.to_string(), trigger, true));
            }
            let forced_trigger = self.default_trigger(forced_mode_key).ok_or_else(|| {
                format!("channel policy references unknown mode '{forced_mode_key}'")
            })?;
            return Ok((forced_mode_key.to_string(), forced_trigger.to_string(), true));
        }

        if policy == "classifier" {
            let label = self.run_classifier(history, classifier).await?;
            let trigger = self.label_to_trigger(&label)?;
            let mode_key = self.triggers.get(trigger.as_str()).copied().unwrap_or("");
            return Ok((mode_key.to_string(), trigger, true));
        }

        if let Some(mode_key) = self.triggers.get(policy) {
            // Policy names a bare trigger token directly.
            return Ok((mode_key.to_string(), policy.to_string(), true));
        }

        if let Some(trigger) = self.default_trigger(policy) {
            // Policy names a mode key; use its default trigger.
            return Ok((policy.to_string(), trigger.to_string(), true));
        }

        Err(format!("unknown channel-mode policy '{policy}' for '{arc}'"))
    }

    async fn run_classifier(
        &self,
        history: &[HistoryMessage],
        classifier: Option<&dyn Classifier>,
    ) -> Result<String, String> {
        let classifier = classifier
            .ok_or_else(|| "channel policy requires a classifier but none is configured".to_string())?;
        classifier
            .classify(history)
            .await
            .map_err(|e| format!("classifier error: {e}"))
    }

    fn label_to_trigger(&self, label: &str) -> Result<String, String> {
        let classifier_cfg = self.config.mode_classifier.as_ref().ok_or_else(|| {
            "classifier routing requested but no modeClassifier is configured".to_string()
        })?;
        if let Some(trigger) = classifier_cfg.labels.get(label) {
            return Ok(trigger.clone());
        }
        classifier_cfg
            .labels
            .get(&classifier_cfg.fallback_label)
            .cloned()
            .ok_or_else(|| {
                format!(
                    "classifier returned unmapped label '{label}' and fallback label \
                     '{}' is also unmapped",
                    classifier_cfg.fallback_label
                )
            })
    }
}

fn parse_effort(s: &str) -> Option<ReasoningEffort> {
    match s.to_lowercase().as_str() {
        "low" => Some(ReasoningEffort::Low),
        "medium" => Some(ReasoningEffort::Medium),
        "high" => Some(ReasoningEffort::High),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use muaddib_core::config::ClassifierConfig;

    fn mode(model: &str, triggers: &[&str]) -> ModeConfig {
        ModeConfig {
            model: model.to_string(),
            prompt: "be helpful".to_string(),
            triggers: triggers.iter().map(|s| s.to_string()).collect(),
            reasoning_effort: None,
            allowed_tools: None,
            steering: true,
            auto_reduce_context: false,
            include_chapter_summary: false,
            vision_model: None,
            history_size: None,
        }
    }

    fn config() -> CommandConfig {
        let mut modes = HashMap::new();
        modes.insert("serious".to_string(), mode("openai:gpt-4o", &["!s"]));
        modes.insert("silly".to_string(), mode("openai:gpt-4o-mini", &["!silly"]));
        CommandConfig {
            history_size: 20,
            default_mode: "serious".to_string(),
            modes,
            mode_classifier: None,
            channel_modes: HashMap::new(),
            response_max_bytes: 4000,
            ignore_users: Vec::new(),
        }
    }

    #[tokio::test]
    async fn explicit_trigger_selects_mode() {
        let cfg = config();
        let resolver = CommandResolver::new(&cfg);
        let out = resolver.resolve("irc#test", "!silly hello there", &[], None).await;
        assert_eq!(out.mode_key, "silly");
        assert_eq!(out.selected_trigger, "!silly");
        assert!(!out.selected_automatically);
        assert_eq!(out.query_text, "hello there");
    }

    #[tokio::test]
    async fn unknown_bang_token_is_an_error() {
        let cfg = config();
        let resolver = CommandResolver::new(&cfg);
        let out = resolver.resolve("irc#test", "!bogus hi", &[], None).await;
        assert!(out.error.is_some());
    }

    #[tokio::test]
    async fn help_short_circuits() {
        let cfg = config();
        let resolver = CommandResolver::new(&cfg);
        let out = resolver.resolve("irc#test", "!help", &[], None).await;
        assert!(out.help_requested);
        assert!(out.error.is_none());
    }

    #[tokio::test]
    async fn no_context_flag_is_consumed() {
        let cfg = config();
        let resolver = CommandResolver::new(&cfg);
        let out = resolver.resolve("irc#test", "!c !silly hi", &[], None).await;
        assert!(out.no_context);
        assert_eq!(out.mode_key, "silly");
        assert_eq!(out.query_text, "hi");
    }

    #[tokio::test]
    async fn model_override_is_preserved() {
        let cfg = config();
        let resolver = CommandResolver::new(&cfg);
        let out = resolver
            .resolve("irc#test", "@anthropic:claude-opus !silly hi", &[], None)
            .await;
        assert_eq!(out.model_override.as_deref(), Some("anthropic:claude-opus"));
        assert_eq!(out.runtime.model, "anthropic:claude-opus");
    }

    #[tokio::test]
    async fn duplicate_trigger_in_one_message_is_an_error() {
        let cfg = config();
        let resolver = CommandResolver::new(&cfg);
        let out = resolver.resolve("irc#test", "!s !silly hi", &[], None).await;
        assert!(out.error.is_some());
    }

    #[tokio::test]
    async fn falls_back_to_default_mode_with_no_channel_policy() {
        let cfg = config();
        let resolver = CommandResolver::new(&cfg);
        let out = resolver.resolve("irc#unmapped", "plain text", &[], None).await;
        assert_eq!(out.mode_key, "serious");
        assert!(out.selected_automatically);
        assert_eq!(out.query_text, "plain text");
    }

    struct FixedClassifier(&'static str);

    #[async_trait]
    impl Classifier for FixedClassifier {
        async fn classify(&self, _history: &[HistoryMessage]) -> Result<String, String> {
            Ok(self.0.to_string())
        }
    }

    #[tokio::test]
    async fn classifier_policy_maps_label_to_trigger() {
        let mut cfg = config();
        let mut labels = HashMap::new();
        labels.insert("joke".to_string(), "!silly".to_string());
        labels.insert("serious".to_string(), "!s".to_string());
        cfg.mode_classifier = Some(ClassifierConfig {
            model: "openai:gpt-4o-mini".to_string(),
            labels,
            fallback_label: "serious".to_string(),
        });
        cfg.channel_modes.insert("irc#test".to_string(), "classifier".to_string());
        let resolver = CommandResolver::new(&cfg);
        let classifier = FixedClassifier("joke");
        let out = resolver
            .resolve("irc#test", "make me laugh", &[], Some(&classifier))
            .await;
        assert_eq!(out.mode_key, "silly");
        assert!(out.selected_automatically);
    }

    #[tokio::test]
    async fn classifier_pinned_mode_overrides_mismatched_pick() {
        let mut cfg = config();
        let mut labels = HashMap::new();
        labels.insert("joke".to_string(), "!silly".to_string());
        labels.insert("serious".to_string(), "!s".to_string());
        cfg.mode_classifier = Some(ClassifierConfig {
            model: "openai:gpt-4o-mini".to_string(),
            labels,
            fallback_label: "serious".to_string(),
        });
        cfg.channel_modes
            .insert("irc#test".to_string(), "classifier:serious".to_string());
        let resolver = CommandResolver::new(&cfg);
        let classifier = FixedClassifier("joke");
        let out = resolver
            .resolve("irc#test", "make me laugh", &[], Some(&classifier))
            .await;
        assert_eq!(out.mode_key, "serious");
    }

    #[tokio::test]
    async fn bare_trigger_policy_is_forced() {
        let mut cfg = config();
        cfg.channel_modes.insert("irc#test".to_string(), "!silly".to_string());
        let resolver = CommandResolver::new(&cfg);
        let out = resolver.resolve("irc#test", "anything", &[], None).await;
        assert_eq!(out.selected_trigger, "!silly");
        assert_eq!(out.mode_key, "silly");
    }

    #[test]
    fn prefix_parsing_is_idempotent() {
        // A message with no prefix tokens re-parses to the same query text.
        let cfg = config();
        let resolver = CommandResolver::new(&cfg);
        let tokens: Vec<&str> = "just a plain sentence".split_whitespace().collect();
        let once = tokens.join(" ");
        let _ = resolver; // resolver unused in this pure-tokenizer check
        assert_eq!(once, "just a plain sentence");
    }
}
