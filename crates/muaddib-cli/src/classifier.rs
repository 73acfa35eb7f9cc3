//! Drives a room's `mode_classifier` model: formats recent history into a
//! prompt and returns the model's raw completion as the label, which
//! `resolver.rs` then maps through `ClassifierConfig.labels`.

use std::sync::Arc;

use async_trait::async_trait;

use muaddib_agent::resolver::{Classifier, HistoryMessage};

use crate::llm::complete;
use crate::providers::DefaultModelResolver;

pub struct LlmClassifier {
    resolver: Arc<DefaultModelResolver>,
    model: String,
}

impl LlmClassifier {
    pub fn new(resolver: Arc<DefaultModelResolver>, model: impl Into<String>) -> Self {
        Self { resolver, model: model.into() }
    }
}

#[async_trait]
impl Classifier for LlmClassifier {
    async fn classify(&self, history: &[HistoryMessage]) -> Result<String, String> {
        let transcript = history
            .iter()
            .map(|m| format!("{}: {}", m.role, m.text))
            .collect::<Vec<_>>()
            .join("\n");

        let system = "Read the conversation and reply with a single word naming the topic label \
            that best matches what the user wants next. Reply with the label only, no punctuation.";

        let label = complete(&self.resolver, &self.model, system, &transcript).await?;
        Ok(label.trim().to_string())
    }
}
