//! Appends a one-line chronicle paragraph for each completed run, driven by
//! `tools.summary` config. Skips runs with nothing worth recording (a
//! single short turn, no tool calls).

use std::sync::Arc;

use async_trait::async_trait;

use muaddib_agent::handler::SummaryGenerator;
use muaddib_agent::types::PromptResult;

use crate::llm::complete;
use crate::providers::DefaultModelResolver;

const MIN_CHARS_WORTH_SUMMARISING: usize = 400;

pub struct ChronicleSummaryGenerator {
    resolver: Arc<DefaultModelResolver>,
    model: String,
}

impl ChronicleSummaryGenerator {
    pub fn new(resolver: Arc<DefaultModelResolver>, model: impl Into<String>) -> Self {
        Self { resolver, model: model.into() }
    }
}

#[async_trait]
impl SummaryGenerator for ChronicleSummaryGenerator {
    async fn summarize(&self, result: &PromptResult) -> Option<String> {
        if result.text.len() < MIN_CHARS_WORTH_SUMMARISING && result.tool_calls_count == 0 {
            return None;
        }

        let system = "Summarise this assistant turn in one short sentence for a running \
            conversation chronicle. No preamble.";

        complete(&self.resolver, &self.model, system, &result.text).await.ok()
    }
}
