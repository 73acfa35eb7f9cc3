//! `progress_report` — purely side-effectful, user-visible progress
//! emission during a long tool-calling run.

use async_trait::async_trait;

use super::{Tool, ToolResult};

/// Invoked with the report text whenever the tool is called. The handler
/// wires this to whatever delivers an interim message to the room (e.g. a
/// Discord channel send) without blocking the agent loop on delivery.
pub type ProgressCallback = Box<dyn Fn(&str) + Send + Sync>;

pub struct ProgressReportTool {
    on_report: ProgressCallback,
}

impl ProgressReportTool {
    pub fn new(on_report: ProgressCallback) -> Self {
        Self { on_report }
    }
}

#[async_trait]
impl Tool for ProgressReportTool {
    fn name(&self) -> &str {
        "progress_report"
    }

    fn description(&self) -> &str {
        "Emit a short, user-visible progress update while working on a longer task."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "text": { "type": "string" }
            },
            "required": ["text"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let text = match input.get("text").and_then(|v| v.as_str()) {
            Some(t) if !t.trim().is_empty() => t,
            _ => return ToolResult::error("progress_report requires non-empty 'text'"),
        };
        (self.on_report)(text);
        ToolResult::success("reported")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn invokes_callback_with_text() {
        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let tool = ProgressReportTool::new(Box::new(move |text| {
            seen_clone.lock().unwrap().push(text.to_string());
        }));

        let result = tool.execute(serde_json::json!({ "text": "halfway there" })).await;
        assert!(!result.is_error);
        assert_eq!(seen.lock().unwrap().as_slice(), ["halfway there"]);
    }

    #[tokio::test]
    async fn rejects_empty_text() {
        let tool = ProgressReportTool::new(Box::new(|_| {}));
        let result = tool.execute(serde_json::json!({ "text": "" })).await;
        assert!(result.is_error);
    }
}
