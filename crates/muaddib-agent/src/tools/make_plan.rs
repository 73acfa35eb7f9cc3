//! `make_plan` — persists a plan entry to the current arc's chronicle.

use std::sync::Arc;

use async_trait::async_trait;
use muaddib_memory::MemoryManager;

use super::{Tool, ToolResult};

pub struct MakePlanTool {
    memory: Arc<MemoryManager>,
    arc: String,
}

impl MakePlanTool {
    pub fn new(memory: Arc<MemoryManager>, arc: impl Into<String>) -> Self {
        Self { memory, arc: arc.into() }
    }
}

#[async_trait]
impl Tool for MakePlanTool {
    fn name(&self) -> &str {
        "make_plan"
    }

    fn description(&self) -> &str {
        "Record a short plan for the current conversation arc before acting on it."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "plan": { "type": "string" }
            },
            "required": ["plan"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let plan = match input.get("plan").and_then(|v| v.as_str()) {
            Some(p) if !p.trim().is_empty() => p.to_string(),
            _ => return ToolResult::error("make_plan requires non-empty 'plan'"),
        };

        let entry = format!("Plan: {plan}");
        match self.memory.append_paragraph(&self.arc, &entry) {
            Ok(_) => ToolResult::success("Plan recorded."),
            Err(e) => ToolResult::error(format!("make_plan failed to record: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory() -> Arc<MemoryManager> {
        let conn = rusqlite::Connection::open_in_memory().expect("in-memory db");
        muaddib_memory::db::init_db(&conn).expect("schema init");
        Arc::new(MemoryManager::new(conn))
    }

    #[tokio::test]
    async fn records_a_nonempty_plan() {
        let tool = MakePlanTool::new(memory(), "test-arc");
        let result = tool.execute(serde_json::json!({ "plan": "ship the thing" })).await;
        assert!(!result.is_error);
    }

    #[tokio::test]
    async fn rejects_empty_plan() {
        let tool = MakePlanTool::new(memory(), "test-arc");
        let result = tool.execute(serde_json::json!({ "plan": "" })).await;
        assert!(result.is_error);
    }
}
