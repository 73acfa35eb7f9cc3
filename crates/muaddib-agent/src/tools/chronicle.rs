//! `chronicle_read` / `chronicle_append` — the agent's long-term,
//! per-arc narrative memory, backed by `muaddib_memory::MemoryManager`.

use std::sync::Arc;

use async_trait::async_trait;
use muaddib_memory::MemoryManager;

use super::{Tool, ToolResult};

pub struct ChronicleReadTool {
    memory: Arc<MemoryManager>,
    arc: String,
}

impl ChronicleReadTool {
    pub fn new(memory: Arc<MemoryManager>, arc: impl Into<String>) -> Self {
        Self { memory, arc: arc.into() }
    }
}

#[async_trait]
impl Tool for ChronicleReadTool {
    fn name(&self) -> &str {
        "chronicle_read"
    }

    fn description(&self) -> &str {
        "Read a past chapter of this conversation's chronicle. 0 is the current chapter, 1 the one before it, and so on."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "chapters_back": {
                    "type": "integer",
                    "description": "0 for the current chapter, 1 for the previous chapter, etc.",
                    "minimum": 0
                }
            },
            "required": ["chapters_back"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let relative = match input.get("chapters_back").and_then(|v| v.as_i64()) {
            Some(n) if n >= 0 => n,
            _ => return ToolResult::error("chronicle_read requires a non-negative 'chapters_back'"),
        };

        match self.memory.render_chapter_relative(&self.arc, relative) {
            Ok(text) if text.trim().is_empty() => {
                ToolResult::success("That chapter has no recorded paragraphs.")
            }
            Ok(text) => ToolResult::success(text),
            Err(e) => ToolResult::error(format!("chronicle_read failed: {e}")),
        }
    }
}

pub struct ChronicleAppendTool {
    memory: Arc<MemoryManager>,
    arc: String,
}

impl ChronicleAppendTool {
    pub fn new(memory: Arc<MemoryManager>, arc: impl Into<String>) -> Self {
        Self { memory, arc: arc.into() }
    }
}

#[async_trait]
impl Tool for ChronicleAppendTool {
    fn name(&self) -> &str {
        "chronicle_append"
    }

    fn description(&self) -> &str {
        "Append a paragraph of durable narrative memory to the current chronicle chapter."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "text": { "type": "string", "description": "Paragraph text to record" }
            },
            "required": ["text"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let text = match input.get("text").and_then(|v| v.as_str()) {
            Some(t) if !t.trim().is_empty() => t.to_string(),
            _ => return ToolResult::error("chronicle_append requires non-empty 'text'"),
        };

        match self.memory.append_paragraph(&self.arc, &text) {
            Ok(id) => ToolResult::success(format!("recorded paragraph #{id}")),
            Err(e) => ToolResult::error(format!("chronicle_append failed: {e}")),
        }
    }

    fn persist_type(&self) -> crate::types::ToolPersistType {
        crate::types::ToolPersistType::None
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
    async fn append_then_read_round_trips() {
        let mem = memory();
        let append = ChronicleAppendTool::new(mem.clone(), "test-arc");
        let result = append.execute(serde_json::json!({ "text": "a notable thing happened" })).await;
        assert!(!result.is_error);

        let read = ChronicleReadTool::new(mem, "test-arc");
        let result = read.execute(serde_json::json!({ "chapters_back": 0 })).await;
        assert!(!result.is_error);
        assert!(result.content.contains("a notable thing happened"));
    }

    #[tokio::test]
    async fn read_rejects_negative_offset() {
        let read = ChronicleReadTool::new(memory(), "test-arc");
        let result = read.execute(serde_json::json!({ "chapters_back": -1 })).await;
        assert!(result.is_error);
    }
}
