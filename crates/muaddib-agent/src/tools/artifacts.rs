//! `share_artifact` / `edit_artifact` — durable text artifacts addressable
//! by URL, backed by local file storage.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use super::{Tool, ToolResult};

/// Storage backend for artifacts: writes content under `dir` and serves it
/// back under `base_url`. Shared by `share_artifact`, `edit_artifact`,
/// `generate_image`, and `visit_webpage`'s artifact-local read path.
pub struct ArtifactStore {
    dir: PathBuf,
    base_url: String,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self { dir: dir.into(), base_url: base_url.into() }
    }

    pub fn url_for(&self, filename: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), filename)
    }

    fn filename_from_url(&self, url: &str) -> Option<String> {
        url.strip_prefix(self.base_url.trim_end_matches('/'))
            .map(|rest| rest.trim_start_matches('/').to_string())
    }

    pub async fn write_text(&self, content: &str, ext: &str) -> Result<String, String> {
        let filename = format!("{}.{}", Uuid::new_v4(), ext.trim_start_matches('.'));
        let path = self.dir.join(&filename);
        tokio::fs::write(&path, content).await.map_err(|e| format!("failed to write artifact: {e}"))?;
        Ok(self.url_for(&filename))
    }

    pub async fn write_bytes(&self, bytes: &[u8], ext: &str) -> Result<String, String> {
        let filename = format!("{}.{}", Uuid::new_v4(), ext.trim_start_matches('.'));
        let path = self.dir.join(&filename);
        tokio::fs::write(&path, bytes).await.map_err(|e| format!("failed to write artifact: {e}"))?;
        Ok(self.url_for(&filename))
    }

    pub async fn read_text(&self, url: &str) -> Result<String, String> {
        let filename = self.filename_from_url(url).ok_or("url is not under this artifact store")?;
        if filename.split('/').any(|seg| seg == "..") {
            return Err("path traversal rejected".to_string());
        }
        let path = self.dir.join(filename);
        tokio::fs::read_to_string(&path).await.map_err(|e| format!("failed to read artifact: {e}"))
    }

    pub async fn overwrite_text(&self, url: &str, content: &str) -> Result<(), String> {
        let filename = self.filename_from_url(url).ok_or("url is not under this artifact store")?;
        if filename.split('/').any(|seg| seg == "..") {
            return Err("path traversal rejected".to_string());
        }
        let path = self.dir.join(filename);
        tokio::fs::write(&path, content).await.map_err(|e| format!("failed to write artifact: {e}"))
    }
}

pub struct ShareArtifactTool {
    store: Arc<ArtifactStore>,
}

impl ShareArtifactTool {
    pub fn new(store: Arc<ArtifactStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ShareArtifactTool {
    fn name(&self) -> &str {
        "share_artifact"
    }

    fn description(&self) -> &str {
        "Publish text content as a durable artifact, returning its URL."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "content": { "type": "string" },
                "extension": { "type": "string", "description": "File extension without the dot, e.g. 'md' or 'py'" }
            },
            "required": ["content"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let content = match input.get("content").and_then(|v| v.as_str()) {
            Some(c) if !c.is_empty() => c.to_string(),
            _ => return ToolResult::error("share_artifact requires non-empty 'content'"),
        };
        let ext = input.get("extension").and_then(|v| v.as_str()).unwrap_or("txt");

        match self.store.write_text(&content, ext).await {
            Ok(url) => ToolResult::success(url).with_details(serde_json::json!({ "artifact_url": true })),
            Err(e) => ToolResult::error(format!("share_artifact failed: {e}")),
        }
    }

    fn persist_type(&self) -> crate::types::ToolPersistType {
        crate::types::ToolPersistType::Artifact
    }
}

pub struct EditArtifactTool {
    store: Arc<ArtifactStore>,
}

impl EditArtifactTool {
    pub fn new(store: Arc<ArtifactStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for EditArtifactTool {
    fn name(&self) -> &str {
        "edit_artifact"
    }

    fn description(&self) -> &str {
        "Edit a previously published artifact in place by replacing a unique substring."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "artifact_url": { "type": "string" },
                "old_string": { "type": "string" },
                "new_string": { "type": "string" }
            },
            "required": ["artifact_url", "old_string", "new_string"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let artifact_url = match input.get("artifact_url").and_then(|v| v.as_str()) {
            Some(u) => u.to_string(),
            None => return ToolResult::error("edit_artifact requires 'artifact_url'"),
        };
        let old_string = match input.get("old_string").and_then(|v| v.as_str()) {
            Some(s) if !s.is_empty() => s.to_string(),
            _ => return ToolResult::error("edit_artifact requires non-empty 'old_string'"),
        };
        let new_string = input.get("new_string").and_then(|v| v.as_str()).unwrap_or("").to_string();

        let current = match self.store.read_text(&artifact_url).await {
            Ok(c) => c,
            Err(e) => return ToolResult::error(format!("edit_artifact failed to read: {e}")),
        };

        let occurrences = current.matches(old_string.as_str()).count();
        if occurrences == 0 {
            return ToolResult::error("old_string was not found in the artifact");
        }
        if occurrences > 1 {
            return ToolResult::error(format!(
                "old_string occurs {occurrences} times; it must occur exactly once"
            ));
        }

        let updated = current.replacen(old_string.as_str(), &new_string, 1);
        match self.store.overwrite_text(&artifact_url, &updated).await {
            Ok(()) => ToolResult::success(artifact_url),
            Err(e) => ToolResult::error(format!("edit_artifact failed to write: {e}")),
        }
    }

    fn persist_type(&self) -> crate::types::ToolPersistType {
        crate::types::ToolPersistType::Artifact
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> Arc<ArtifactStore> {
        let dir = std::env::temp_dir().join(format!("muaddib-artifacts-test-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        Arc::new(ArtifactStore::new(dir, "https://artifacts.example/a"))
    }

    #[tokio::test]
    async fn share_then_edit_round_trips() {
        let store = temp_store();
        let share = ShareArtifactTool::new(store.clone());
        let result = share
            .execute(serde_json::json!({ "content": "hello world", "extension": "txt" }))
            .await;
        assert!(!result.is_error);
        let url = result.content;

        let edit = EditArtifactTool::new(store);
        let result = edit
            .execute(serde_json::json!({
                "artifact_url": url,
                "old_string": "world",
                "new_string": "muaddib"
            }))
            .await;
        assert!(!result.is_error);
    }

    #[tokio::test]
    async fn edit_rejects_non_unique_match() {
        let store = temp_store();
        let share = ShareArtifactTool::new(store.clone());
        let result = share.execute(serde_json::json!({ "content": "aa aa" })).await;
        let url = result.content;

        let edit = EditArtifactTool::new(store);
        let result = edit
            .execute(serde_json::json!({ "artifact_url": url, "old_string": "aa", "new_string": "b" }))
            .await;
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn share_rejects_empty_content() {
        let store = temp_store();
        let tool = ShareArtifactTool::new(store);
        let result = tool.execute(serde_json::json!({ "content": "" })).await;
        assert!(result.is_error);
    }
}
