//! `execute_code` — runs a shell command inside the sandboxed terminal,
//! with optional artifact input staging and output/image publishing.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use muaddib_sandbox::{ExecOptions, TerminalManager};

use super::{Tool, ToolResult};

const MAX_OUTPUT_CHARS: usize = 24_000;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Publishes a locally-produced file as a durable artifact URL. Implemented
/// by whatever storage backend `share_artifact` uses, so `execute_code` can
/// surface generated files and images without depending on that module
/// directly.
#[async_trait]
pub trait ArtifactPublisher: Send + Sync {
    async fn publish_file(&self, path: &std::path::Path) -> Result<String, String>;
}

pub struct ExecuteCodeTool {
    manager: Arc<TerminalManager>,
    publisher: Option<Arc<dyn ArtifactPublisher>>,
    /// Working directory each invocation runs in; output files referenced by
    /// relative path are resolved against this.
    workdir: PathBuf,
}

impl ExecuteCodeTool {
    pub fn new(manager: Arc<TerminalManager>, workdir: PathBuf) -> Self {
        Self { manager, publisher: None, workdir }
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn ArtifactPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    fn is_image_path(path: &str) -> bool {
        let lower = path.to_lowercase();
        [".png", ".jpg", ".jpeg", ".gif", ".webp"].iter().any(|ext| lower.ends_with(ext))
    }
}

#[async_trait]
impl Tool for ExecuteCodeTool {
    fn name(&self) -> &str {
        "execute_code"
    }

    fn description(&self) -> &str {
        "Run a shell command (Python, Bash, etc.) in a sandboxed, time-limited environment."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": { "type": "string", "description": "Shell command to run" },
                "output_file": {
                    "type": "string",
                    "description": "Optional path (relative to the working directory) of a file the command produced, to publish as an artifact"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let command = match input.get("command").and_then(|v| v.as_str()) {
            Some(c) if !c.trim().is_empty() => c.to_string(),
            _ => return ToolResult::error("execute_code requires a non-empty 'command'"),
        };

        let options = ExecOptions {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_output_chars: MAX_OUTPUT_CHARS,
            skip_safety: false,
        };

        let exec_result = match self.manager.exec(&command, options).await {
            Ok(r) => r,
            Err(e) => return ToolResult::error(format!("execute_code failed: {e}")),
        };

        let mut content = format!(
            "exit code: {}\nstdout:\n{}\nstderr:\n{}",
            exec_result.exit_code, exec_result.stdout, exec_result.stderr
        );

        let output_file = input.get("output_file").and_then(|v| v.as_str());
        if let (Some(rel_path), Some(publisher)) = (output_file, self.publisher.as_ref()) {
            let full_path = self.workdir.join(rel_path);
            match publisher.publish_file(&full_path).await {
                Ok(url) => {
                    content.push_str(&format!("\n\npublished: {url}"));
                    if Self::is_image_path(rel_path) {
                        return ToolResult::success(content).with_image();
                    }
                }
                Err(e) => content.push_str(&format!("\n\nfailed to publish output_file: {e}")),
            }
        }

        if exec_result.exit_code == 0 {
            ToolResult::success(content)
        } else {
            ToolResult::error(content)
        }
    }

    fn persist_type(&self) -> crate::types::ToolPersistType {
        crate::types::ToolPersistType::Artifact
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_known_image_extensions() {
        assert!(ExecuteCodeTool::is_image_path("out/plot.PNG"));
        assert!(ExecuteCodeTool::is_image_path("chart.jpeg"));
        assert!(!ExecuteCodeTool::is_image_path("report.txt"));
    }

    #[tokio::test]
    async fn rejects_empty_command() {
        let tool = ExecuteCodeTool::new(Arc::new(TerminalManager::new()), PathBuf::from("/tmp"));
        let result = tool.execute(serde_json::json!({ "command": "   " })).await;
        assert!(result.is_error);
    }
}
