//! `visit_webpage` — fetch and read a URL, with image/text branching,
//! artifact-local short-circuiting, and retry-on-block-page semantics.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;

use super::{Tool, ToolResult};

/// Fixed delay schedule for HTTP 451 ("unavailable for legal reasons", often
/// used by CDNs to signal a transient block page) and 5xx responses.
const RETRY_DELAYS_MS: &[u64] = &[500, 1500, 4000];

const MAX_TEXT_CHARS: usize = 8_000;
const MAX_IMAGE_BYTES: u64 = 5 * 1024 * 1024;

/// A URL prefix → extra request headers mapping, for sites that require an
/// auth token to fetch (configured per-deployment, not per-call).
pub struct AuthHeaderRule {
    pub url_prefix: String,
    pub headers: Vec<(String, String)>,
}

pub struct VisitWebpageTool {
    client: reqwest::Client,
    /// If the requested URL starts with this, it is read from `artifacts_dir`
    /// instead of fetched over the network.
    artifact_base_url: Option<String>,
    artifacts_dir: Option<PathBuf>,
    auth_rules: Vec<AuthHeaderRule>,
}

impl VisitWebpageTool {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            artifact_base_url: None,
            artifacts_dir: None,
            auth_rules: Vec::new(),
        }
    }

    pub fn with_artifacts(mut self, base_url: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        self.artifact_base_url = Some(base_url.into());
        self.artifacts_dir = Some(dir.into());
        self
    }

    pub fn with_auth_rule(mut self, rule: AuthHeaderRule) -> Self {
        self.auth_rules.push(rule);
        self
    }

    fn matching_headers(&self, url: &str) -> Vec<(String, String)> {
        self.auth_rules
            .iter()
            .find(|r| url.starts_with(&r.url_prefix))
            .map(|r| r.headers.clone())
            .unwrap_or_default()
    }

    /// Reads an artifact-backed URL locally, rejecting any path that would
    /// escape `artifacts_dir` via `..` segments.
    fn read_local_artifact(&self, url: &str) -> Result<String, String> {
        let base_url = self.artifact_base_url.as_ref().unwrap();
        let dir = self.artifacts_dir.as_ref().unwrap();
        let relative = url.strip_prefix(base_url.as_str()).unwrap_or("").trim_start_matches('/');
        if relative.split('/').any(|seg| seg == "..") {
            return Err("path traversal rejected".to_string());
        }
        let path = Path::new(dir).join(relative);
        std::fs::read_to_string(&path).map_err(|e| format!("failed to read artifact: {e}"))
    }
}

fn clean_text(text: &str) -> String {
    let mut cleaned = String::with_capacity(text.len());
    let mut newline_run = 0;
    for ch in text.chars() {
        if ch == '\n' {
            newline_run += 1;
            if newline_run <= 2 {
                cleaned.push(ch);
            }
        } else {
            newline_run = 0;
            cleaned.push(ch);
        }
    }
    cleaned
}

fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars).collect();
    format!("{truncated}\n... [truncated]")
}

#[async_trait]
impl Tool for VisitWebpageTool {
    fn name(&self) -> &str {
        "visit_webpage"
    }

    fn description(&self) -> &str {
        "Fetch a URL and return its textual content, or an image as a base64 blob."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": { "type": "string", "description": "http(s) URL to fetch" }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let url = match input.get("url").and_then(|v| v.as_str()) {
            Some(u) => u.to_string(),
            None => return ToolResult::error("visit_webpage requires a 'url'"),
        };
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return ToolResult::error("visit_webpage only accepts http(s) URLs");
        }

        if let Some(ref base) = self.artifact_base_url {
            if url.starts_with(base.as_str()) {
                return match self.read_local_artifact(&url) {
                    Ok(text) => ToolResult::success(truncate_text(&clean_text(&text), MAX_TEXT_CHARS)),
                    Err(e) => ToolResult::error(e),
                };
            }
        }

        let headers = self.matching_headers(&url);

        let head_resp = {
            let mut req = self.client.head(&url);
            for (k, v) in &headers {
                req = req.header(k, v);
            }
            req.send().await
        };
        let content_type = head_resp
            .ok()
            .and_then(|r| r.headers().get(reqwest::header::CONTENT_TYPE).cloned())
            .and_then(|v| v.to_str().ok().map(str::to_string))
            .unwrap_or_default();
        let is_image = content_type.starts_with("image/");

        let mut last_err = String::new();
        for (attempt, delay_ms) in std::iter::once(0).chain(RETRY_DELAYS_MS.iter().copied()).enumerate() {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
            let mut req = self.client.get(&url);
            for (k, v) in &headers {
                req = req.header(k, v);
            }
            let resp = match req.send().await {
                Ok(r) => r,
                Err(e) => {
                    last_err = e.to_string();
                    continue;
                }
            };
            let status = resp.status();
            if status.as_u16() == 451 || status.is_server_error() {
                last_err = format!("status {status}");
                continue;
            }
            if !status.is_success() {
                return ToolResult::error(format!("visit_webpage failed with status {status}"));
            }

            if is_image {
                let bytes = match resp.bytes().await {
                    Ok(b) => b,
                    Err(e) => return ToolResult::error(format!("failed to read image body: {e}")),
                };
                if bytes.len() as u64 > MAX_IMAGE_BYTES {
                    return ToolResult::error(format!(
                        "image exceeds the {MAX_IMAGE_BYTES}-byte limit ({} bytes)",
                        bytes.len()
                    ));
                }
                let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
                return ToolResult::success(format!(
                    "data:{content_type};base64,{encoded}"
                ))
                .with_image();
            }

            let text = match resp.text().await {
                Ok(t) => t,
                Err(e) => return ToolResult::error(format!("failed to read response body: {e}")),
            };
            return ToolResult::success(truncate_text(&clean_text(&text), MAX_TEXT_CHARS));
        }

        ToolResult::error(format!("visit_webpage exhausted retries: {last_err}"))
    }

    fn persist_type(&self) -> crate::types::ToolPersistType {
        crate::types::ToolPersistType::Summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_text_collapses_long_newline_runs() {
        let input = "a\n\n\n\n\nb";
        assert_eq!(clean_text(input), "a\n\nb");
    }

    #[test]
    fn truncate_text_appends_marker_when_over_budget() {
        let input = "x".repeat(10);
        let out = truncate_text(&input, 5);
        assert!(out.starts_with("xxxxx"));
        assert!(out.ends_with("[truncated]"));
    }

    #[test]
    fn truncate_text_is_noop_under_budget() {
        assert_eq!(truncate_text("short", 100), "short");
    }

    #[tokio::test]
    async fn rejects_non_http_scheme() {
        let tool = VisitWebpageTool::new(reqwest::Client::new());
        let result = tool.execute(serde_json::json!({ "url": "file:///etc/passwd" })).await;
        assert!(result.is_error);
    }
}
