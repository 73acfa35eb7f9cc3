//! `web_search` — rate-limited external search reader.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::warn;

use super::{Tool, ToolResult};

const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Serialises calls to at most one per second per process, matching the
/// teacher's min-interval gate shape used for provider health probing.
struct RateLimiter {
    last: Mutex<Option<Instant>>,
}

impl RateLimiter {
    fn new() -> Self {
        Self { last: Mutex::new(None) }
    }

    async fn acquire(&self) {
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < MIN_INTERVAL {
                tokio::time::sleep(MIN_INTERVAL - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

pub struct WebSearchTool {
    client: reqwest::Client,
    /// Jina Reader-shaped search endpoint, e.g. `https://s.jina.ai/`.
    endpoint: String,
    api_key: Option<String>,
    limiter: Arc<RateLimiter>,
}

impl WebSearchTool {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            api_key,
            limiter: Arc::new(RateLimiter::new()),
        }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for a query and return a short summary of the top results."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Search query" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let query = match input.get("query").and_then(|v| v.as_str()) {
            Some(q) if !q.trim().is_empty() => q.to_string(),
            _ => return ToolResult::error("web_search requires a non-empty 'query'"),
        };

        self.limiter.acquire().await;

        let mut req = self.client.get(format!("{}{}", self.endpoint, urlencoding::encode(&query)));
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = match req.send().await {
            Ok(r) => r,
            Err(e) => return ToolResult::error(format!("web_search request failed: {e}")),
        };

        let status = resp.status();
        if status.as_u16() == 422 {
            let body = resp.text().await.unwrap_or_default();
            if body.to_lowercase().contains("no search results") {
                return ToolResult::success("No search results were found for that query.");
            }
            return ToolResult::error(format!("web_search returned 422: {body}"));
        }
        if !status.is_success() {
            warn!(%status, "web_search non-2xx response");
            return ToolResult::error(format!("web_search failed with status {status}"));
        }

        match resp.text().await {
            Ok(text) => ToolResult::success(text),
            Err(e) => ToolResult::error(format!("failed to read web_search response body: {e}")),
        }
    }

    fn persist_type(&self) -> crate::types::ToolPersistType {
        crate::types::ToolPersistType::Summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_empty_query() {
        let tool = WebSearchTool::new(reqwest::Client::new(), "https://s.jina.ai/", None);
        let result = tool.execute(serde_json::json!({ "query": "" })).await;
        assert!(result.is_error);
    }

    #[test]
    fn persist_type_is_summary() {
        let tool = WebSearchTool::new(reqwest::Client::new(), "https://s.jina.ai/", None);
        assert_eq!(tool.persist_type(), crate::types::ToolPersistType::Summary);
    }
}
