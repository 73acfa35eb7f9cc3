//! `generate_image` — calls an image-capable model and publishes the
//! resulting images as artifacts.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;

use super::artifacts::ArtifactStore;
use super::{Tool, ToolResult};
use crate::provider::{ChatRequest, LlmProvider};

pub struct GenerateImageTool {
    provider: Arc<dyn LlmProvider>,
    model: String,
    store: Arc<ArtifactStore>,
}

impl GenerateImageTool {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>, store: Arc<ArtifactStore>) -> Self {
        Self { provider, model: model.into(), store }
    }

    /// Pulls every `data:image/...;base64,...` blob out of a model's text
    /// response. Image-capable chat endpoints in this ecosystem return
    /// generated images inline in the response text rather than as a
    /// separate structured field.
    fn extract_data_uris(text: &str) -> Vec<(String, String)> {
        let mut found = Vec::new();
        let mut rest = text;
        while let Some(start) = rest.find("data:image/") {
            let candidate = &rest[start..];
            let comma = match candidate.find(',') {
                Some(i) => i,
                None => break,
            };
            let header = &candidate[..comma];
            let mime = header.trim_start_matches("data:").split(';').next().unwrap_or("image/png");
            let ext = mime.split('/').nth(1).unwrap_or("png").to_string();

            let payload_start = comma + 1;
            let end = candidate[payload_start..]
                .find(|c: char| c.is_whitespace() || c == '"' || c == ')')
                .map(|i| payload_start + i)
                .unwrap_or(candidate.len());
            found.push((ext, candidate[payload_start..end].to_string()));
            rest = &candidate[end..];
        }
        found
    }
}

#[async_trait]
impl Tool for GenerateImageTool {
    fn name(&self) -> &str {
        "generate_image"
    }

    fn description(&self) -> &str {
        "Generate one or more images from a text prompt, optionally conditioned on reference images."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "prompt": { "type": "string" },
                "image_urls": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Optional reference image URLs"
                }
            },
            "required": ["prompt"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let prompt = match input.get("prompt").and_then(|v| v.as_str()) {
            Some(p) if !p.trim().is_empty() => p.to_string(),
            _ => return ToolResult::error("generate_image requires a non-empty 'prompt'"),
        };
        let image_urls: Vec<String> = input
            .get("image_urls")
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();

        let mut full_prompt = prompt.clone();
        if !image_urls.is_empty() {
            full_prompt.push_str("\n\nReference images:\n");
            full_prompt.push_str(&image_urls.join("\n"));
        }

        let request = ChatRequest {
            model: self.model.clone(),
            system: "You generate images and return them inline as base64 data URIs.".to_string(),
            system_prompt: None,
            messages: Vec::new(),
            max_tokens: 4096,
            stream: false,
            thinking: None,
            tools: Vec::new(),
            raw_messages: Some(vec![serde_json::json!({
                "role": "user",
                "content": full_prompt,
            })]),
        };

        let response = match self.provider.send(&request).await {
            Ok(r) => r,
            Err(e) => return ToolResult::error(format!("generate_image failed: {e}")),
        };

        let images = Self::extract_data_uris(&response.content);
        if images.is_empty() {
            return ToolResult::error("generate_image did not return any images");
        }

        let mut urls = Vec::new();
        for (ext, b64) in &images {
            let bytes = match base64::engine::general_purpose::STANDARD.decode(b64) {
                Ok(b) => b,
                Err(e) => return ToolResult::error(format!("generate_image produced invalid base64: {e}")),
            };
            match self.store.write_bytes(&bytes, ext).await {
                Ok(url) => urls.push(url),
                Err(e) => return ToolResult::error(format!("generate_image failed to publish: {e}")),
            }
        }

        ToolResult::success(format!("Generated {} image(s):\n{}", urls.len(), urls.join("\n")))
            .with_image()
    }

    fn persist_type(&self) -> crate::types::ToolPersistType {
        crate::types::ToolPersistType::Artifact
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_a_single_data_uri() {
        let text = "Here you go: data:image/png;base64,QUJD and done.";
        let found = GenerateImageTool::extract_data_uris(text);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, "png");
        assert_eq!(found[0].1, "QUJD");
    }

    #[test]
    fn extracts_multiple_data_uris() {
        let text = "data:image/png;base64,AAA data:image/jpeg;base64,BBB";
        let found = GenerateImageTool::extract_data_uris(text);
        assert_eq!(found.len(), 2);
        assert_eq!(found[1].0, "jpeg");
    }

    #[test]
    fn returns_empty_for_plain_text() {
        assert!(GenerateImageTool::extract_data_uris("no images here").is_empty());
    }
}
