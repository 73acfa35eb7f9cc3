//! A single-shot, non-streaming model call shared by the classifier,
//! context reducer, and chronicle summary generator — none of them need
//! the full turn/tool loop `SessionRunner` drives.

use muaddib_agent::provider::{ChatRequest, Message, Role};

use crate::providers::DefaultModelResolver;

const MAX_TOKENS: u32 = 512;

pub async fn complete(resolver: &DefaultModelResolver, model_spec: &str, system: &str, user: &str) -> Result<String, String> {
    let provider = resolver.resolve_provider(model_spec).map_err(|e| e.to_string())?;

    let req = ChatRequest {
        model: model_spec.rsplit_once(':').map(|(_, m)| m.to_string()).unwrap_or_else(|| model_spec.to_string()),
        system: system.to_string(),
        system_prompt: None,
        messages: vec![Message { role: Role::User, content: user.to_string() }],
        max_tokens: MAX_TOKENS,
        stream: false,
        thinking: None,
        tools: Vec::new(),
        raw_messages: None,
    };

    provider.send(&req).await.map(|resp| resp.content).map_err(|e| e.to_string())
}
