//! Resolves `provider:model` specs from `[providers.*]` config into live
//! `LlmProvider` adapters, caching one instance per provider id per process
//! (providers are stateless beyond their held API key/base URL, so the
//! cache is keyed on provider id, not the full spec).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use muaddib_agent::runner::ModelResolver;
use muaddib_agent::{AgentError, AnthropicProvider, OllamaProvider, OpenAiProvider};
use muaddib_agent::provider::LlmProvider;
use muaddib_agent::registry;
use muaddib_core::config::ProviderConfig;

pub struct DefaultModelResolver {
    providers: HashMap<String, ProviderConfig>,
    cache: DashMap<String, Arc<dyn LlmProvider>>,
}

impl DefaultModelResolver {
    pub fn new(providers: HashMap<String, ProviderConfig>) -> Self {
        Self { providers, cache: DashMap::new() }
    }

    /// Split `provider:model` and reject bare model identifiers, per the
    /// core's model-spec contract.
    fn split_spec(spec: &str) -> Result<(&str, &str), AgentError> {
        spec.split_once(':').ok_or_else(|| {
            AgentError::Config(format!("model spec '{spec}' must be `provider:model`, got no ':'"))
        })
    }

    /// Synchronous resolve — provider construction never actually awaits
    /// anything, so this is reused directly by tool builders that need a
    /// provider outside of the async `ModelResolver` trait (oracle,
    /// generate_image).
    pub fn resolve_provider(&self, spec: &str) -> Result<Arc<dyn LlmProvider>, AgentError> {
        let (provider_id, _model_id) = Self::split_spec(spec)?;

        if let Some(cached) = self.cache.get(provider_id) {
            return Ok(Arc::clone(&cached));
        }

        let provider = self.build_provider(provider_id)?;
        self.cache.insert(provider_id.to_string(), Arc::clone(&provider));
        Ok(provider)
    }

    fn build_provider(&self, provider_id: &str) -> Result<Arc<dyn LlmProvider>, AgentError> {
        match provider_id {
            "anthropic" => {
                let key = self.require_key("anthropic")?;
                Ok(Arc::new(AnthropicProvider::new(key, None)))
            }
            "openai" => {
                let key = self.require_key("openai")?;
                Ok(Arc::new(OpenAiProvider::new(key, None)))
            }
            "ollama" => {
                // Ollama needs no API key; `providers.ollama.key` is repurposed
                // as an optional base-url override (empty = default localhost).
                let base_url = self.providers.get("ollama").map(|p| p.key.clone()).filter(|k| !k.is_empty());
                Ok(Arc::new(OllamaProvider::new(base_url)))
            }
            other => {
                let known = registry::lookup(other).ok_or_else(|| {
                    AgentError::Config(format!("unknown provider '{other}' — not a built-in id \
                        and not in the OpenAI-compatible registry"))
                })?;
                let key = self.require_key(other)?;
                Ok(Arc::new(OpenAiProvider::with_path(
                    known.name,
                    key,
                    known.base_url.to_string(),
                    known.chat_path.to_string(),
                )))
            }
        }
    }

    fn require_key(&self, provider_id: &str) -> Result<String, AgentError> {
        self.providers
            .get(provider_id)
            .map(|p| p.key.clone())
            .ok_or_else(|| AgentError::Config(format!("providers.{provider_id} is not configured")))
    }
}

#[async_trait]
impl ModelResolver for DefaultModelResolver {
    async fn resolve(&self, model_spec: &str) -> Result<Arc<dyn LlmProvider>, AgentError> {
        self.resolve_provider(model_spec)
    }
}

/// Lets `Arc<DefaultModelResolver>` be handed to APIs expecting an owned
/// `Box<dyn ModelResolver>` (e.g. `OracleTool::new`) without duplicating the
/// provider cache.
pub struct SharedModelResolver(pub Arc<DefaultModelResolver>);

#[async_trait]
impl ModelResolver for SharedModelResolver {
    async fn resolve(&self, model_spec: &str) -> Result<Arc<dyn LlmProvider>, AgentError> {
        self.0.resolve_provider(model_spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn providers() -> HashMap<String, ProviderConfig> {
        let mut map = HashMap::new();
        map.insert(
            "anthropic".to_string(),
            ProviderConfig { key: "sk-test".to_string(), refresh: None, session: None, oauth: None },
        );
        map
    }

    #[test]
    fn rejects_unqualified_model_spec() {
        let resolver = DefaultModelResolver::new(providers());
        let err = resolver.resolve_provider("claude-3").unwrap_err();
        assert!(matches!(err, AgentError::Config(_)));
    }

    #[test]
    fn rejects_unconfigured_provider() {
        let resolver = DefaultModelResolver::new(providers());
        let err = resolver.resolve_provider("openai:gpt-4o").unwrap_err();
        assert!(matches!(err, AgentError::Config(_)));
    }

    #[test]
    fn resolves_and_caches_configured_provider() {
        let resolver = DefaultModelResolver::new(providers());
        let a = resolver.resolve_provider("anthropic:claude-3-5-sonnet-latest").unwrap();
        let b = resolver.resolve_provider("anthropic:claude-3-opus-latest").unwrap();
        assert_eq!(a.name(), "anthropic");
        assert_eq!(b.name(), "anthropic");
    }

    #[test]
    fn resolves_known_openai_compatible_registry_provider() {
        let mut providers = providers();
        providers.insert(
            "groq".to_string(),
            ProviderConfig { key: "gsk-test".to_string(), refresh: None, session: None, oauth: None },
        );
        let resolver = DefaultModelResolver::new(providers);
        let provider = resolver.resolve_provider("groq:llama-3.3-70b-versatile").unwrap();
        assert_eq!(provider.name(), "Groq");
    }
}
