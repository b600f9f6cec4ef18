//! Resolution of provider identifiers to ready-to-use chat backends.
//!
//! The gateway owns the [`ProviderSettings`] read at startup and a
//! per-provider cache of constructed services. Resolving the same identifier
//! twice yields the same underlying handle; construction happens at most
//! once per provider in the common case (a racing double construction keeps
//! whichever handle was inserted first).

use std::{collections::HashMap, sync::Arc};

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::{
    chat::ChatMessage,
    config::{default_config::ProviderSettings, llm_provider::LlmProvider},
    error_handler::{AiLlmError, Result},
    provider::ChatProvider,
    services::{
        anthropic_service::AnthropicService, ollama_service::OllamaService,
        open_ai_service::OpenAiService,
    },
    token_stream::TokenStream,
};

/// A resolved backend together with what it was resolved as.
#[derive(Clone)]
pub struct ProviderHandle {
    kind: LlmProvider,
    model: String,
    provider: Arc<dyn ChatProvider>,
}

impl ProviderHandle {
    pub fn new(kind: LlmProvider, model: impl Into<String>, provider: Arc<dyn ChatProvider>) -> Self {
        Self {
            kind,
            model: model.into(),
            provider,
        }
    }

    pub fn kind(&self) -> LlmProvider {
        self.kind
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// `true` when both handles point at the same backend instance.
    pub fn same_backend(&self, other: &ProviderHandle) -> bool {
        Arc::ptr_eq(&self.provider, &other.provider)
    }

    pub async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        self.provider.complete(messages).await
    }

    pub async fn stream_complete(&self, messages: &[ChatMessage]) -> Result<TokenStream> {
        self.provider.stream_complete(messages).await
    }
}

impl std::fmt::Debug for ProviderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderHandle")
            .field("kind", &self.kind)
            .field("model", &self.model)
            .finish()
    }
}

/// Caching resolver from provider identifier to [`ProviderHandle`].
#[derive(Debug)]
pub struct ProviderGateway {
    settings: ProviderSettings,
    handles: RwLock<HashMap<LlmProvider, ProviderHandle>>,
}

impl ProviderGateway {
    pub fn new(settings: ProviderSettings) -> Self {
        Self {
            settings,
            handles: RwLock::new(HashMap::new()),
        }
    }

    /// Gateway over [`ProviderSettings::from_env`].
    ///
    /// # Errors
    /// Returns [`AiLlmError::Config`] for malformed numeric env values.
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(ProviderSettings::from_env()?))
    }

    pub fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    /// Resolves `name` to a backend, constructing and caching it on first use.
    ///
    /// Every call validates `name`, cached or not.
    ///
    /// # Errors
    /// - `UnknownProvider` when `name` is outside the recognized set
    /// - `ProviderMisconfigured` when the provider lacks an endpoint or key
    pub async fn resolve(&self, name: &str) -> Result<ProviderHandle> {
        let kind: LlmProvider = name.parse().inspect_err(|e| {
            warn!(provider = %name, error = %e, "provider resolution failed");
        })?;

        if let Some(handle) = self.handles.read().await.get(&kind) {
            debug!(provider = %kind, "provider resolved from cache");
            return Ok(handle.clone());
        }

        let built = self.build(kind).inspect_err(|e| {
            warn!(provider = %kind, error = %e, "provider construction failed");
        })?;

        let mut handles = self.handles.write().await;
        let handle = handles.entry(kind).or_insert(built).clone();
        info!(provider = %kind, model = %handle.model(), "provider resolved");
        Ok(handle)
    }

    /// Installs `provider` as the cached backend for `kind`, replacing any
    /// previous one.
    pub async fn register(&self, kind: LlmProvider, model: impl Into<String>, provider: Arc<dyn ChatProvider>) {
        let handle = ProviderHandle::new(kind, model, provider);
        debug!(provider = %kind, model = %handle.model(), "provider registered");
        self.handles.write().await.insert(kind, handle);
    }

    fn build(&self, kind: LlmProvider) -> Result<ProviderHandle> {
        let cfg = self.settings.for_provider(kind).clone();
        let model = cfg.model.clone();
        let provider: Arc<dyn ChatProvider> = match kind {
            LlmProvider::Ollama => Arc::new(OllamaService::new(cfg)?),
            LlmProvider::OpenAI => Arc::new(OpenAiService::new(cfg)?),
            LlmProvider::Anthropic => Arc::new(AnthropicService::new(cfg)?),
        };
        Ok(ProviderHandle::new(kind, model, provider))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_config::{
        config_anthropic, config_ollama_chat, config_ollama_embedding, config_openai,
    };
    use crate::error_handler::ConfigError;

    fn settings() -> ProviderSettings {
        let mut openai = config_openai(120, None);
        openai.api_key = None;
        let mut anthropic = config_anthropic(120, None);
        anthropic.api_key = Some("test-key".into());
        let mut ollama = config_ollama_chat(120, None);
        ollama.endpoint = "http://127.0.0.1:11434".into();
        ProviderSettings {
            ollama,
            openai,
            anthropic,
            embedding: config_ollama_embedding(),
        }
    }

    #[tokio::test]
    async fn unknown_provider_names_the_valid_set() {
        let gw = ProviderGateway::new(settings());
        let err = gw.resolve("unknown").await.unwrap_err();
        match err {
            AiLlmError::Config(ConfigError::UnknownProvider { name, valid }) => {
                assert_eq!(name, "unknown");
                assert_eq!(valid, "ollama, anthropic, openai");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn missing_key_fails_at_resolution() {
        let gw = ProviderGateway::new(settings());
        let err = gw.resolve("openai").await.unwrap_err();
        assert!(matches!(
            err,
            AiLlmError::Config(ConfigError::ProviderMisconfigured {
                provider: LlmProvider::OpenAI,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn resolution_is_cached_and_case_insensitive() {
        let gw = ProviderGateway::new(settings());
        let a = gw.resolve("ollama").await.unwrap();
        let b = gw.resolve(" Ollama ").await.unwrap();
        assert!(a.same_backend(&b));
        assert_eq!(a.kind(), LlmProvider::Ollama);

        let c = gw.resolve("anthropic").await.unwrap();
        assert!(!a.same_backend(&c));
        assert_eq!(c.model(), gw.settings().anthropic.model);
    }
}
