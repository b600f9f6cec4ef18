//! Provider configs loaded from environment variables.
//!
//! Every provider gets a [`LlmModelConfig`] regardless of which one is
//! selected: missing credentials are **not** an error here. They surface as
//! [`ConfigError::ProviderMisconfigured`] only when the provider is resolved
//! by the gateway, so a deployment that never uses OpenAI does not need an
//! OpenAI key.
//!
//! # Environment variables
//!
//! Common:
//! - `LLM_TIMEOUT_SECS` = wall-clock bound per provider call (default `120`)
//! - `LLM_MAX_TOKENS`   = optional max tokens (u32)
//!
//! Ollama:
//! - `OLLAMA_BASE_URL`        (default `http://localhost:11434`)
//! - `OLLAMA_MODEL`           (default `llama3.2`)
//! - `OLLAMA_EMBEDDING_MODEL` (default `nomic-embed-text`)
//!
//! OpenAI:
//! - `OPENAI_API_KEY` (required when selected)
//! - `OPENAI_MODEL`    (default `gpt-4o`)
//! - `OPENAI_BASE_URL` (default `https://api.openai.com`)
//!
//! Anthropic:
//! - `ANTHROPIC_API_KEY` (required when selected)
//! - `ANTHROPIC_MODEL`    (default `claude-sonnet-4-6`)
//! - `ANTHROPIC_BASE_URL` (default `https://api.anthropic.com`)

use crate::{
    config::{llm_model_config::LlmModelConfig, llm_provider::LlmProvider},
    error_handler::{AiLlmError, env_opt_u32, env_opt_u64, env_or},
};

/// Default wall-clock bound for one provider call.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Configs for every recognized provider plus the embedding model.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSettings {
    pub ollama: LlmModelConfig,
    pub openai: LlmModelConfig,
    pub anthropic: LlmModelConfig,
    pub embedding: LlmModelConfig,
}

impl ProviderSettings {
    /// Reads all provider configs from the environment.
    ///
    /// # Errors
    /// Returns [`AiLlmError::Config`] only for malformed numeric values.
    pub fn from_env() -> Result<Self, AiLlmError> {
        let timeout = env_opt_u64("LLM_TIMEOUT_SECS")?.unwrap_or(DEFAULT_TIMEOUT_SECS);
        let max_tokens = env_opt_u32("LLM_MAX_TOKENS")?;

        Ok(Self {
            ollama: config_ollama_chat(timeout, max_tokens),
            openai: config_openai(timeout, max_tokens),
            anthropic: config_anthropic(timeout, max_tokens),
            embedding: config_ollama_embedding(),
        })
    }

    /// Returns the config for `provider`.
    pub fn for_provider(&self, provider: LlmProvider) -> &LlmModelConfig {
        match provider {
            LlmProvider::Ollama => &self.ollama,
            LlmProvider::OpenAI => &self.openai,
            LlmProvider::Anthropic => &self.anthropic,
        }
    }
}

fn ollama_endpoint() -> String {
    env_or("OLLAMA_BASE_URL", "http://localhost:11434")
}

fn api_key(var: &'static str) -> Option<String> {
    std::env::var(var).ok().filter(|k| !k.trim().is_empty())
}

/// Ollama chat model.
///
/// # Defaults
/// - `temperature = Some(0.7)`
/// - `top_p = Some(0.9)`
pub fn config_ollama_chat(timeout_secs: u64, max_tokens: Option<u32>) -> LlmModelConfig {
    LlmModelConfig {
        provider: LlmProvider::Ollama,
        model: env_or("OLLAMA_MODEL", "llama3.2"),
        endpoint: ollama_endpoint(),
        api_key: None,
        max_tokens,
        temperature: Some(0.7),
        top_p: Some(0.9),
        timeout_secs: Some(timeout_secs),
    }
}

/// Ollama embedding model used by the context retriever.
///
/// # Defaults
/// - `temperature = Some(0.0)` (deterministic)
/// - `timeout_secs = Some(30)`
pub fn config_ollama_embedding() -> LlmModelConfig {
    LlmModelConfig {
        provider: LlmProvider::Ollama,
        model: env_or("OLLAMA_EMBEDDING_MODEL", "nomic-embed-text"),
        endpoint: ollama_endpoint(),
        api_key: None,
        max_tokens: None,
        temperature: Some(0.0),
        top_p: None,
        timeout_secs: Some(30),
    }
}

/// OpenAI chat model. The key stays `None` when `OPENAI_API_KEY` is unset.
pub fn config_openai(timeout_secs: u64, max_tokens: Option<u32>) -> LlmModelConfig {
    LlmModelConfig {
        provider: LlmProvider::OpenAI,
        model: env_or("OPENAI_MODEL", "gpt-4o"),
        endpoint: env_or("OPENAI_BASE_URL", "https://api.openai.com"),
        api_key: api_key("OPENAI_API_KEY"),
        max_tokens,
        temperature: Some(0.7),
        top_p: None,
        timeout_secs: Some(timeout_secs),
    }
}

/// Anthropic chat model. The key stays `None` when `ANTHROPIC_API_KEY` is unset.
pub fn config_anthropic(timeout_secs: u64, max_tokens: Option<u32>) -> LlmModelConfig {
    LlmModelConfig {
        provider: LlmProvider::Anthropic,
        model: env_or("ANTHROPIC_MODEL", "claude-sonnet-4-6"),
        endpoint: env_or("ANTHROPIC_BASE_URL", "https://api.anthropic.com"),
        api_key: api_key("ANTHROPIC_API_KEY"),
        max_tokens,
        temperature: Some(0.7),
        top_p: None,
        timeout_secs: Some(timeout_secs),
    }
}
