pub mod anthropic_service;
pub mod ollama_service;
pub mod open_ai_service;
pub(crate) mod stream_decoder;

use std::time::Duration;

use tracing::error;

use crate::{
    config::{llm_model_config::LlmModelConfig, llm_provider::LlmProvider},
    error_handler::{
        AiLlmError, ConfigError, HttpError, ProviderError, ProviderErrorKind, is_http_endpoint,
        make_snippet,
    },
};

/// Fallback when a config carries no explicit timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

pub(crate) fn timeout_of(cfg: &LlmModelConfig) -> Duration {
    cfg.timeout_secs
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_TIMEOUT)
}

/// Rejects configs that cannot possibly reach their backend.
pub(crate) fn validate_endpoint(cfg: &LlmModelConfig) -> Result<(), AiLlmError> {
    if cfg.endpoint.trim().is_empty() || !is_http_endpoint(&cfg.endpoint) {
        return Err(ConfigError::ProviderMisconfigured {
            provider: cfg.provider,
            reason: format!(
                "endpoint {:?} must start with http:// or https://",
                cfg.endpoint
            ),
        }
        .into());
    }
    if cfg.model.trim().is_empty() {
        return Err(ConfigError::ProviderMisconfigured {
            provider: cfg.provider,
            reason: "model name must not be empty".into(),
        }
        .into());
    }
    Ok(())
}

/// Passes 2xx responses through; turns anything else into `HttpStatus`.
pub(crate) async fn ensure_success(
    provider: LlmProvider,
    url: &str,
    resp: reqwest::Response,
) -> Result<reqwest::Response, AiLlmError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let text = resp.text().await.unwrap_or_default();
    let snippet = make_snippet(&text);

    error!(%provider, %status, %url, %snippet, "upstream returned non-success status");

    Err(ProviderError::new(
        provider,
        ProviderErrorKind::HttpStatus(HttpError {
            status,
            url: url.to_string(),
            snippet,
        }),
    )
    .into())
}

pub(crate) fn decode_error(provider: LlmProvider, what: impl Into<String>) -> AiLlmError {
    ProviderError::new(provider, ProviderErrorKind::Decode(what.into())).into()
}
