//! Health probes for LLM backends (Ollama, OpenAI, Anthropic).
//!
//! - Ollama: `GET {endpoint}/api/tags` (best-effort model existence check)
//! - OpenAI: `GET {endpoint}/v1/models` with Bearer auth
//! - Anthropic: `GET {endpoint}/v1/models` with `x-api-key`
//!
//! The returned [`HealthStatus`] is JSON-serializable and suitable for a `/health` endpoint.
//! [`HealthService::check`] is resilient and never fails (errors mapped to `ok=false`).
//! Provider-specific probes (`try_*`) return strict `Result`.

use std::time::{Duration, Instant};

use futures::future::join_all;
use reqwest::header;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::llm_model_config::LlmModelConfig;
use crate::config::llm_provider::LlmProvider;
use crate::error_handler::{AiLlmError, HealthError, HttpError, is_http_endpoint, make_snippet};
use crate::services::anthropic_service::ANTHROPIC_VERSION;

/// A serializable health snapshot for a single provider/config.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    /// Backend/provider identifier (`ollama`, `openai`, `anthropic`).
    pub provider: LlmProvider,
    /// Target endpoint base URL.
    pub endpoint: String,
    /// Model the probe looked for.
    pub model: Option<String>,
    /// Overall health flag.
    pub ok: bool,
    /// Measured HTTP latency in milliseconds for the main probe.
    pub latency_ms: u128,
    /// Short human-readable message with details.
    pub message: String,
}

impl HealthStatus {
    #[inline]
    fn new(cfg: &LlmModelConfig, ok: bool, latency_ms: u128, message: impl Into<String>) -> Self {
        Self {
            provider: cfg.provider,
            endpoint: cfg.endpoint.clone(),
            model: Some(cfg.model.clone()),
            ok,
            latency_ms,
            message: message.into(),
        }
    }
}

/// One model known to the local Ollama runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OllamaModel {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<String>,
}

// Expected minimal JSON: { "models": [ { "name": "<model>" }, ... ] }
#[derive(Deserialize)]
struct Tags {
    models: Option<Vec<OllamaModel>>,
}

// Expected minimal JSON: { "data": [ { "id": "<model>" }, ... ] }
#[derive(Deserialize)]
struct ModelItem {
    id: String,
}
#[derive(Deserialize)]
struct Models {
    data: Vec<ModelItem>,
}

/// A universal health checker that reuses a single HTTP client.
///
/// Individual probes may override the client timeout per request based on
/// the provided config.
#[derive(Debug)]
pub struct HealthService {
    client: reqwest::Client,
    default_timeout: Duration,
}

impl HealthService {
    /// Creates a new health service with an optional client timeout (seconds).
    ///
    /// # Errors
    /// Returns [`AiLlmError::HttpTransport`] if the HTTP client cannot be built.
    pub fn new(timeout_secs: Option<u64>) -> Result<Self, AiLlmError> {
        let timeout = Duration::from_secs(timeout_secs.unwrap_or(10));
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        info!(
            default_timeout_secs = timeout.as_secs(),
            "HealthService initialized"
        );

        Ok(Self {
            client,
            default_timeout: timeout,
        })
    }

    /// Checks health for a single LLM config, routing to the provider-specific probe.
    ///
    /// Never returns an error: any failure becomes `HealthStatus { ok: false, .. }`.
    pub async fn check(&self, cfg: &LlmModelConfig) -> HealthStatus {
        if cfg.endpoint.trim().is_empty() || !is_http_endpoint(&cfg.endpoint) {
            warn!(
                provider = %cfg.provider,
                endpoint = %cfg.endpoint,
                "invalid endpoint (empty or missing http/https)"
            );
            return HealthStatus::new(cfg, false, 0, "endpoint is empty or missing http/https");
        }

        let start = Instant::now();
        let result = match cfg.provider {
            LlmProvider::Ollama => self.try_probe_ollama(cfg).await,
            LlmProvider::OpenAI | LlmProvider::Anthropic if !cfg.api_key_present() => {
                Ok(HealthStatus::new(cfg, false, 0, "not configured: API key is missing"))
            }
            LlmProvider::OpenAI => self.try_probe_openai(cfg).await,
            LlmProvider::Anthropic => self.try_probe_anthropic(cfg).await,
        };

        match result {
            Ok(status) => {
                info!(
                    provider = %status.provider,
                    endpoint = %status.endpoint,
                    ok = status.ok,
                    latency_ms = status.latency_ms,
                    "health probe completed"
                );
                status
            }
            Err(err) => {
                let status =
                    HealthStatus::new(cfg, false, start.elapsed().as_millis(), err.to_string());
                warn!(
                    provider = %status.provider,
                    endpoint = %status.endpoint,
                    latency_ms = status.latency_ms,
                    message = %status.message,
                    "health probe failed"
                );
                status
            }
        }
    }

    /// Checks health for multiple configs concurrently, one status per
    /// config in input order.
    pub async fn check_many(&self, configs: &[LlmModelConfig]) -> Vec<HealthStatus> {
        debug!(count = configs.len(), "running batch health probes");
        join_all(configs.iter().map(|cfg| self.check(cfg))).await
    }

    /// Lists the models installed in the Ollama runtime behind `cfg`.
    ///
    /// # Errors
    /// - [`HealthError::InvalidEndpoint`] for a non-http endpoint
    /// - [`HealthError::HttpStatus`] for non-2xx responses
    /// - [`HealthError::Decode`] when the payload is not a tags listing
    pub async fn list_ollama_models(
        &self,
        cfg: &LlmModelConfig,
    ) -> Result<Vec<OllamaModel>, AiLlmError> {
        if !is_http_endpoint(&cfg.endpoint) {
            return Err(HealthError::InvalidEndpoint(cfg.endpoint.clone()).into());
        }
        let url = format!("{}/api/tags", cfg.base_url());
        let resp = self.get(&url, self.timeout_of(cfg), None).await?;
        let tags: Tags = resp
            .json()
            .await
            .map_err(|e| HealthError::Decode(format!("invalid /api/tags payload: {e}")))?;
        Ok(tags.models.unwrap_or_default())
    }

    /// Strict Ollama probe.
    async fn try_probe_ollama(&self, cfg: &LlmModelConfig) -> Result<HealthStatus, AiLlmError> {
        let url = format!("{}/api/tags", cfg.base_url());
        let start = Instant::now();
        let resp = self.get(&url, self.timeout_of(cfg), None).await?;
        let latency = start.elapsed().as_millis();

        match resp.json::<Tags>().await {
            Ok(Tags {
                models: Some(models),
            }) => {
                // `llama3.2` is reported as `llama3.2:latest`.
                let exists = models
                    .iter()
                    .any(|m| m.name == cfg.model || m.name.split(':').next() == Some(cfg.model.as_str()));
                Ok(if exists {
                    HealthStatus::new(cfg, true, latency, "Ollama is healthy; model is available")
                } else {
                    HealthStatus::new(
                        cfg,
                        false,
                        latency,
                        "Ollama is up, but model not found in /api/tags",
                    )
                })
            }
            Ok(Tags { models: None }) => Ok(HealthStatus::new(
                cfg,
                true,
                latency,
                "Ollama is healthy; tags response without `models` field",
            )),
            Err(e) => {
                warn!(
                    provider = "ollama",
                    endpoint = %cfg.endpoint,
                    error = %e,
                    "failed to decode /api/tags; treating server as reachable"
                );
                Ok(HealthStatus::new(
                    cfg,
                    true,
                    latency,
                    format!("Ollama is reachable; failed to decode /api/tags: {e}"),
                ))
            }
        }
    }

    /// Strict OpenAI probe (`GET /v1/models`, Bearer auth).
    async fn try_probe_openai(&self, cfg: &LlmModelConfig) -> Result<HealthStatus, AiLlmError> {
        let api_key = cfg.api_key.as_deref().unwrap_or_default();
        let auth = header::HeaderValue::from_str(&format!("Bearer {}", api_key.trim()))
            .map_err(|e| HealthError::Decode(format!("invalid API key header: {e}")))?;
        self.probe_model_list(cfg, vec![(header::AUTHORIZATION, auth)])
            .await
    }

    /// Strict Anthropic probe (`GET /v1/models`, `x-api-key`).
    async fn try_probe_anthropic(&self, cfg: &LlmModelConfig) -> Result<HealthStatus, AiLlmError> {
        let api_key = cfg.api_key.as_deref().unwrap_or_default();
        let key = header::HeaderValue::from_str(api_key.trim())
            .map_err(|e| HealthError::Decode(format!("invalid API key header: {e}")))?;
        self.probe_model_list(
            cfg,
            vec![
                (header::HeaderName::from_static("x-api-key"), key),
                (
                    header::HeaderName::from_static("anthropic-version"),
                    header::HeaderValue::from_static(ANTHROPIC_VERSION),
                ),
            ],
        )
        .await
    }

    /// Shared body of the hosted-provider probes: both list `{data: [{id}]}`.
    async fn probe_model_list(
        &self,
        cfg: &LlmModelConfig,
        headers: Vec<(header::HeaderName, header::HeaderValue)>,
    ) -> Result<HealthStatus, AiLlmError> {
        let url = format!("{}/v1/models", cfg.base_url());
        let start = Instant::now();
        let resp = self.get(&url, self.timeout_of(cfg), Some(headers)).await?;
        let latency = start.elapsed().as_millis();

        match resp.json::<Models>().await {
            Ok(models) => {
                let exists = models.data.iter().any(|m| m.id == cfg.model);
                Ok(if exists {
                    HealthStatus::new(cfg, true, latency, "healthy; model is available")
                } else {
                    HealthStatus::new(cfg, false, latency, "up, but model not found in /v1/models")
                })
            }
            Err(e) => Ok(HealthStatus::new(
                cfg,
                true,
                latency,
                format!("reachable; failed to decode /v1/models: {e}"),
            )),
        }
    }

    fn timeout_of(&self, cfg: &LlmModelConfig) -> Duration {
        cfg.timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(self.default_timeout)
            .min(self.default_timeout)
    }

    async fn get(
        &self,
        url: &str,
        timeout: Duration,
        headers: Option<Vec<(header::HeaderName, header::HeaderValue)>>,
    ) -> Result<reqwest::Response, AiLlmError> {
        debug!("GET {}", url);
        let mut req = self.client.get(url).timeout(timeout);
        for (name, value) in headers.unwrap_or_default() {
            req = req.header(name, value);
        }
        let resp = req.send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            let snippet = make_snippet(&text);
            error!(%url, %status, %snippet, "health probe returned non-success status");
            return Err(HealthError::HttpStatus(HttpError {
                status,
                url: url.to_string(),
                snippet,
            })
            .into());
        }
        Ok(resp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_config::{config_anthropic, config_ollama_chat};

    #[tokio::test]
    async fn hosted_provider_without_key_is_not_configured() {
        let svc = HealthService::new(Some(1)).unwrap();
        let mut cfg = config_anthropic(5, None);
        cfg.api_key = None;
        let status = svc.check(&cfg).await;
        assert!(!status.ok);
        assert!(status.message.contains("not configured"));
        assert_eq!(status.provider, LlmProvider::Anthropic);
    }

    #[tokio::test]
    async fn invalid_endpoint_is_reported_without_network() {
        let svc = HealthService::new(Some(1)).unwrap();
        let mut cfg = config_ollama_chat(5, None);
        cfg.endpoint = "localhost:11434".into();
        let status = svc.check(&cfg).await;
        assert!(!status.ok);
        assert_eq!(status.latency_ms, 0);
    }
}
