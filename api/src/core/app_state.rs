use std::{sync::Arc, time::Duration};

use ai_llm_service::{
    ProviderGateway, config::default_config::DEFAULT_TIMEOUT_SECS, error_handler::env_opt_u64,
    health_service::HealthService,
};
use rag_base::ContextRetriever;
use tracing::info;

use crate::error_handler::AppError;

/// Shared state for all HTTP handlers.
#[derive(Debug)]
pub struct AppState {
    /// Provider resolution with its per-provider cache.
    pub gateway: Arc<ProviderGateway>,
    /// Provider identifier every chat request is routed to (`LLM_PROVIDER`).
    pub provider_name: String,
    /// Best-effort knowledge-base retrieval.
    pub retriever: ContextRetriever,
    /// Backend probes for `/api/health` and `/api/chat/models`.
    pub health: HealthService,
    /// Upper bound for one provider call, streaming or not.
    pub llm_timeout: Duration,
}

impl AppState {
    pub fn new(
        gateway: Arc<ProviderGateway>,
        provider_name: impl Into<String>,
        retriever: ContextRetriever,
        llm_timeout: Duration,
    ) -> Result<Self, AppError> {
        Ok(Self {
            gateway,
            provider_name: provider_name.into(),
            retriever,
            health: HealthService::new(Some(5))?,
            llm_timeout,
        })
    }

    /// Load shared state from environment variables.
    ///
    /// The provider name is NOT validated here: an unknown or misconfigured
    /// provider is reported per request, so the process still serves health
    /// checks.
    pub fn from_env() -> Result<Self, AppError> {
        let provider_name = std::env::var("LLM_PROVIDER")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "ollama".into());
        let timeout_secs = env_opt_u64("LLM_TIMEOUT_SECS")?.unwrap_or(DEFAULT_TIMEOUT_SECS);

        let gateway = Arc::new(ProviderGateway::from_env()?);
        let retriever = ContextRetriever::from_env(gateway.settings().embedding.clone())?;

        info!(
            provider = %provider_name,
            timeout_secs,
            top_n = retriever.top_n(),
            "application state loaded"
        );

        Self::new(
            gateway,
            provider_name,
            retriever,
            Duration::from_secs(timeout_secs),
        )
    }
}
