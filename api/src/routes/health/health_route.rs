//! GET /api/health: process liveness plus best-effort backend probes.

use std::sync::Arc;

use ai_llm_service::health_service::HealthStatus;
use axum::{Json, extract::State};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::core::app_state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthReport {
    /// Always `"ok"`: the process is serving.
    pub status: &'static str,
    pub timestamp: String,
    /// Provider chat requests are routed to.
    pub provider: String,
    pub services: Vec<HealthStatus>,
}

/// Never fails; unreachable backends show up as `ok: false` entries.
pub async fn health_route(State(state): State<Arc<AppState>>) -> Json<HealthReport> {
    let settings = state.gateway.settings();
    let services = state
        .health
        .check_many(&[
            settings.ollama.clone(),
            settings.openai.clone(),
            settings.anthropic.clone(),
        ])
        .await;

    Json(HealthReport {
        status: "ok",
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        provider: state.provider_name.clone(),
        services,
    })
}
