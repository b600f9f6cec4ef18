//! GET /api/chat/models: models installed in the local Ollama runtime.

use std::sync::Arc;

use ai_llm_service::health_service::OllamaModel;
use axum::{extract::State, http::StatusCode, response::Response};
use serde::Serialize;

use crate::{
    core::{app_state::AppState, http::response_envelope::ApiResponse},
    error_handler::AppResult,
};

#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub models: Vec<OllamaModel>,
}

pub async fn chat_models_route(State(state): State<Arc<AppState>>) -> AppResult<Response> {
    let models = state
        .health
        .list_ollama_models(&state.gateway.settings().ollama)
        .await?;
    Ok(ApiResponse::success(ModelsResponse { models }).into_response_with_status(StatusCode::OK))
}
