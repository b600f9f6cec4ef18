//! POST /api/chat/complete: same pipeline as `/api/chat`, one JSON answer.

use std::sync::Arc;

use ai_llm_service::AiLlmError;
use axum::{Json, extract::State, http::StatusCode, response::Response};
use chrono::{SecondsFormat, Utc};
use tokio::time::timeout;
use tracing::info;

use crate::{
    chat::normalize::normalize_conversation,
    core::{app_state::AppState, http::response_envelope::ApiResponse},
    error_handler::AppResult,
    routes::chat::chat_request::{ChatCompleteResponse, ChatRequest},
};

pub async fn chat_complete_route(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ChatRequest>,
) -> AppResult<Response> {
    let messages = body.into_messages()?;
    let conversation = normalize_conversation(&messages)?;

    let context = state
        .retriever
        .get_context(&conversation.query.content, None)
        .await;
    let turns = conversation.into_messages(&context);

    let handle = state.gateway.resolve(&state.provider_name).await?;
    let response = timeout(state.llm_timeout, handle.complete(&turns))
        .await
        .map_err(|_| AiLlmError::Timeout(state.llm_timeout))??;

    info!(
        provider = %handle.kind(),
        model = %handle.model(),
        chars = response.chars().count(),
        "chat_complete_route: completed"
    );

    Ok(ApiResponse::success(ChatCompleteResponse {
        response,
        model: handle.model().to_string(),
        provider: handle.kind(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    })
    .into_response_with_status(StatusCode::OK))
}
