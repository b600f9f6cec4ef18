//! POST /api/admin/index/reset: forget the cached vector collection id.
//!
//! Call after the collection was rebuilt; the next retrieval re-resolves it.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::Response};
use serde::Serialize;
use tracing::info;

use crate::core::{app_state::AppState, http::response_envelope::ApiResponse};

#[derive(Debug, Serialize)]
pub struct IndexResetResponse {
    pub message: &'static str,
}

pub async fn index_reset_route(State(state): State<Arc<AppState>>) -> Response {
    state.retriever.reset_cache().await;
    info!("index_reset_route: collection cache cleared");
    ApiResponse::success(IndexResetResponse {
        message: "Vector collection cache cleared",
    })
    .into_response_with_status(StatusCode::OK)
}
