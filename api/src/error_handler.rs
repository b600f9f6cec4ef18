use ai_llm_service::AiLlmError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rag_base::RagBaseError;
use thiserror::Error;

use crate::{chat::normalize::NormalizeError, core::http::response_envelope::ApiResponse};

/// Public application error type.
#[derive(Debug, Error)]
pub enum AppError {
    // --- IO / network / server ---
    #[error("failed to bind listener")]
    Bind(#[source] std::io::Error),

    #[error("server error")]
    Server(#[source] std::io::Error),

    // --- Request / routing ---
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    // --- Downstream ---
    #[error(transparent)]
    Llm(#[from] AiLlmError),

    #[error(transparent)]
    Retrieval(#[from] RagBaseError),

    #[error("{0}")]
    Internal(String),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) | AppError::Normalize(_) => StatusCode::BAD_REQUEST,
            AppError::Llm(AiLlmError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Bind(_)
            | AppError::Server(_)
            | AppError::Llm(_)
            | AppError::Retrieval(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, %status, "request failed");
        }
        (status, Json(ApiResponse::<()>::error(self.to_string()))).into_response()
    }
}

/// Handy result alias used across handlers.
pub type AppResult<T> = Result<T, AppError>;
