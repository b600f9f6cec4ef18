//! POST /api/chat: streams the answer as `data: <json>\n\n` events.

use std::{convert::Infallible, sync::Arc};

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{HeaderName, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use tokio::sync::oneshot;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;

use crate::{
    chat::normalize::normalize_conversation,
    core::app_state::AppState,
    error_handler::{AppError, AppResult},
    relay::{FrameReceiver, run_relay},
    routes::chat::chat_request::ChatRequest,
};

/// Handler: POST /api/chat
///
/// Validation and normalization failures answer 400 before any streaming.
/// Failures up to the moment the provider stream opens answer a JSON 500;
/// later failures arrive in-band as an `error` event.
///
/// # Example
/// ```bash
/// curl -N -X POST http://127.0.0.1:3000/api/chat \
///   -H 'content-type: application/json' \
///   -d '{"messages":[{"role":"user","content":"What does the manual say about setup?"}]}'
/// ```
pub async fn chat_stream_route(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ChatRequest>,
) -> AppResult<Response> {
    let messages = body.into_messages()?;
    let conversation = normalize_conversation(&messages)?;
    debug!(turns = messages.len(), "chat_stream_route: conversation normalized");

    let (commit_tx, commit_rx) = oneshot::channel();
    tokio::spawn(run_relay(Arc::clone(&state), conversation, commit_tx));

    let frames = commit_rx
        .await
        .map_err(|_| AppError::Internal("stream relay stopped before committing".into()))??;

    Ok(event_stream_response(frames))
}

fn event_stream_response(frames: FrameReceiver) -> Response {
    let body = Body::from_stream(UnboundedReceiverStream::new(frames).map(Ok::<_, Infallible>));
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        body,
    )
        .into_response()
}
