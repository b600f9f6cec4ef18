pub mod chat;
pub mod core;
pub mod error_handler;
pub mod middleware_layer;
pub mod relay;
pub mod routes;

use std::{env, sync::Arc};

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tokio::signal;
use tracing::{info, warn};

use crate::{
    core::app_state::AppState,
    error_handler::AppError,
    middleware_layer::json_extractor::json_error_mapper,
    routes::{
        admin::index_reset_route::index_reset_route,
        chat::{
            chat_complete_route::chat_complete_route, chat_models_route::chat_models_route,
            chat_stream_route::chat_stream_route,
        },
        health::health_route::health_route,
    },
};

/// HTTP surface over an already-built state. Used by [`start`] and by tests.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/chat", post(chat_stream_route))
        .route("/api/chat/complete", post(chat_complete_route))
        .route("/api/chat/models", get(chat_models_route))
        .route("/api/health", get(health_route))
        .route("/api/admin/index/reset", post(index_reset_route))
        .layer(middleware::from_fn(json_error_mapper))
        .with_state(state)
}

/// Listen address: `API_ADDRESS`, else `0.0.0.0:$PORT` (port 3000 by default).
fn listen_address() -> String {
    env::var("API_ADDRESS")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| {
            let port = env::var("PORT").unwrap_or_else(|_| "3000".into());
            format!("0.0.0.0:{port}")
        })
}

pub async fn start() -> Result<(), AppError> {
    let state = Arc::new(AppState::from_env()?);
    let app = router(state);

    let host_url = listen_address();
    let listener = tokio::net::TcpListener::bind(&host_url)
        .await
        .map_err(AppError::Bind)?;
    info!(address = %host_url, "server listening");

    // Start server with graceful shutdown on Ctrl+C
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(AppError::Server)?;

    info!("server stopped");
    Ok(())
}

/// Returns a future that resolves when Ctrl+C is pressed
async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
