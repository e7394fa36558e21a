//! Router configuration.

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use super::ws::chat_ws_handler;
use crate::engine::EngineHandle;

/// Create the main router: the chat socket plus the health check.
pub fn create_router(engine: EngineHandle) -> Router {
    Router::new()
        .route("/ws", get(chat_ws_handler))
        .with_state(engine)
        .merge(create_health_router())
        .layer(TraceLayer::new_for_http())
}

/// Create a health check router.
pub fn create_health_router() -> Router {
    Router::new().route("/health", get(health_check))
}

/// Health check handler.
async fn health_check() -> &'static str {
    "OK"
}
