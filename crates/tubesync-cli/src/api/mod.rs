//! HTTP control surface and live event WebSocket.

mod error;
mod routes;
mod ws;

pub use error::ApiError;

use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tubesync_core::Engine;

/// Shared handler state. `shutdown` closes open WebSockets so graceful
/// shutdown is not held up by long-lived connections.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(engine: Arc<Engine>, shutdown: CancellationToken) -> Self {
        Self { engine, shutdown }
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(routes::health))
        .route("/api/jobs", get(routes::list_jobs))
        .route("/api/jobs/:id", get(routes::get_job).delete(routes::remove_job))
        .route("/api/jobs/:id/retry", post(routes::retry_job))
        .route("/api/stats", get(routes::stats))
        .route("/api/sync", get(routes::sync_status).post(routes::trigger_sync))
        .route("/api/downloads/progress", get(routes::download_progress))
        .route("/api/uploads/progress", get(routes::upload_progress))
        .route("/api/pause", get(routes::pause_state))
        .route("/api/downloads/pause", post(routes::pause_downloads))
        .route("/api/downloads/resume", post(routes::resume_downloads))
        .route("/api/uploads/pause", post(routes::pause_uploads))
        .route("/api/uploads/resume", post(routes::resume_uploads))
        .route("/api/transport/test", post(routes::test_transport))
        .route("/api/config", get(routes::get_config).put(routes::update_config))
        .route("/ws", get(ws::events))
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests;
