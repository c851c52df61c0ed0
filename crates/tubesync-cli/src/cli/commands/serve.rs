//! `tubesync serve` – run the engine, the control socket and the HTTP API
//! until SIGINT/SIGTERM.

use anyhow::{Context, Result};
use std::sync::Arc;
use tubesync_core::config::TubesyncConfig;
use tubesync_core::control::default_control_socket_path;
use tubesync_core::job_store::JobStore;

use super::build_engine;
use crate::api::{self, AppState};
use crate::cli::control_socket;
use crate::shutdown;

pub async fn run_serve(store: JobStore, cfg: TubesyncConfig) -> Result<()> {
    let grace = cfg.workers.shutdown_grace();
    let bind = format!("{}:{}", cfg.server.addr, cfg.server.port);

    let engine = Arc::new(build_engine(store, cfg).await?);
    engine.start().await?;

    let token = shutdown::install_signal_handler();

    let socket_path = default_control_socket_path()?;
    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create {}", parent.display()))?;
    }
    let control = control_socket::spawn_control_listener(
        Arc::clone(&engine),
        &socket_path,
        token.clone(),
    )?;

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("bind {bind}"))?;
    tracing::info!("control surface listening on http://{bind}");

    let app = api::router(AppState::new(Arc::clone(&engine), token.clone()));
    let served = axum::serve(listener, app)
        .with_graceful_shutdown({
            let token = token.clone();
            async move { token.cancelled().await }
        })
        .await;

    // an HTTP failure still shuts the pools down cleanly
    token.cancel();
    let _ = control.await;
    engine.shutdown(grace).await;
    served.context("http server")?;
    Ok(())
}
