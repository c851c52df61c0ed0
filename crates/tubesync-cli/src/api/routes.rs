//! REST handlers. Each one is a thin call into the engine's control surface.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tubesync_core::config::{ConfigUpdate, TubesyncConfig};
use tubesync_core::control::StatusSnapshot;
use tubesync_core::events::TransferProgress;
use tubesync_core::job_store::{JobId, JobPage, JobStatus, VideoJob};
use tubesync_core::pause::{PauseState, PauseTarget};
use tubesync_core::scheduler::SyncRun;
use tubesync_core::transport::{ConnectionCheck, Credentials};

use super::{ApiError, AppState};

const DEFAULT_PAGE_SIZE: u32 = 50;

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
pub struct JobsQuery {
    status: Option<String>,
    page: Option<u32>,
    page_size: Option<u32>,
}

pub async fn list_jobs(
    State(state): State<AppState>,
    Query(q): Query<JobsQuery>,
) -> Result<Json<JobPage>, ApiError> {
    let status = match q.status.as_deref() {
        None | Some("") => None,
        Some(s) => Some(s.parse::<JobStatus>().map_err(ApiError::BadRequest)?),
    };
    let page = state
        .engine
        .list_jobs(
            status,
            q.page.unwrap_or(1),
            q.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
        )
        .await?;
    Ok(Json(page))
}

pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<JobId>,
) -> Result<Json<VideoJob>, ApiError> {
    Ok(Json(state.engine.get_job(id).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct RemoveQuery {
    #[serde(default)]
    delete_files: bool,
}

pub async fn remove_job(
    State(state): State<AppState>,
    Path(id): Path<JobId>,
    Query(q): Query<RemoveQuery>,
) -> Result<Json<VideoJob>, ApiError> {
    Ok(Json(state.engine.remove_job(id, q.delete_files).await?))
}

pub async fn retry_job(
    State(state): State<AppState>,
    Path(id): Path<JobId>,
) -> Result<Json<VideoJob>, ApiError> {
    Ok(Json(state.engine.retry_job(id).await?))
}

pub async fn stats(State(state): State<AppState>) -> Result<Json<StatusSnapshot>, ApiError> {
    Ok(Json(state.engine.status().await?))
}

pub async fn sync_status(State(state): State<AppState>) -> Json<Option<SyncRun>> {
    Json(state.engine.current_sync())
}

pub async fn trigger_sync(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    state.engine.trigger_sync()?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "status": "started" }))))
}

pub async fn download_progress(State(state): State<AppState>) -> Json<Vec<TransferProgress>> {
    Json(state.engine.active_downloads())
}

pub async fn upload_progress(State(state): State<AppState>) -> Json<Vec<TransferProgress>> {
    Json(state.engine.active_uploads())
}

pub async fn pause_state(State(state): State<AppState>) -> Json<PauseState> {
    Json(state.engine.pause_state())
}

pub async fn pause_downloads(State(state): State<AppState>) -> Json<PauseState> {
    Json(state.engine.set_paused(PauseTarget::Downloads, true))
}

pub async fn resume_downloads(State(state): State<AppState>) -> Json<PauseState> {
    Json(state.engine.set_paused(PauseTarget::Downloads, false))
}

pub async fn pause_uploads(State(state): State<AppState>) -> Json<PauseState> {
    Json(state.engine.set_paused(PauseTarget::Uploads, true))
}

pub async fn resume_uploads(State(state): State<AppState>) -> Json<PauseState> {
    Json(state.engine.set_paused(PauseTarget::Uploads, false))
}

/// Current settings; the share password is never returned.
pub async fn get_config(State(state): State<AppState>) -> Json<TubesyncConfig> {
    Json(state.engine.config().redacted())
}

#[derive(Debug, Serialize)]
pub struct ConfigUpdated {
    success: bool,
    restart_required: bool,
    config: TubesyncConfig,
}

pub async fn update_config(
    State(state): State<AppState>,
    Json(update): Json<ConfigUpdate>,
) -> Result<Json<ConfigUpdated>, ApiError> {
    let change = state.engine.update_config(update)?;
    Ok(Json(ConfigUpdated {
        success: true,
        restart_required: change.restart_required,
        config: change.config.redacted(),
    }))
}

/// Body is optional; when present it overrides the saved credentials.
pub async fn test_transport(
    State(state): State<AppState>,
    body: Option<Json<Credentials>>,
) -> Json<ConnectionCheck> {
    let credentials = body.map(|Json(c)| c);
    Json(state.engine.test_transport(credentials).await)
}
