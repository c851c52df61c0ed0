use super::*;
use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;
use tubesync_core::adapters::default_collaborators;
use tubesync_core::config::{ConfigError, TubesyncConfig};
use tubesync_core::events::EventBus;
use tubesync_core::job_store::{
    JobId, JobStatus, JobStore, JobUpdate, KindFilter, NewVideoJob, StoreError, VideoKind,
};
use tubesync_core::scheduler::SyncError;

struct TestApp {
    _dir: TempDir,
    engine: Arc<Engine>,
    router: Router,
}

async fn app() -> TestApp {
    let dir = TempDir::new().unwrap();
    let share = dir.path().join("share");
    std::fs::create_dir_all(&share).unwrap();

    let mut cfg = TubesyncConfig::default();
    cfg.download_dir = dir.path().join("downloads");
    cfg.auto_sync_enabled = false;
    cfg.transport.enabled = true;
    cfg.transport.host = "nas.local".to_string();
    cfg.transport.mount_root = Some(share);

    let store = JobStore::open_at(dir.path().join("jobs.db"), EventBus::new(64))
        .await
        .unwrap();
    let collaborators = default_collaborators(&cfg);
    let engine = Arc::new(Engine::new(store, cfg, collaborators).await.unwrap());
    let router = router(AppState::new(Arc::clone(&engine), CancellationToken::new()));
    TestApp {
        _dir: dir,
        engine,
        router,
    }
}

async fn enqueue(engine: &Engine, video_id: &str) -> JobId {
    let store = engine.store();
    store
        .create_if_absent(&NewVideoJob {
            video_id: video_id.to_string(),
            channel_id: "UC1".to_string(),
            channel_name: "Channel".to_string(),
            title: format!("Video {video_id}"),
            duration_secs: Some(600),
            published_at: None,
            kind: VideoKind::Regular,
        })
        .await
        .unwrap();
    store.find_by_video_id(video_id).await.unwrap().unwrap().id
}

async fn send(router: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            request = request.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let response = router
        .clone()
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn health_is_ok() {
    let t = app().await;
    let (status, body) = send(&t.router, Method::GET, "/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn jobs_are_listed_and_filtered() {
    let t = app().await;
    enqueue(&t.engine, "a").await;
    enqueue(&t.engine, "b").await;

    let (status, body) = send(&t.router, Method::GET, "/api/jobs?page_size=1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
    assert_eq!(body["jobs"].as_array().unwrap().len(), 1);

    let (_, body) = send(&t.router, Method::GET, "/api/jobs?status=failed", None).await;
    assert_eq!(body["total"], 0);

    let (status, _) = send(&t.router, Method::GET, "/api/jobs?status=bogus", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn missing_job_is_not_found() {
    let t = app().await;
    let (status, body) = send(&t.router, Method::GET, "/api/jobs/404", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("not found"));
}

#[tokio::test]
async fn retry_of_pending_job_conflicts() {
    let t = app().await;
    let id = enqueue(&t.engine, "c").await;
    let (status, _) = send(&t.router, Method::POST, &format!("/api/jobs/{id}/retry"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    t.engine
        .store()
        .transition(
            id,
            JobStatus::Pending,
            JobStatus::Failed,
            JobUpdate::default().with_error("gone"),
        )
        .await
        .unwrap();
    let (status, body) = send(&t.router, Method::POST, &format!("/api/jobs/{id}/retry"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "pending");
}

#[tokio::test]
async fn leased_job_cannot_be_deleted() {
    let t = app().await;
    let id = enqueue(&t.engine, "d").await;
    t.engine
        .store()
        .claim_next(JobStatus::Pending, 1, KindFilter::Any, "download-0")
        .await
        .unwrap();
    let (status, _) = send(&t.router, Method::DELETE, &format!("/api/jobs/{id}"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let other = enqueue(&t.engine, "e").await;
    let (status, body) = send(
        &t.router,
        Method::DELETE,
        &format!("/api/jobs/{other}?delete_files=true"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["video_id"], "e");
}

#[tokio::test]
async fn pause_endpoints_are_idempotent() {
    let t = app().await;
    let (_, body) = send(&t.router, Method::POST, "/api/downloads/pause", None).await;
    assert_eq!(body["downloads_paused"], true);
    let (_, body) = send(&t.router, Method::POST, "/api/downloads/pause", None).await;
    assert_eq!(body["downloads_paused"], true);
    assert_eq!(body["uploads_paused"], false);

    send(&t.router, Method::POST, "/api/uploads/pause", None).await;
    send(&t.router, Method::POST, "/api/downloads/resume", None).await;
    let (status, body) = send(&t.router, Method::GET, "/api/pause", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["downloads_paused"], false);
    assert_eq!(body["uploads_paused"], true);

    let (_, body) = send(&t.router, Method::POST, "/api/uploads/resume", None).await;
    assert_eq!(body["uploads_paused"], false);
}

#[tokio::test]
async fn stats_and_progress_snapshots() {
    let t = app().await;
    enqueue(&t.engine, "f").await;
    let (status, body) = send(&t.router, Method::GET, "/api/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["jobs"]["pending"], 1);
    assert_eq!(body["quota"]["exceeded"], false);
    assert_eq!(body["sync_running"], false);

    let (_, body) = send(&t.router, Method::GET, "/api/downloads/progress", None).await;
    assert_eq!(body, serde_json::json!([]));
    let (_, body) = send(&t.router, Method::GET, "/api/uploads/progress", None).await;
    assert_eq!(body, serde_json::json!([]));
}

#[tokio::test]
async fn sync_can_be_started() {
    let t = app().await;
    let (status, body) = send(&t.router, Method::GET, "/api/sync", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_null());

    let (status, _) = send(&t.router, Method::POST, "/api/sync", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
}

#[tokio::test]
async fn transport_check_accepts_optional_credentials() {
    let t = app().await;
    let (status, body) = send(&t.router, Method::POST, "/api/transport/test", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (_, body) = send(
        &t.router,
        Method::POST,
        "/api/transport/test",
        Some(serde_json::json!({ "host": "nas.local", "user": "me" })),
    )
    .await;
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn settings_are_read_without_password() {
    let t = app().await;
    let (status, body) = send(&t.router, Method::GET, "/api/config", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["max_concurrent_downloads"], 3);
    assert_eq!(body["transport"]["host"], "nas.local");
    assert_eq!(body["transport"]["password"], "");
}

#[tokio::test]
async fn settings_update_is_validated_and_applied() {
    let t = app().await;
    let (status, body) = send(
        &t.router,
        Method::PUT,
        "/api/config",
        Some(serde_json::json!({
            "sync_days_back": 7,
            "transport": { "password": "hunter2" }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["restart_required"], false);
    assert_eq!(body["config"]["sync_days_back"], 7);
    assert_eq!(body["config"]["transport"]["password"], "");
    assert_eq!(t.engine.config().transport.password, "hunter2");

    let (status, body) = send(
        &t.router,
        Method::PUT,
        "/api/config",
        Some(serde_json::json!({ "max_concurrent_uploads": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("max_concurrent_uploads"));
    assert_eq!(t.engine.config().max_concurrent_uploads, 3);

    let (status, _) = send(
        &t.router,
        Method::PUT,
        "/api/config",
        Some(serde_json::json!({ "no_such_setting": true })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[test]
fn errors_map_to_status_codes() {
    assert_eq!(
        ApiError::from(StoreError::NotFound(1)).status_code(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        ApiError::from(StoreError::Leased {
            id: 1,
            owner: "upload-0".to_string()
        })
        .status_code(),
        StatusCode::CONFLICT
    );
    assert_eq!(
        ApiError::from(SyncError::Busy).status_code(),
        StatusCode::CONFLICT
    );
    assert_eq!(
        ApiError::from(ConfigError::Invalid("x".to_string())).status_code(),
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        ApiError::BadRequest("x".to_string()).status_code(),
        StatusCode::BAD_REQUEST
    );
}
