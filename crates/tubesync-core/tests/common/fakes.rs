//! Scripted collaborators for integration tests.
//!
//! Each fake counts calls and can hold every call at a gate until the test
//! adds permits, so tests can observe jobs while they are in flight.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

use tubesync_core::fetch::{FetchError, FetchRequest, FetchedVideo, Fetcher};
use tubesync_core::metadata::{Channel, MetadataError, MetadataSource, VideoDescriptor};
use tubesync_core::progress::ProgressReporter;
use tubesync_core::transport::{Credentials, Transport, TransportError};

/// Optional gate plus a counter of started calls.
#[derive(Clone)]
pub struct Gate {
    gate: Option<Arc<Semaphore>>,
    started: Arc<Semaphore>,
}

impl Default for Gate {
    fn default() -> Self {
        Self {
            gate: None,
            started: Arc::new(Semaphore::new(0)),
        }
    }
}

impl Gate {
    /// Calls block until [`Gate::open`] adds permits.
    pub fn closed() -> Self {
        Self {
            gate: Some(Arc::new(Semaphore::new(0))),
            started: Arc::new(Semaphore::new(0)),
        }
    }

    pub fn open(&self, permits: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(permits);
        }
    }

    /// Wait until `n` calls have started.
    pub async fn wait_started(&self, n: u32) {
        let permit = tokio::time::timeout(Duration::from_secs(10), self.started.acquire_many(n))
            .await
            .expect("calls did not start in time")
            .expect("semaphore closed");
        permit.forget();
    }

    async fn pass(&self) {
        self.started.add_permits(1);
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchBehavior {
    Succeed,
    /// Reports a directory as the artifact, so deleting it later fails.
    SucceedAsDirectory,
    FailTransient,
    /// The video was removed or made private.
    FailUnavailable,
    /// The video is a broadcast that has not ended yet.
    FailLive,
}

pub struct FakeFetcher {
    behavior: FetchBehavior,
    pub gate: Gate,
    calls: AtomicUsize,
    probe: Mutex<HashMap<String, Result<Option<u64>, &'static str>>>,
}

impl FakeFetcher {
    pub fn new(behavior: FetchBehavior) -> Self {
        Self::with_gate(behavior, Gate::default())
    }

    pub fn with_gate(behavior: FetchBehavior, gate: Gate) -> Self {
        Self {
            behavior,
            gate,
            calls: AtomicUsize::new(0),
            probe: Mutex::new(HashMap::new()),
        }
    }

    /// Scripted `probe_duration` answer; `Err("live")` means a live stream.
    pub fn set_probe(&self, video_id: &str, result: Result<Option<u64>, &'static str>) {
        self.probe.lock().unwrap().insert(video_id.to_string(), result);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(
        &self,
        request: &FetchRequest,
        progress: &ProgressReporter,
    ) -> Result<FetchedVideo, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.gate.pass().await;

        match self.behavior {
            FetchBehavior::FailTransient => {
                Err(FetchError::Transient("connection reset by peer".to_string()))
            }
            FetchBehavior::FailUnavailable => {
                Err(FetchError::Unavailable("Private video".to_string()))
            }
            FetchBehavior::FailLive => Err(FetchError::LiveInProgress),
            FetchBehavior::Succeed => {
                let path = request.target_dir.join(format!("{}.mp4", request.video_id));
                let body = vec![1u8; 4096];
                tokio::fs::create_dir_all(&request.target_dir).await.unwrap();
                tokio::fs::write(&path, &body).await.unwrap();
                progress.report(body.len() as u64, Some(body.len() as u64));
                Ok(FetchedVideo {
                    path,
                    size: body.len() as u64,
                    duration_secs: Some(600),
                })
            }
            FetchBehavior::SucceedAsDirectory => {
                let path = request.target_dir.join(format!("{}.mp4", request.video_id));
                tokio::fs::create_dir_all(path.join("inner")).await.unwrap();
                Ok(FetchedVideo {
                    path,
                    size: 0,
                    duration_secs: Some(600),
                })
            }
        }
    }

    async fn probe_duration(&self, video_id: &str) -> Result<Option<u64>, FetchError> {
        match self.probe.lock().unwrap().get(video_id) {
            Some(Ok(duration)) => Ok(*duration),
            Some(Err("live")) => Err(FetchError::LiveInProgress),
            Some(Err(other)) => Err(FetchError::Unavailable(other.to_string())),
            None => Ok(None),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadBehavior {
    Succeed,
    FailAuth,
}

pub struct FakeTransport {
    behavior: UploadBehavior,
    pub gate: Gate,
    uploads: Mutex<Vec<(PathBuf, String)>>,
    calls: AtomicUsize,
}

impl FakeTransport {
    pub fn new(behavior: UploadBehavior) -> Self {
        Self::with_gate(behavior, Gate::default())
    }

    pub fn with_gate(behavior: UploadBehavior, gate: Gate) -> Self {
        Self {
            behavior,
            gate,
            uploads: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// (local, remote) pairs of finished uploads.
    pub fn uploads(&self) -> Vec<(PathBuf, String)> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn upload(
        &self,
        local: &Path,
        remote: &str,
        _credentials: &Credentials,
        progress: &ProgressReporter,
    ) -> Result<(), TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.gate.pass().await;
        match self.behavior {
            UploadBehavior::FailAuth => Err(TransportError::AuthFailed("bad password".to_string())),
            UploadBehavior::Succeed => {
                progress.report(100, Some(100));
                self.uploads
                    .lock()
                    .unwrap()
                    .push((local.to_path_buf(), remote.to_string()));
                Ok(())
            }
        }
    }

    async fn test_connection(
        &self,
        credentials: &Credentials,
        _directory: &str,
    ) -> Result<(), TransportError> {
        if credentials.host.is_empty() {
            return Err(TransportError::NotConfigured("no host".to_string()));
        }
        match self.behavior {
            UploadBehavior::Succeed => Ok(()),
            UploadBehavior::FailAuth => Err(TransportError::AuthFailed("bad password".to_string())),
        }
    }
}

/// One scripted item of a channel listing.
#[derive(Debug, Clone)]
pub enum Listed {
    Video(VideoDescriptor),
    QuotaExceeded,
    Transient,
}

#[derive(Default)]
pub struct FakeMetadata {
    channels: Vec<Channel>,
    listings: HashMap<String, Vec<Listed>>,
    subscriptions_quota: bool,
    gate: Gate,
    scanned: Mutex<Vec<String>>,
}

impl FakeMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn channel(mut self, id: &str, items: Vec<Listed>) -> Self {
        self.channels.push(Channel {
            id: id.to_string(),
            name: format!("Channel {id}"),
        });
        self.listings.insert(id.to_string(), items);
        self
    }

    pub fn quota_on_subscriptions(mut self) -> Self {
        self.subscriptions_quota = true;
        self
    }

    pub fn gated(mut self, gate: Gate) -> Self {
        self.gate = gate;
        self
    }

    /// Channel ids whose listing was requested, in order.
    pub fn scanned(&self) -> Vec<String> {
        self.scanned.lock().unwrap().clone()
    }
}

#[async_trait]
impl MetadataSource for FakeMetadata {
    async fn subscriptions(&self) -> Result<Vec<Channel>, MetadataError> {
        self.gate.pass().await;
        if self.subscriptions_quota {
            return Err(MetadataError::QuotaExceeded { reset_at: None });
        }
        Ok(self.channels.clone())
    }

    fn recent_videos<'a>(
        &'a self,
        channel: &'a Channel,
        _published_after: i64,
    ) -> BoxStream<'a, Result<VideoDescriptor, MetadataError>> {
        self.scanned.lock().unwrap().push(channel.id.clone());
        let items = self.listings.get(&channel.id).cloned().unwrap_or_default();
        stream::iter(items.into_iter().map(|item| match item {
            Listed::Video(video) => Ok(video),
            Listed::QuotaExceeded => Err(MetadataError::QuotaExceeded {
                reset_at: Some(tubesync_core::job_store::unix_timestamp() + 3600),
            }),
            Listed::Transient => Err(MetadataError::Transient("HTTP 500".to_string())),
        }))
        .boxed()
    }
}

pub fn video(id: &str, duration_secs: Option<u64>, published_at: i64) -> Listed {
    Listed::Video(VideoDescriptor {
        video_id: id.to_string(),
        title: format!("Title {id}"),
        published_at: Some(published_at),
        duration_secs,
        is_live: false,
    })
}

pub fn live(id: &str, published_at: i64) -> Listed {
    Listed::Video(VideoDescriptor {
        video_id: id.to_string(),
        title: format!("Live {id}"),
        published_at: Some(published_at),
        duration_secs: None,
        is_live: true,
    })
}
