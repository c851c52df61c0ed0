//! Fetch collaborator: downloads one video to the local download directory.

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

use crate::config::VideoQuality;
use crate::progress::ProgressReporter;

/// Input for one fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub video_id: String,
    pub title: String,
    pub target_dir: PathBuf,
    pub quality: VideoQuality,
}

/// The artifact a successful fetch leaves on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedVideo {
    pub path: PathBuf,
    pub size: u64,
    /// Duration measured by the tool, when it reports one.
    pub duration_secs: Option<u64>,
}

#[derive(Debug, Error)]
pub enum FetchError {
    /// Removed, private, copyright-blocked or otherwise not downloadable.
    #[error("video unavailable: {0}")]
    Unavailable(String),

    #[error("live stream in progress")]
    LiveInProgress,

    #[error("transient fetch failure: {0}")]
    Transient(String),
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Download `request.video_id` into `request.target_dir`, reporting
    /// progress as bytes arrive.
    async fn fetch(
        &self,
        request: &FetchRequest,
        progress: &ProgressReporter,
    ) -> Result<FetchedVideo, FetchError>;

    /// Look up a video's duration without downloading it. `None` when the
    /// tool cannot tell.
    async fn probe_duration(&self, video_id: &str) -> Result<Option<u64>, FetchError>;
}
