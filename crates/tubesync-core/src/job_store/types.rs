//! Types for the job store: status, video kind, job rows, update fields.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of a job row.
pub type JobId = i64;

/// Lifecycle status of a video job.
///
/// Happy path: `Pending -> Downloading -> Downloaded -> Uploading -> Uploaded`.
/// `Failed` and `Skipped` are reachable from any active status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Downloading,
    Downloaded,
    Uploading,
    Uploaded,
    Failed,
    Skipped,
}

impl JobStatus {
    pub const ALL: [JobStatus; 7] = [
        JobStatus::Pending,
        JobStatus::Downloading,
        JobStatus::Downloaded,
        JobStatus::Uploading,
        JobStatus::Uploaded,
        JobStatus::Failed,
        JobStatus::Skipped,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Downloading => "downloading",
            JobStatus::Downloaded => "downloaded",
            JobStatus::Uploading => "uploading",
            JobStatus::Uploaded => "uploaded",
            JobStatus::Failed => "failed",
            JobStatus::Skipped => "skipped",
        }
    }

    /// Statuses from which `Failed` and `Skipped` are reachable.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            JobStatus::Pending | JobStatus::Downloading | JobStatus::Downloaded | JobStatus::Uploading
        )
    }

    /// A worker is transferring the job; the lease is kept across these.
    pub fn is_in_flight(self) -> bool {
        matches!(self, JobStatus::Downloading | JobStatus::Uploading)
    }

    /// Status a job returns to when its in-flight work is abandoned.
    pub fn pre_claim(self) -> JobStatus {
        match self {
            JobStatus::Downloading => JobStatus::Pending,
            JobStatus::Uploading => JobStatus::Downloaded,
            other => other,
        }
    }

    /// Whether `self -> to` is an edge of the lifecycle graph.
    pub fn can_transition_to(self, to: JobStatus) -> bool {
        use JobStatus::*;
        match (self, to) {
            (Pending, Downloading)
            | (Downloading, Downloaded)
            | (Downloaded, Uploading)
            | (Uploading, Uploaded) => true,
            // retry / abandon: back to the pre-claim status
            (Downloading, Pending) | (Uploading, Downloaded) => true,
            (Failed, Pending) | (Failed, Downloading) | (Failed, Uploading) => true,
            (from, Failed) | (from, Skipped) => from.is_active(),
            _ => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown job status '{s}'"))
    }
}

/// Which download pool a job belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoKind {
    Regular,
    Short,
    /// Duration unknown at discovery; probed before any pool claims it.
    Unclassified,
}

impl VideoKind {
    pub fn as_str(self) -> &'static str {
        match self {
            VideoKind::Regular => "regular",
            VideoKind::Short => "short",
            VideoKind::Unclassified => "unclassified",
        }
    }

    /// A video is a short when `0 < duration <= threshold`. Unknown or zero
    /// durations stay unclassified.
    pub fn classify(duration_secs: Option<u64>, threshold_secs: u64) -> VideoKind {
        match duration_secs {
            None | Some(0) => VideoKind::Unclassified,
            Some(d) if d <= threshold_secs => VideoKind::Short,
            Some(_) => VideoKind::Regular,
        }
    }
}

impl FromStr for VideoKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "regular" => Ok(VideoKind::Regular),
            "short" => Ok(VideoKind::Short),
            "unclassified" => Ok(VideoKind::Unclassified),
            other => Err(format!("unknown video kind '{other}'")),
        }
    }
}

/// Restricts `claim_next` to a subset of kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindFilter {
    Any,
    Only(VideoKind),
    Except(VideoKind),
}

impl KindFilter {
    pub(crate) fn mode(self) -> &'static str {
        match self {
            KindFilter::Any => "any",
            KindFilter::Only(_) => "only",
            KindFilter::Except(_) => "except",
        }
    }

    pub(crate) fn kind(self) -> Option<&'static str> {
        match self {
            KindFilter::Any => None,
            KindFilter::Only(k) | KindFilter::Except(k) => Some(k.as_str()),
        }
    }
}

/// A video discovered by the sync scheduler, ready to be enqueued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewVideoJob {
    pub video_id: String,
    pub channel_id: String,
    pub channel_name: String,
    pub title: String,
    pub duration_secs: Option<u64>,
    pub published_at: Option<i64>,
    pub kind: VideoKind,
}

/// Persisted state of one video job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoJob {
    pub id: JobId,
    pub video_id: String,
    pub channel_id: String,
    pub channel_name: String,
    pub title: String,
    pub duration_secs: Option<i64>,
    pub kind: VideoKind,
    pub status: JobStatus,
    pub lease_owner: Option<String>,
    pub version: i64,
    pub retry_count: u32,
    /// Unix seconds before which the job is not claimable.
    pub next_attempt_at: i64,
    pub error_message: Option<String>,
    pub file_path: Option<String>,
    pub file_size: Option<i64>,
    pub remote_path: Option<String>,
    pub published_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
    pub downloaded_at: Option<i64>,
    pub uploaded_at: Option<i64>,
}

impl VideoJob {
    pub fn is_short(&self) -> bool {
        self.kind == VideoKind::Short
    }

    /// Whether the recorded artifact still exists on disk.
    pub async fn has_local_artifact(&self) -> bool {
        match self.file_path.as_deref() {
            Some(path) => tokio::fs::try_exists(path).await.unwrap_or(false),
            None => false,
        }
    }
}

/// Local artifact produced by a download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: String,
    pub size: i64,
}

/// Fields written together with a status transition. Unset fields keep
/// their stored value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    /// `Some(None)` clears the stored message.
    pub error_message: Option<Option<String>>,
    pub artifact: Option<Artifact>,
    pub clear_artifact: bool,
    pub remote_path: Option<String>,
    pub retry_count: Option<u32>,
    pub next_attempt_at: Option<i64>,
    pub duration_secs: Option<i64>,
}

impl JobUpdate {
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(Some(message.into()));
        self
    }

    pub fn clear_error(mut self) -> Self {
        self.error_message = Some(None);
        self
    }

    pub fn with_artifact(mut self, path: impl Into<String>, size: i64) -> Self {
        self.artifact = Some(Artifact {
            path: path.into(),
            size,
        });
        self
    }

    pub fn without_artifact(mut self) -> Self {
        self.clear_artifact = true;
        self
    }

    pub fn with_remote_path(mut self, path: impl Into<String>) -> Self {
        self.remote_path = Some(path.into());
        self
    }

    pub fn with_retry(mut self, count: u32, next_attempt_at: i64) -> Self {
        self.retry_count = Some(count);
        self.next_attempt_at = Some(next_attempt_at);
        self
    }

    pub fn with_duration(mut self, secs: i64) -> Self {
        self.duration_secs = Some(secs);
        self
    }

    pub(crate) fn apply(self, job: &mut VideoJob) {
        if let Some(message) = self.error_message {
            job.error_message = message;
        }
        if self.clear_artifact {
            job.file_path = None;
            job.file_size = None;
        }
        if let Some(artifact) = self.artifact {
            job.file_path = Some(artifact.path);
            job.file_size = Some(artifact.size);
        }
        if let Some(remote) = self.remote_path {
            job.remote_path = Some(remote);
        }
        if let Some(count) = self.retry_count {
            job.retry_count = count;
        }
        if let Some(at) = self.next_attempt_at {
            job.next_attempt_at = at;
        }
        if let Some(secs) = self.duration_secs {
            job.duration_secs = Some(secs);
        }
    }
}

/// Aggregate job counts by status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStats {
    pub pending: u64,
    pub downloading: u64,
    pub downloaded: u64,
    pub uploading: u64,
    pub uploaded: u64,
    pub failed: u64,
    pub skipped: u64,
    pub total: u64,
    /// Sum of recorded artifact sizes.
    pub total_bytes: u64,
}

impl JobStats {
    pub fn count(&self, status: JobStatus) -> u64 {
        match status {
            JobStatus::Pending => self.pending,
            JobStatus::Downloading => self.downloading,
            JobStatus::Downloaded => self.downloaded,
            JobStatus::Uploading => self.uploading,
            JobStatus::Uploaded => self.uploaded,
            JobStatus::Failed => self.failed,
            JobStatus::Skipped => self.skipped,
        }
    }

    pub(crate) fn add(&mut self, status: JobStatus, count: u64) {
        let slot = match status {
            JobStatus::Pending => &mut self.pending,
            JobStatus::Downloading => &mut self.downloading,
            JobStatus::Downloaded => &mut self.downloaded,
            JobStatus::Uploading => &mut self.uploading,
            JobStatus::Uploaded => &mut self.uploaded,
            JobStatus::Failed => &mut self.failed,
            JobStatus::Skipped => &mut self.skipped,
        };
        *slot += count;
        self.total += count;
    }
}

/// One page of jobs for listing.
#[derive(Debug, Clone, Serialize)]
pub struct JobPage {
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
    pub jobs: Vec<VideoJob>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_str_roundtrip() {
        for status in JobStatus::ALL {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("paused".parse::<JobStatus>().is_err());
    }

    #[test]
    fn lifecycle_edges() {
        use JobStatus::*;
        assert!(Pending.can_transition_to(Downloading));
        assert!(Uploading.can_transition_to(Uploaded));
        assert!(Downloading.can_transition_to(Skipped));
        assert!(Failed.can_transition_to(Pending));
        assert!(!Uploaded.can_transition_to(Pending));
        assert!(!Uploaded.can_transition_to(Failed));
        assert!(!Skipped.can_transition_to(Pending));
        assert!(!Pending.can_transition_to(Uploaded));
        assert!(!Downloaded.can_transition_to(Pending));
    }

    #[test]
    fn classify_by_duration() {
        assert_eq!(VideoKind::classify(Some(45), 60), VideoKind::Short);
        assert_eq!(VideoKind::classify(Some(60), 60), VideoKind::Short);
        assert_eq!(VideoKind::classify(Some(61), 60), VideoKind::Regular);
        assert_eq!(VideoKind::classify(Some(0), 60), VideoKind::Unclassified);
        assert_eq!(VideoKind::classify(None, 60), VideoKind::Unclassified);
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&JobStatus::Downloading).unwrap(),
            "\"downloading\""
        );
    }
}
