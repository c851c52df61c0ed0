//! Sync run record and related types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::quota::QuotaStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTrigger {
    Scheduled,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Running,
    Completed,
    Failed,
}

/// A channel that yielded at least one newly queued video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelResult {
    pub channel_id: String,
    pub channel_name: String,
    pub videos_found: u32,
}

/// A channel whose scan failed; the run continued with the next channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelError {
    pub channel_id: String,
    pub channel_name: String,
    pub error: String,
}

/// One discovery pass over all subscribed channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRun {
    pub trigger: SyncTrigger,
    pub status: SyncStatus,
    pub started_at: i64,
    pub finished_at: Option<i64>,
    pub channels_scanned: u32,
    pub channels_total: u32,
    pub total_videos_found: u32,
    pub channel_results: Vec<ChannelResult>,
    #[serde(default)]
    pub channel_errors: Vec<ChannelError>,
    /// Set when the run was skipped or cut short by quota exhaustion.
    pub quota: Option<QuotaStatus>,
    /// Whole-run failure (e.g. the subscription list could not be fetched).
    pub error: Option<String>,
}

impl SyncRun {
    pub fn start(trigger: SyncTrigger, now: i64) -> Self {
        Self {
            trigger,
            status: SyncStatus::Running,
            started_at: now,
            finished_at: None,
            channels_scanned: 0,
            channels_total: 0,
            total_videos_found: 0,
            channel_results: Vec::new(),
            channel_errors: Vec::new(),
            quota: None,
            error: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == SyncStatus::Running
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("a sync run is already in progress")]
    Busy,
}
