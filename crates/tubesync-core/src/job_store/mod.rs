//! Durable job store (SQLite).
//!
//! Single source of truth for video jobs. Workers coordinate only through it:
//! a claim leases a job to one worker, every status change is a
//! compare-and-set, and every successful change is published on the event bus.
//! Retry state (count and next eligible time) lives on the row so it survives
//! restarts.

mod app_state;
mod db;
mod error;
mod jobs;
mod types;

pub use app_state::{LAST_SYNC_KEY, QUOTA_KEY};
pub use db::{unix_timestamp, JobStore};
pub use error::StoreError;
pub use types::{
    Artifact, JobId, JobPage, JobStats, JobStatus, JobUpdate, KindFilter, NewVideoJob, VideoJob,
    VideoKind,
};

#[cfg(test)]
pub(crate) use db::open_memory;
