//! Errors returned by job store operations.

use thiserror::Error;

use super::types::{JobId, JobStatus};

#[derive(Debug, Error)]
pub enum StoreError {
    /// Storage I/O failed; callers retry at their next loop iteration.
    #[error("job store unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),

    /// Compare-and-set lost: the job is not in the expected status (or changed
    /// underneath the caller).
    #[error("job {id} conflict: expected {expected}, found {actual}")]
    Conflict {
        id: JobId,
        expected: JobStatus,
        actual: JobStatus,
    },

    #[error("job {0} not found")]
    NotFound(JobId),

    #[error("job {id} is leased by {owner}")]
    Leased { id: JobId, owner: String },

    #[error("invalid transition {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("corrupt job row: {0}")]
    Corrupt(String),

    #[error("state serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}
