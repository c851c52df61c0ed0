//! Metadata quota state.
//!
//! Set when the metadata source reports quota exhaustion; read by the sync
//! scheduler before each run. The flag clears itself once the reset time has
//! passed. Download and upload pools never consult it.

use serde::{Deserialize, Serialize};
use std::sync::{PoisonError, RwLock};

/// Quota resets at midnight Pacific; a fixed UTC-8 offset is close enough for
/// an estimate (DST shifts it by an hour at most).
const PACIFIC_OFFSET_SECS: i64 = 8 * 3600;
const DAY_SECS: i64 = 24 * 3600;

/// Persistable view of the quota condition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaStatus {
    pub exceeded: bool,
    /// Unix seconds at which requests are expected to succeed again.
    pub reset_at: Option<i64>,
}

#[derive(Debug, Default)]
pub struct QuotaState {
    inner: RwLock<QuotaStatus>,
}

impl QuotaState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a persisted status (e.g. after a restart).
    pub fn restore(status: QuotaStatus) -> Self {
        Self {
            inner: RwLock::new(status),
        }
    }

    pub fn snapshot(&self) -> QuotaStatus {
        *self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether runs should be skipped at `now`. Clears an expired condition.
    pub fn is_exhausted(&self, now: i64) -> bool {
        let status = self.snapshot();
        if !status.exceeded {
            return false;
        }
        match status.reset_at {
            Some(reset_at) if now >= reset_at => {
                self.clear();
                tracing::info!(reset_at, "metadata quota reset time passed");
                false
            }
            _ => true,
        }
    }

    /// Record exhaustion. Without a reset estimate from the source, the next
    /// Pacific midnight is assumed.
    pub fn mark_exhausted(&self, reset_at: Option<i64>, now: i64) -> QuotaStatus {
        let status = QuotaStatus {
            exceeded: true,
            reset_at: Some(reset_at.unwrap_or_else(|| next_pacific_midnight(now))),
        };
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = status;
        tracing::warn!(reset_at = status.reset_at, "metadata quota exhausted");
        status
    }

    pub fn clear(&self) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = QuotaStatus::default();
    }
}

/// Next midnight in UTC-8 strictly after `now`, as Unix seconds.
pub fn next_pacific_midnight(now: i64) -> i64 {
    let local = now - PACIFIC_OFFSET_SECS;
    let next_local_midnight = (local.div_euclid(DAY_SECS) + 1) * DAY_SECS;
    next_local_midnight + PACIFIC_OFFSET_SECS
}
