//! Pause flags for the download and upload pools.
//!
//! A flag is observed by worker loops before each claim; it never interrupts a
//! transfer that is already running. Toggling a flag to the value it already
//! has is a no-op.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

/// Which pool a pause flag applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseTarget {
    Downloads,
    Uploads,
}

impl fmt::Display for PauseTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PauseTarget::Downloads => "downloads",
            PauseTarget::Uploads => "uploads",
        })
    }
}

/// Snapshot of both flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseState {
    pub downloads_paused: bool,
    pub uploads_paused: bool,
}

#[derive(Debug, Default)]
struct PauseFlag {
    paused: AtomicBool,
    resumed: Notify,
}

/// Process-wide pause flags, injected into each worker loop.
#[derive(Debug, Default)]
pub struct PauseController {
    downloads: PauseFlag,
    uploads: PauseFlag,
}

impl PauseController {
    pub fn new() -> Self {
        Self::default()
    }

    fn flag(&self, target: PauseTarget) -> &PauseFlag {
        match target {
            PauseTarget::Downloads => &self.downloads,
            PauseTarget::Uploads => &self.uploads,
        }
    }

    pub fn is_paused(&self, target: PauseTarget) -> bool {
        self.flag(target).paused.load(Ordering::Acquire)
    }

    /// Set a flag. Returns whether the value changed.
    pub fn set_paused(&self, target: PauseTarget, paused: bool) -> bool {
        let flag = self.flag(target);
        let previous = flag.paused.swap(paused, Ordering::AcqRel);
        if previous && !paused {
            flag.resumed.notify_waiters();
        }
        if previous != paused {
            tracing::info!(%target, paused, "pause flag changed");
        }
        previous != paused
    }

    pub fn state(&self) -> PauseState {
        PauseState {
            downloads_paused: self.is_paused(PauseTarget::Downloads),
            uploads_paused: self.is_paused(PauseTarget::Uploads),
        }
    }

    /// Wait until `target` is not paused. Returns immediately if it isn't.
    pub async fn wait_until_resumed(&self, target: PauseTarget) {
        let flag = self.flag(target);
        loop {
            let notified = flag.resumed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if !flag.paused.load(Ordering::Acquire) {
                return;
            }
            notified.await;
        }
    }
}
