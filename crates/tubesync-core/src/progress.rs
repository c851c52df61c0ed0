//! Progress reporting for active transfers (bytes done, ETA, rate).
//!
//! Collaborators call [`ProgressReporter::report`] as bytes move. The reporter
//! keeps the active-transfer table current for pull-based clients and
//! publishes throttled progress events on the bus. Persisted job status is
//! never touched.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::events::{Event, EventBus, TransferProgress};
use crate::job_store::VideoJob;

/// Minimum spacing between progress events for one transfer.
const EMIT_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Download,
    Upload,
}

/// Snapshot of transfer progress; rate and ETA derive from elapsed time.
#[derive(Debug, Clone)]
pub struct ProgressStats {
    pub bytes_done: u64,
    /// Total size, when the collaborator knows it.
    pub total_bytes: Option<u64>,
    /// Elapsed time since transfer start (seconds).
    pub elapsed_secs: f64,
}

impl ProgressStats {
    /// Transfer rate in bytes per second (0 if elapsed is 0).
    pub fn bytes_per_sec(&self) -> f64 {
        if self.elapsed_secs <= 0.0 {
            return 0.0;
        }
        self.bytes_done as f64 / self.elapsed_secs
    }

    /// Estimated seconds remaining (None if the total or rate is unknown).
    pub fn eta_secs(&self) -> Option<f64> {
        let total = self.total_bytes?;
        let remaining = total.saturating_sub(self.bytes_done);
        if remaining == 0 {
            return Some(0.0);
        }
        let rate = self.bytes_per_sec();
        if rate <= 0.0 {
            return None;
        }
        Some(remaining as f64 / rate)
    }

    /// Fraction complete in [0.0, 1.0]; 0.0 while the total is unknown.
    pub fn fraction(&self) -> f64 {
        match self.total_bytes {
            Some(0) => 1.0,
            Some(total) => (self.bytes_done as f64 / total as f64).min(1.0),
            None => 0.0,
        }
    }
}

/// Transfers currently running, keyed by worker name.
#[derive(Debug, Clone, Default)]
pub struct ActiveTransfers {
    inner: Arc<Mutex<HashMap<String, (Direction, TransferProgress)>>>,
}

impl ActiveTransfers {
    pub fn new() -> Self {
        Self::default()
    }

    fn put(&self, direction: Direction, progress: TransferProgress) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(progress.worker.clone(), (direction, progress));
    }

    fn remove(&self, worker: &str) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(worker);
    }

    /// Current transfers in one direction, ordered by job id.
    pub fn snapshot(&self, direction: Direction) -> Vec<TransferProgress> {
        let mut out: Vec<TransferProgress> = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|(d, _)| *d == direction)
            .map(|(_, p)| p.clone())
            .collect();
        out.sort_by_key(|p| p.job_id);
        out
    }
}

/// Handed to a collaborator for the duration of one transfer. Dropping it
/// removes the transfer from the active table.
pub struct ProgressReporter {
    direction: Direction,
    template: TransferProgress,
    bus: Option<EventBus>,
    transfers: Option<ActiveTransfers>,
    started: Instant,
    last_emit: Mutex<Option<Instant>>,
}

impl ProgressReporter {
    pub fn new(
        direction: Direction,
        job: &VideoJob,
        worker: &str,
        bus: EventBus,
        transfers: ActiveTransfers,
    ) -> Self {
        let template = TransferProgress {
            job_id: job.id,
            video_id: job.video_id.clone(),
            title: job.title.clone(),
            worker: worker.to_string(),
            bytes_done: 0,
            bytes_total: None,
            percent: 0.0,
            speed_bps: 0.0,
            eta_secs: None,
        };
        transfers.put(direction, template.clone());
        Self {
            direction,
            template,
            bus: Some(bus),
            transfers: Some(transfers),
            started: Instant::now(),
            last_emit: Mutex::new(None),
        }
    }

    /// A reporter that records nothing; for probes and connection checks.
    pub fn detached() -> Self {
        Self {
            direction: Direction::Download,
            template: TransferProgress {
                job_id: 0,
                video_id: String::new(),
                title: String::new(),
                worker: String::new(),
                bytes_done: 0,
                bytes_total: None,
                percent: 0.0,
                speed_bps: 0.0,
                eta_secs: None,
            },
            bus: None,
            transfers: None,
            started: Instant::now(),
            last_emit: Mutex::new(None),
        }
    }

    /// Record progress. Events are throttled; the final report (done == total)
    /// is always published.
    pub fn report(&self, bytes_done: u64, bytes_total: Option<u64>) {
        let stats = ProgressStats {
            bytes_done,
            total_bytes: bytes_total,
            elapsed_secs: self.started.elapsed().as_secs_f64(),
        };
        let progress = TransferProgress {
            bytes_done,
            bytes_total,
            percent: stats.fraction() * 100.0,
            speed_bps: stats.bytes_per_sec(),
            eta_secs: stats.eta_secs(),
            ..self.template.clone()
        };

        if let Some(transfers) = &self.transfers {
            transfers.put(self.direction, progress.clone());
        }

        let Some(bus) = &self.bus else {
            return;
        };
        let finished = bytes_total.is_some_and(|total| bytes_done >= total);
        let now = Instant::now();
        {
            let mut last = self.last_emit.lock().unwrap_or_else(PoisonError::into_inner);
            let due = last.map_or(true, |at| now.duration_since(at) >= EMIT_INTERVAL);
            if !due && !finished {
                return;
            }
            *last = Some(now);
        }
        let event = match self.direction {
            Direction::Download => Event::DownloadProgress(progress),
            Direction::Upload => Event::UploadProgress(progress),
        };
        bus.publish(event);
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        if let Some(transfers) = &self.transfers {
            transfers.remove(&self.template.worker);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job_store::{JobStatus, VideoKind};

    fn job() -> VideoJob {
        VideoJob {
            id: 7,
            video_id: "abc".into(),
            channel_id: "UC".into(),
            channel_name: "C".into(),
            title: "Title".into(),
            duration_secs: Some(100),
            kind: VideoKind::Regular,
            status: JobStatus::Downloading,
            lease_owner: Some("download-0".into()),
            version: 1,
            retry_count: 0,
            next_attempt_at: 0,
            error_message: None,
            file_path: None,
            file_size: None,
            remote_path: None,
            published_at: None,
            created_at: 0,
            updated_at: 0,
            downloaded_at: None,
            uploaded_at: None,
        }
    }

    #[test]
    fn stats_fraction_and_eta() {
        let stats = ProgressStats {
            bytes_done: 50,
            total_bytes: Some(200),
            elapsed_secs: 5.0,
        };
        assert!((stats.fraction() - 0.25).abs() < 1e-9);
        assert!((stats.bytes_per_sec() - 10.0).abs() < 1e-9);
        assert_eq!(stats.eta_secs(), Some(15.0));

        let unknown = ProgressStats {
            total_bytes: None,
            ..stats
        };
        assert_eq!(unknown.fraction(), 0.0);
        assert_eq!(unknown.eta_secs(), None);
    }

    #[test]
    fn reporter_tracks_active_transfer_and_throttles() {
        let bus = EventBus::new(16);
        let mut sub = bus.subscribe();
        let transfers = ActiveTransfers::new();
        let reporter = ProgressReporter::new(
            Direction::Download,
            &job(),
            "download-0",
            bus.clone(),
            transfers.clone(),
        );
        assert_eq!(transfers.snapshot(Direction::Download).len(), 1);
        assert!(transfers.snapshot(Direction::Upload).is_empty());

        reporter.report(10, Some(100));
        reporter.report(20, Some(100)); // throttled
        reporter.report(100, Some(100)); // final always emitted

        let mut percents = Vec::new();
        while let Some(Event::DownloadProgress(p)) = sub.try_recv() {
            percents.push(p.percent.round() as u32);
        }
        assert_eq!(percents, vec![10, 100]);
        assert_eq!(transfers.snapshot(Direction::Download)[0].bytes_done, 100);

        drop(reporter);
        assert!(transfers.snapshot(Direction::Download).is_empty());
    }
}
