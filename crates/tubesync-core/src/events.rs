//! Event bus: best-effort fan-out of progress and status events.
//!
//! Each subscriber owns a bounded ring inside a `tokio::sync::broadcast`
//! channel. Publishing never waits on subscribers; a subscriber that falls
//! behind loses its oldest events and keeps receiving from the newest ones.
//! Nothing is persisted, so a reconnecting observer pulls a snapshot from the
//! job store instead of replaying.

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

use crate::job_store::{JobId, JobStats, JobStatus, VideoJob};

const DEFAULT_CAPACITY: usize = 256;

/// Incremental progress of one active transfer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferProgress {
    pub job_id: JobId,
    pub video_id: String,
    pub title: String,
    /// Name of the worker running the transfer.
    pub worker: String,
    pub bytes_done: u64,
    pub bytes_total: Option<u64>,
    /// 0.0 ..= 100.0; 0.0 while the total is unknown.
    pub percent: f64,
    pub speed_bps: f64,
    pub eta_secs: Option<f64>,
}

/// A job moved between statuses. `from` is `None` for a newly created job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusChange {
    pub job_id: JobId,
    pub video_id: String,
    pub from: Option<JobStatus>,
    pub to: JobStatus,
    pub error: Option<String>,
}

impl StatusChange {
    pub(crate) fn for_job(job: &VideoJob, from: Option<JobStatus>) -> Self {
        Self {
            job_id: job.id,
            video_id: job.video_id.clone(),
            from,
            to: job.status,
            error: job.error_message.clone(),
        }
    }
}

/// Events delivered to live observers. Serialized with a `type` tag
/// (`download_progress`, `upload_progress`, `status_change`, `stats_update`).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    DownloadProgress(TransferProgress),
    UploadProgress(TransferProgress),
    StatusChange(StatusChange),
    StatsUpdate(JobStats),
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::DownloadProgress(_) => "download_progress",
            Event::UploadProgress(_) => "upload_progress",
            Event::StatusChange(_) => "status_change",
            Event::StatsUpdate(_) => "stats_update",
        }
    }
}

/// Cloneable handle for publishing and subscribing.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    /// `capacity` is the per-subscriber buffer before oldest events are dropped.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish to all current subscribers. Returns how many will see it;
    /// zero subscribers is not an error.
    pub fn publish(&self, event: Event) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Receiving side of the bus for one observer.
#[derive(Debug)]
pub struct Subscription {
    receiver: broadcast::Receiver<Event>,
}

impl Subscription {
    /// Next event, skipping over any that were dropped while lagging.
    /// `None` once every publisher handle is gone.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "event subscriber lagged, oldest events dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`Subscription::recv`].
    pub fn try_recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "event subscriber lagged, oldest events dropped");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats_event(total: u64) -> Event {
        Event::StatsUpdate(JobStats {
            total,
            ..JobStats::default()
        })
    }

    #[test]
    fn publish_without_subscribers_is_fine() {
        let bus = EventBus::new(4);
        assert_eq!(bus.publish(stats_event(1)), 0);
    }

    #[test]
    fn lagging_subscriber_keeps_newest() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();
        for i in 0..5 {
            bus.publish(stats_event(i));
        }
        let mut seen = Vec::new();
        while let Some(Event::StatsUpdate(stats)) = sub.try_recv() {
            seen.push(stats.total);
        }
        assert_eq!(seen, vec![3, 4]);
    }

    #[tokio::test]
    async fn every_subscriber_receives() {
        let bus = EventBus::new(8);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        assert_eq!(bus.publish(stats_event(7)), 2);
        assert_eq!(a.recv().await.unwrap().kind(), "stats_update");
        assert_eq!(b.recv().await.unwrap().kind(), "stats_update");
    }

    #[test]
    fn serializes_with_type_tag() {
        let event = Event::StatusChange(StatusChange {
            job_id: 3,
            video_id: "abc".into(),
            from: Some(JobStatus::Pending),
            to: JobStatus::Downloading,
            error: None,
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "status_change");
        assert_eq!(json["to"], "downloading");
        assert_eq!(json["job_id"], 3);
    }
}
