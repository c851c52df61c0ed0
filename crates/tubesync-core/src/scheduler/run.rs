//! One sync run: subscription list, per-channel scan, enqueue.

use futures::StreamExt;

use crate::job_store::{unix_timestamp, NewVideoJob, VideoKind, LAST_SYNC_KEY, QUOTA_KEY};
use crate::metadata::{Channel, MetadataError};

use super::types::{ChannelError, ChannelResult, SyncRun, SyncStatus, SyncTrigger};
use super::{RunGuard, SyncScheduler};

const DAY_SECS: i64 = 24 * 3600;

enum ScanOutcome {
    Complete,
    Failed(String),
    QuotaExceeded(Option<i64>),
}

struct ChannelScan {
    queued: u32,
    outcome: ScanOutcome,
}

impl SyncScheduler {
    pub(super) async fn execute(&self, trigger: SyncTrigger, _guard: RunGuard) -> SyncRun {
        let now = unix_timestamp();
        let mut run = SyncRun::start(trigger, now);
        self.set_current(&run);
        tracing::info!(?trigger, "sync run started");

        if self.quota.is_exhausted(now) {
            let status = self.quota.snapshot();
            tracing::info!(reset_at = ?status.reset_at, "metadata quota exhausted, skipping sync run");
            run.quota = Some(status);
            return self.finish(run, SyncStatus::Completed).await;
        }

        let channels = match self.metadata.subscriptions().await {
            Ok(channels) => channels,
            Err(MetadataError::QuotaExceeded { reset_at }) => {
                run.quota = Some(self.quota.mark_exhausted(reset_at, unix_timestamp()));
                return self.finish(run, SyncStatus::Completed).await;
            }
            Err(e) => {
                tracing::error!("fetch subscriptions: {e}");
                run.error = Some(e.to_string());
                return self.finish(run, SyncStatus::Failed).await;
            }
        };
        let cfg = self.config.current();
        let (channels, disabled): (Vec<Channel>, Vec<Channel>) = channels
            .into_iter()
            .partition(|channel| cfg.channel_enabled(&channel.id));
        if !disabled.is_empty() {
            tracing::debug!(disabled = disabled.len(), "skipping disabled channels");
        }
        run.channels_total = channels.len() as u32;
        self.set_current(&run);

        let published_after = now - i64::from(cfg.sync_days_back) * DAY_SECS;
        let delay = cfg.channel_scan_delay();

        for (i, channel) in channels.iter().enumerate() {
            if i > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let scan = self.scan_channel(channel, published_after).await;
            if scan.queued > 0 {
                run.total_videos_found += scan.queued;
                run.channel_results.push(ChannelResult {
                    channel_id: channel.id.clone(),
                    channel_name: channel.name.clone(),
                    videos_found: scan.queued,
                });
            }

            match scan.outcome {
                ScanOutcome::Complete => run.channels_scanned += 1,
                ScanOutcome::Failed(error) => {
                    tracing::warn!(channel = %channel.name, "channel scan failed: {error}");
                    run.channels_scanned += 1;
                    run.channel_errors.push(ChannelError {
                        channel_id: channel.id.clone(),
                        channel_name: channel.name.clone(),
                        error,
                    });
                }
                ScanOutcome::QuotaExceeded(reset_at) => {
                    tracing::warn!(channel = %channel.name, "metadata quota exhausted mid-run, stopping scan");
                    run.quota = Some(self.quota.mark_exhausted(reset_at, unix_timestamp()));
                    self.set_current(&run);
                    break;
                }
            }
            self.set_current(&run);
        }

        self.finish(run, SyncStatus::Completed).await
    }

    async fn scan_channel(&self, channel: &Channel, published_after: i64) -> ChannelScan {
        let threshold = self.config.current().shorts_max_duration_secs;
        let mut videos = self.metadata.recent_videos(channel, published_after);
        let mut queued = 0;

        while let Some(item) = videos.next().await {
            let video = match item {
                Ok(video) => video,
                Err(MetadataError::QuotaExceeded { reset_at }) => {
                    return ChannelScan {
                        queued,
                        outcome: ScanOutcome::QuotaExceeded(reset_at),
                    };
                }
                Err(e) => {
                    return ChannelScan {
                        queued,
                        outcome: ScanOutcome::Failed(e.to_string()),
                    };
                }
            };

            if video.is_live {
                tracing::debug!(video_id = %video.video_id, "skipping live broadcast");
                continue;
            }
            if video.published_at.is_some_and(|at| at < published_after) {
                continue;
            }

            let job = NewVideoJob {
                video_id: video.video_id,
                channel_id: channel.id.clone(),
                channel_name: channel.name.clone(),
                title: video.title,
                duration_secs: video.duration_secs,
                published_at: video.published_at,
                kind: VideoKind::classify(video.duration_secs, threshold),
            };
            match self.store.create_if_absent(&job).await {
                Ok(true) => {
                    tracing::debug!(video_id = %job.video_id, kind = job.kind.as_str(), "queued");
                    queued += 1;
                }
                Ok(false) => match self.store.requeue_failed(&job.video_id).await {
                    Ok(true) => {
                        tracing::info!(video_id = %job.video_id, "re-queued failed video");
                        queued += 1;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        return ChannelScan {
                            queued,
                            outcome: ScanOutcome::Failed(e.to_string()),
                        };
                    }
                },
                Err(e) => {
                    return ChannelScan {
                        queued,
                        outcome: ScanOutcome::Failed(e.to_string()),
                    };
                }
            }
        }

        ChannelScan {
            queued,
            outcome: ScanOutcome::Complete,
        }
    }

    async fn finish(&self, mut run: SyncRun, status: SyncStatus) -> SyncRun {
        run.status = status;
        run.finished_at = Some(unix_timestamp());
        self.set_current(&run);

        if let Err(e) = self.store.save_state(LAST_SYNC_KEY, &run).await {
            tracing::warn!("persist sync run: {e}");
        }
        if let Err(e) = self.store.save_state(QUOTA_KEY, &self.quota.snapshot()).await {
            tracing::warn!("persist quota state: {e}");
        }
        if let Err(e) = self.store.publish_stats().await {
            tracing::debug!("stats after sync: {e}");
        }

        tracing::info!(
            status = ?run.status,
            channels_scanned = run.channels_scanned,
            channels_total = run.channels_total,
            videos_found = run.total_videos_found,
            "sync run finished"
        );
        run
    }
}
