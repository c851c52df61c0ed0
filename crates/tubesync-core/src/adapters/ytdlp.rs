//! `yt-dlp` backed fetcher and metadata source.
//!
//! Both run the executable through `tokio::process`. Progress comes from a
//! `--progress-template` line per update; the final path and duration from an
//! `after_move` print. Listings use `--flat-playlist --dump-json`, one JSON
//! object per line, newest first.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};

use crate::fetch::{FetchError, FetchRequest, FetchedVideo, Fetcher};
use crate::metadata::{Channel, MetadataError, MetadataSource, VideoDescriptor};
use crate::naming::local_stem;
use crate::progress::ProgressReporter;

const PROGRESS_PREFIX: &str = "TSP";
const DONE_PREFIX: &str = "TSDONE";
/// Upper bound on entries listed per channel and run.
const LISTING_LIMIT: u32 = 50;

/// stderr fragments meaning the video is a live or upcoming broadcast.
const LIVE_MARKERS: &[&str] = &[
    "is live",
    "live event will begin",
    "premieres in",
    "this live stream",
    "is_upcoming",
];

/// stderr fragments worth another attempt.
const RECOVERABLE: &[&str] = &[
    "broken pipe",
    "timed out",
    "connection reset",
    "connection refused",
    "network is unreachable",
    "temporary failure",
    "http error 429",
    "http error 500",
    "http error 502",
    "http error 503",
    "http error 504",
];

fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}

fn channel_url(channel_id: &str) -> String {
    format!("https://www.youtube.com/channel/{channel_id}/videos")
}

pub struct YtDlpFetcher {
    binary: PathBuf,
}

impl YtDlpFetcher {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for YtDlpFetcher {
    fn default() -> Self {
        Self::new("yt-dlp")
    }
}

#[async_trait]
impl Fetcher for YtDlpFetcher {
    async fn fetch(
        &self,
        request: &FetchRequest,
        progress: &ProgressReporter,
    ) -> Result<FetchedVideo, FetchError> {
        tokio::fs::create_dir_all(&request.target_dir)
            .await
            .map_err(|e| FetchError::Transient(format!("create download dir: {e}")))?;

        let output = request
            .target_dir
            .join(format!("{}.%(ext)s", local_stem(&request.video_id, &request.title)));
        let mut child = Command::new(&self.binary)
            .arg("--newline")
            .arg("--no-playlist")
            .arg("--progress")
            .arg("-f")
            .arg(request.quality.format_selector())
            .arg("--merge-output-format")
            .arg("mp4")
            .arg("--progress-template")
            .arg(format!(
                "download:{PROGRESS_PREFIX} %(progress.downloaded_bytes)s \
                 %(progress.total_bytes)s %(progress.total_bytes_estimate)s"
            ))
            .arg("--print")
            .arg(format!("after_move:{DONE_PREFIX} %(duration)s %(filepath)s"))
            .arg("-o")
            .arg(&output)
            .arg(watch_url(&request.video_id))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| FetchError::Transient(format!("spawn {}: {e}", self.binary.display())))?;

        let stderr = child.stderr.take().map(|mut pipe| {
            tokio::spawn(async move {
                let mut buf = String::new();
                let _ = pipe.read_to_string(&mut buf).await;
                buf
            })
        });

        let mut done: Option<(Option<u64>, PathBuf)> = None;
        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some((bytes_done, total)) = parse_progress_line(&line) {
                    progress.report(bytes_done, total);
                } else if let Some(finished) = parse_done_line(&line) {
                    done = Some(finished);
                }
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| FetchError::Transient(format!("wait for yt-dlp: {e}")))?;
        let stderr = match stderr {
            Some(handle) => handle.await.unwrap_or_default(),
            None => String::new(),
        };

        if !status.success() {
            return Err(classify_stderr(&stderr));
        }
        let Some((duration_secs, path)) = done else {
            return Err(FetchError::Transient(
                "yt-dlp exited without reporting an output file".to_string(),
            ));
        };

        let size = tokio::fs::metadata(&path)
            .await
            .map_err(|e| FetchError::Transient(format!("stat {}: {e}", path.display())))?
            .len();
        progress.report(size, Some(size));
        Ok(FetchedVideo {
            path,
            size,
            duration_secs,
        })
    }

    async fn probe_duration(&self, video_id: &str) -> Result<Option<u64>, FetchError> {
        let output = Command::new(&self.binary)
            .arg("--skip-download")
            .arg("--no-playlist")
            .arg("--print")
            .arg("%(live_status)s %(duration)s")
            .arg(watch_url(video_id))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| FetchError::Transient(format!("spawn {}: {e}", self.binary.display())))?;

        if !output.status.success() {
            return Err(classify_stderr(&String::from_utf8_lossy(&output.stderr)));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut fields = stdout.split_whitespace();
        let live_status = fields.next().unwrap_or_default();
        if matches!(live_status, "is_live" | "is_upcoming") {
            return Err(FetchError::LiveInProgress);
        }
        Ok(fields.next().and_then(parse_number))
    }
}

/// `NA` and empty fields parse as `None`; fractional values are truncated.
fn parse_number(field: &str) -> Option<u64> {
    let value: f64 = field.parse().ok()?;
    (value.is_finite() && value >= 0.0).then(|| value as u64)
}

/// `TSP <downloaded> <total> <estimate>` into bytes done and best total.
fn parse_progress_line(line: &str) -> Option<(u64, Option<u64>)> {
    let mut fields = line.strip_prefix(PROGRESS_PREFIX)?.split_whitespace();
    let done = parse_number(fields.next()?)?;
    let total = fields.next().and_then(parse_number);
    let estimate = fields.next().and_then(parse_number);
    Some((done, total.or(estimate)))
}

/// `TSDONE <duration> <path>`; the path may contain spaces.
fn parse_done_line(line: &str) -> Option<(Option<u64>, PathBuf)> {
    let rest = line.strip_prefix(DONE_PREFIX)?.trim_start();
    let (duration, path) = rest.split_once(' ')?;
    let path = path.trim();
    if path.is_empty() {
        return None;
    }
    Some((parse_number(duration), PathBuf::from(path)))
}

/// Map yt-dlp's stderr to a typed failure.
fn classify_stderr(stderr: &str) -> FetchError {
    let lower = stderr.to_lowercase();
    if LIVE_MARKERS.iter().any(|m| lower.contains(m)) {
        return FetchError::LiveInProgress;
    }
    let message = stderr
        .lines()
        .rev()
        .find(|l| l.starts_with("ERROR:"))
        .or_else(|| stderr.lines().rev().find(|l| !l.trim().is_empty()))
        .unwrap_or("yt-dlp failed")
        .trim()
        .to_string();
    if RECOVERABLE.iter().any(|m| lower.contains(m)) {
        FetchError::Transient(message)
    } else {
        FetchError::Unavailable(message)
    }
}

/// Lists the channels from `channels` in the config. Has no quota; HTTP 429
/// and network errors surface as `Transient`.
pub struct YtDlpMetadata {
    binary: PathBuf,
    channels: Vec<Channel>,
}

impl YtDlpMetadata {
    pub fn new(binary: impl Into<PathBuf>, channels: Vec<Channel>) -> Self {
        Self {
            binary: binary.into(),
            channels,
        }
    }

    fn spawn_listing(&self, channel: &Channel) -> Result<Child, MetadataError> {
        Command::new(&self.binary)
            .arg("--flat-playlist")
            .arg("--dump-json")
            .arg("--playlist-end")
            .arg(LISTING_LIMIT.to_string())
            .arg(channel_url(&channel.id))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| MetadataError::Transient(format!("spawn {}: {e}", self.binary.display())))
    }
}

#[derive(Debug, Deserialize)]
struct FlatEntry {
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    live_status: Option<String>,
    #[serde(default)]
    timestamp: Option<i64>,
    #[serde(default)]
    release_timestamp: Option<i64>,
}

impl From<FlatEntry> for VideoDescriptor {
    fn from(entry: FlatEntry) -> Self {
        let is_live = matches!(entry.live_status.as_deref(), Some("is_live" | "is_upcoming"));
        VideoDescriptor {
            title: entry.title.unwrap_or_else(|| entry.id.clone()),
            video_id: entry.id,
            published_at: entry.timestamp.or(entry.release_timestamp),
            duration_secs: entry
                .duration
                .filter(|d| d.is_finite() && *d >= 0.0)
                .map(|d| d.round() as u64),
            is_live,
        }
    }
}

fn parse_flat_entry(line: &str) -> Result<VideoDescriptor, MetadataError> {
    serde_json::from_str::<FlatEntry>(line)
        .map(VideoDescriptor::from)
        .map_err(|e| MetadataError::Transient(format!("unexpected listing output: {e}")))
}

fn classify_listing_error(stderr: &str) -> MetadataError {
    let lower = stderr.to_lowercase();
    let message = stderr
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("yt-dlp listing failed")
        .trim()
        .to_string();
    if lower.contains("sign in to confirm") || lower.contains("cookies") {
        MetadataError::AuthExpired(message)
    } else {
        MetadataError::Transient(message)
    }
}

enum Listing {
    Start,
    Reading {
        child: Child,
        lines: Lines<BufReader<ChildStdout>>,
    },
    Done,
}

#[async_trait]
impl MetadataSource for YtDlpMetadata {
    async fn subscriptions(&self) -> Result<Vec<Channel>, MetadataError> {
        Ok(self.channels.clone())
    }

    fn recent_videos<'a>(
        &'a self,
        channel: &'a Channel,
        published_after: i64,
    ) -> BoxStream<'a, Result<VideoDescriptor, MetadataError>> {
        stream::unfold(Listing::Start, move |state| async move {
            let (mut child, mut lines) = match state {
                Listing::Done => return None,
                Listing::Reading { child, lines } => (child, lines),
                Listing::Start => {
                    let mut child = match self.spawn_listing(channel) {
                        Ok(child) => child,
                        Err(e) => return Some((Err(e), Listing::Done)),
                    };
                    let Some(stdout) = child.stdout.take() else {
                        let err = MetadataError::Transient("listing stdout not captured".into());
                        return Some((Err(err), Listing::Done));
                    };
                    (child, BufReader::new(stdout).lines())
                }
            };

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) if line.trim().is_empty() => continue,
                    Ok(Some(line)) => {
                        let item = parse_flat_entry(&line);
                        // Newest first: the first video before the window ends the listing.
                        if let Ok(video) = &item {
                            if video.published_at.is_some_and(|at| at < published_after) {
                                let _ = child.start_kill();
                                return None;
                            }
                        }
                        return Some((item, Listing::Reading { child, lines }));
                    }
                    Ok(None) => break,
                    Err(e) => {
                        let err = MetadataError::Transient(format!("read listing: {e}"));
                        return Some((Err(err), Listing::Done));
                    }
                }
            }

            let mut stderr = String::new();
            if let Some(mut pipe) = child.stderr.take() {
                let _ = pipe.read_to_string(&mut stderr).await;
            }
            match child.wait().await {
                Ok(status) if status.success() => None,
                Ok(_) => Some((Err(classify_listing_error(&stderr)), Listing::Done)),
                Err(e) => Some((
                    Err(MetadataError::Transient(format!("wait for yt-dlp: {e}"))),
                    Listing::Done,
                )),
            }
        })
        .boxed()
    }
}
