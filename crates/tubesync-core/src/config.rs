//! Configuration loaded from `~/.config/tubesync/config.toml`.
//!
//! Every section carries `#[serde(default)]` so a partial file (or an older file
//! missing newer keys) still loads with built-in defaults.
//!
//! A running engine reads settings through a [`ConfigHandle`]; the control
//! surface replaces them with a validated [`ConfigUpdate`] that is also
//! written back to the file.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use thiserror::Error;

use crate::retry::RetryPolicy;
use crate::transport::Credentials;

/// Retry policy parameters shared by the download and upload pools.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts per stage (including the first).
    pub max_attempts: u32,
    /// Base delay in seconds for exponential backoff.
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_secs: 30.0,
            max_delay_secs: 3600,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_secs_f64(self.base_delay_secs.max(0.0)),
            max_delay: Duration::from_secs(self.max_delay_secs),
        }
    }
}

/// Requested video quality; mapped to a yt-dlp format selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VideoQuality {
    #[default]
    #[serde(rename = "best")]
    Best,
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "480p")]
    P480,
}

impl VideoQuality {
    pub fn format_selector(self) -> &'static str {
        match self {
            VideoQuality::Best => "bestvideo+bestaudio/best",
            VideoQuality::P1080 => "bestvideo[height<=1080]+bestaudio/best[height<=1080]",
            VideoQuality::P720 => "bestvideo[height<=720]+bestaudio/best[height<=720]",
            VideoQuality::P480 => "bestvideo[height<=480]+bestaudio/best[height<=480]",
        }
    }
}

/// Remote file-share destination for finished downloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// When false no upload workers are started and jobs stay `downloaded`.
    pub enabled: bool,
    pub host: String,
    pub share: String,
    pub user: String,
    pub password: String,
    /// Directory on the share for regular videos.
    pub path: String,
    /// Directory on the share for shorts.
    pub shorts_path: String,
    /// Local mount point of the share used by the mounted-share transport.
    pub mount_root: Option<PathBuf>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: String::new(),
            share: "video".to_string(),
            user: String::new(),
            password: String::new(),
            path: "/youtube".to_string(),
            shorts_path: "/shorts".to_string(),
            mount_root: None,
        }
    }
}

impl TransportConfig {
    pub fn credentials(&self) -> Credentials {
        Credentials {
            host: self.host.clone(),
            share: self.share.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
        }
    }

    /// Remote directory for a job, depending on whether it is a short.
    pub fn directory_for(&self, is_short: bool) -> &str {
        if is_short {
            &self.shorts_path
        } else {
            &self.path
        }
    }
}

/// HTTP control surface bind address.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1".to_string(),
            port: 8090,
        }
    }
}

/// Worker loop tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// How long an idle worker sleeps before polling the store again.
    pub idle_poll_ms: u64,
    /// Grace period for in-flight transfers on shutdown.
    pub shutdown_grace_secs: u64,
    /// Capacity of the event bus ring; slow subscribers lose the oldest events.
    pub event_buffer: usize,
    /// Interval of the orphaned-lease watchdog.
    pub watchdog_interval_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            idle_poll_ms: 1000,
            shutdown_grace_secs: 30,
            event_buffer: 256,
            watchdog_interval_secs: 300,
        }
    }
}

impl WorkerConfig {
    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms.max(1))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// A subscribed channel. Used by the yt-dlp metadata source in place of an
/// authenticated subscription listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub id: String,
    pub name: String,
    /// Disabled channels are left out of sync runs.
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

/// Global configuration loaded from `~/.config/tubesync/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TubesyncConfig {
    /// Directory for downloaded artifacts.
    pub download_dir: PathBuf,
    pub video_quality: VideoQuality,
    /// Regular download pool size.
    pub max_concurrent_downloads: usize,
    /// Shorts download pool size.
    pub max_concurrent_shorts_downloads: usize,
    /// Upload pool size.
    pub max_concurrent_uploads: usize,
    /// Delete the local artifact once its upload is confirmed.
    pub delete_after_upload: bool,
    /// Videos at most this long (and longer than zero) are shorts.
    pub shorts_max_duration_secs: u64,
    /// Run the periodic sync loop.
    pub auto_sync_enabled: bool,
    pub sync_interval_secs: u64,
    pub sync_startup_delay_secs: u64,
    /// Discovery window in days.
    pub sync_days_back: u32,
    /// Pause between channel scans within one sync run.
    pub channel_scan_delay_ms: u64,
    pub channels: Vec<ChannelConfig>,
    pub retry: RetryConfig,
    pub transport: TransportConfig,
    pub server: ServerConfig,
    pub workers: WorkerConfig,
}

impl Default for TubesyncConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            video_quality: VideoQuality::Best,
            max_concurrent_downloads: 3,
            max_concurrent_shorts_downloads: 3,
            max_concurrent_uploads: 3,
            delete_after_upload: true,
            shorts_max_duration_secs: 60,
            auto_sync_enabled: true,
            sync_interval_secs: 3600,
            sync_startup_delay_secs: 30,
            sync_days_back: 5,
            channel_scan_delay_ms: 200,
            channels: Vec::new(),
            retry: RetryConfig::default(),
            transport: TransportConfig::default(),
            server: ServerConfig::default(),
            workers: WorkerConfig::default(),
        }
    }
}

impl TubesyncConfig {
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn sync_startup_delay(&self) -> Duration {
        Duration::from_secs(self.sync_startup_delay_secs)
    }

    pub fn channel_scan_delay(&self) -> Duration {
        Duration::from_millis(self.channel_scan_delay_ms)
    }

    /// False only for a channel listed here with `enabled = false`; channels
    /// the metadata source knows but this file does not are scanned.
    pub fn channel_enabled(&self, channel_id: &str) -> bool {
        self.channels
            .iter()
            .find(|c| c.id == channel_id)
            .map_or(true, |c| c.enabled)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let pools = [
            ("max_concurrent_downloads", self.max_concurrent_downloads),
            ("max_concurrent_shorts_downloads", self.max_concurrent_shorts_downloads),
            ("max_concurrent_uploads", self.max_concurrent_uploads),
        ];
        for (field, size) in pools {
            if size == 0 {
                return Err(ConfigError::Invalid(format!("{field} must be at least 1")));
            }
        }
        if self.sync_interval_secs == 0 {
            return Err(ConfigError::Invalid("sync_interval_secs must be positive".into()));
        }
        if self.sync_days_back == 0 {
            return Err(ConfigError::Invalid("sync_days_back must be at least 1".into()));
        }
        if self.download_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("download_dir must not be empty".into()));
        }
        if self.transport.enabled && self.transport.host.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "transport.host is required when the transport is enabled".into(),
            ));
        }
        let mut seen = BTreeSet::new();
        for channel in &self.channels {
            if channel.id.trim().is_empty() {
                return Err(ConfigError::Invalid("channel id must not be empty".into()));
            }
            if !seen.insert(channel.id.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate channel {}", channel.id)));
            }
        }
        Ok(())
    }

    /// Copy safe to hand to observers: the share password is blanked.
    pub fn redacted(&self) -> TubesyncConfig {
        let mut cfg = self.clone();
        cfg.transport.password.clear();
        cfg
    }

    /// Whether going from `previous` to `self` changes something only read
    /// when the engine starts: pool sizes, the upload pool itself, the share
    /// mount or the channel list handed to the metadata source.
    pub fn requires_restart_from(&self, previous: &TubesyncConfig) -> bool {
        let channel_ids = |cfg: &TubesyncConfig| -> BTreeSet<String> {
            cfg.channels.iter().map(|c| c.id.clone()).collect()
        };
        self.max_concurrent_downloads != previous.max_concurrent_downloads
            || self.max_concurrent_shorts_downloads != previous.max_concurrent_shorts_downloads
            || self.max_concurrent_uploads != previous.max_concurrent_uploads
            || self.transport.enabled != previous.transport.enabled
            || self.transport.mount_root != previous.transport.mount_root
            || channel_ids(self) != channel_ids(previous)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("save config: {0:#}")]
    Persist(anyhow::Error),
}

/// Partial settings change. Absent fields keep their current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigUpdate {
    pub download_dir: Option<PathBuf>,
    pub video_quality: Option<VideoQuality>,
    pub max_concurrent_downloads: Option<usize>,
    pub max_concurrent_shorts_downloads: Option<usize>,
    pub max_concurrent_uploads: Option<usize>,
    pub delete_after_upload: Option<bool>,
    pub shorts_max_duration_secs: Option<u64>,
    pub auto_sync_enabled: Option<bool>,
    pub sync_interval_secs: Option<u64>,
    pub sync_days_back: Option<u32>,
    /// Replaces the whole channel list.
    pub channels: Option<Vec<ChannelConfig>>,
    pub transport: Option<TransportUpdate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransportUpdate {
    pub enabled: Option<bool>,
    pub host: Option<String>,
    pub share: Option<String>,
    pub user: Option<String>,
    /// An empty string keeps the stored password, so a form that never saw
    /// the password can be submitted unchanged.
    pub password: Option<String>,
    pub path: Option<String>,
    pub shorts_path: Option<String>,
}

fn merge<T>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

impl ConfigUpdate {
    pub fn apply_to(self, cfg: &mut TubesyncConfig) {
        merge(&mut cfg.download_dir, self.download_dir);
        merge(&mut cfg.video_quality, self.video_quality);
        merge(&mut cfg.max_concurrent_downloads, self.max_concurrent_downloads);
        merge(&mut cfg.max_concurrent_shorts_downloads, self.max_concurrent_shorts_downloads);
        merge(&mut cfg.max_concurrent_uploads, self.max_concurrent_uploads);
        merge(&mut cfg.delete_after_upload, self.delete_after_upload);
        merge(&mut cfg.shorts_max_duration_secs, self.shorts_max_duration_secs);
        merge(&mut cfg.auto_sync_enabled, self.auto_sync_enabled);
        merge(&mut cfg.sync_interval_secs, self.sync_interval_secs);
        merge(&mut cfg.sync_days_back, self.sync_days_back);
        merge(&mut cfg.channels, self.channels);
        if let Some(t) = self.transport {
            let target = &mut cfg.transport;
            merge(&mut target.enabled, t.enabled);
            merge(&mut target.host, t.host);
            merge(&mut target.share, t.share);
            merge(&mut target.user, t.user);
            merge(&mut target.password, t.password.filter(|p| !p.is_empty()));
            merge(&mut target.path, t.path);
            merge(&mut target.shorts_path, t.shorts_path);
        }
    }
}

/// Result of a settings change.
#[derive(Debug, Clone)]
pub struct ConfigChange {
    pub config: Arc<TubesyncConfig>,
    /// Part of the change takes effect only after a restart.
    pub restart_required: bool,
}

/// Live settings shared by the engine's components.
#[derive(Debug)]
pub struct ConfigHandle {
    current: RwLock<Arc<TubesyncConfig>>,
    path: Option<PathBuf>,
    writer: Mutex<()>,
}

impl ConfigHandle {
    /// In-memory settings; updates are not written anywhere.
    pub fn new(cfg: TubesyncConfig) -> Self {
        Self {
            current: RwLock::new(Arc::new(cfg)),
            path: None,
            writer: Mutex::new(()),
        }
    }

    /// Settings backed by the file at `path`; every update is saved there.
    pub fn persisted(cfg: TubesyncConfig, path: PathBuf) -> Self {
        Self {
            path: Some(path),
            ..Self::new(cfg)
        }
    }

    /// Snapshot of the current settings.
    pub fn current(&self) -> Arc<TubesyncConfig> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Merge, validate, save, then publish. Nothing changes when validation
    /// or saving fails. Concurrent updates are applied one at a time.
    pub fn update(&self, update: ConfigUpdate) -> Result<ConfigChange, ConfigError> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = self.current();
        let mut next = (*previous).clone();
        update.apply_to(&mut next);
        next.validate()?;
        if let Some(path) = &self.path {
            save_at(path, &next).map_err(ConfigError::Persist)?;
        }

        let restart_required = next.requires_restart_from(&previous);
        let next = Arc::new(next);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&next);
        Ok(ConfigChange {
            config: next,
            restart_required,
        })
    }
}

impl From<TubesyncConfig> for ConfigHandle {
    fn from(cfg: TubesyncConfig) -> Self {
        Self::new(cfg)
    }
}

/// `~/.local/share/tubesync/downloads`, or `./downloads` when XDG is unavailable.
fn default_download_dir() -> PathBuf {
    xdg::BaseDirectories::with_prefix("tubesync")
        .map(|dirs| dirs.get_data_home().join("downloads"))
        .unwrap_or_else(|_| PathBuf::from("downloads"))
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("tubesync")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<TubesyncConfig> {
    load_or_init_at(&config_path()?)
}

/// Same as [`load_or_init`] with an explicit path.
pub fn load_or_init_at(path: &Path) -> Result<TubesyncConfig> {
    if !path.exists() {
        let default_cfg = TubesyncConfig::default();
        save_at(path, &default_cfg)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(path)?;
    let cfg: TubesyncConfig = toml::from_str(&data)?;
    Ok(cfg)
}

/// Write `cfg` to the default config file.
pub fn save(cfg: &TubesyncConfig) -> Result<()> {
    save_at(&config_path()?, cfg)
}

/// Write `cfg` to `path` as pretty TOML, creating parent directories.
pub fn save_at(path: &Path, cfg: &TubesyncConfig) -> Result<()> {
    let toml = toml::to_string_pretty(cfg)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, toml)?;
    Ok(())
}
