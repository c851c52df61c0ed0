//! Bundled collaborator implementations.

mod mounted_share;
mod ytdlp;

pub use mounted_share::MountedShareTransport;
pub use ytdlp::{YtDlpFetcher, YtDlpMetadata};

use std::sync::Arc;

use crate::config::TubesyncConfig;
use crate::engine::Collaborators;
use crate::metadata::Channel;

/// yt-dlp for fetch and listing, the mounted share for uploads.
pub fn default_collaborators(config: &TubesyncConfig) -> Collaborators {
    let channels = config
        .channels
        .iter()
        .map(|c| Channel {
            id: c.id.clone(),
            name: c.name.clone(),
        })
        .collect();
    Collaborators {
        fetcher: Arc::new(YtDlpFetcher::default()),
        metadata: Arc::new(YtDlpMetadata::new("yt-dlp", channels)),
        transport: Arc::new(MountedShareTransport::new(config.transport.mount_root.clone())),
    }
}
