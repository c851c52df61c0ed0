//! Metadata collaborator: subscription list and per-channel video listing.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A subscribed channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    pub name: String,
}

/// One video as listed by the metadata source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoDescriptor {
    pub video_id: String,
    pub title: String,
    /// Unix seconds; `None` when the listing does not say.
    pub published_at: Option<i64>,
    pub duration_secs: Option<u64>,
    /// Live (or upcoming) broadcast at discovery time.
    pub is_live: bool,
}

#[derive(Debug, Error)]
pub enum MetadataError {
    /// Further requests will fail until `reset_at` (Unix seconds), if known.
    #[error("metadata quota exceeded")]
    QuotaExceeded { reset_at: Option<i64> },

    #[error("transient metadata failure: {0}")]
    Transient(String),

    #[error("metadata authorization expired: {0}")]
    AuthExpired(String),
}

#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Every channel the account is subscribed to.
    async fn subscriptions(&self) -> Result<Vec<Channel>, MetadataError>;

    /// Videos of `channel` published at or after `published_after`, produced
    /// lazily. An error item ends the listing for that channel.
    fn recent_videos<'a>(
        &'a self,
        channel: &'a Channel,
        published_after: i64,
    ) -> BoxStream<'a, Result<VideoDescriptor, MetadataError>>;
}
