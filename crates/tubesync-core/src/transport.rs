//! Transport collaborator: copies finished artifacts to remote storage.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;

use crate::progress::ProgressReporter;

/// Remote share credentials, taken from `[transport]` in the config.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub host: String,
    pub share: String,
    pub user: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("host", &self.host)
            .field("share", &self.share)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("remote unreachable: {0}")]
    Unreachable(String),

    #[error("transient transport failure: {0}")]
    Transient(String),

    #[error("transport not configured: {0}")]
    NotConfigured(String),
}

/// Result of an on-demand connection check, as shown to operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionCheck {
    pub success: bool,
    pub message: String,
}

impl ConnectionCheck {
    pub fn from_result(result: Result<(), TransportError>) -> Self {
        match result {
            Ok(()) => Self {
                success: true,
                message: "OK".to_string(),
            },
            Err(e) => {
                let label = match &e {
                    TransportError::AuthFailed(_) => "AUTH FAILED",
                    TransportError::Unreachable(_) => "UNREACHABLE",
                    TransportError::NotConfigured(_) => "NOT CONFIGURED",
                    TransportError::Transient(_) => "ERROR",
                };
                Self {
                    success: false,
                    message: format!("{label}: {e}"),
                }
            }
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Copy `local` to `remote` (a `/`-separated path relative to the share
    /// root). Only returns `Ok` once the remote copy is complete.
    async fn upload(
        &self,
        local: &Path,
        remote: &str,
        credentials: &Credentials,
        progress: &ProgressReporter,
    ) -> Result<(), TransportError>;

    /// Cheap handshake: can we reach the share and write under `directory`?
    async fn test_connection(
        &self,
        credentials: &Credentials,
        directory: &str,
    ) -> Result<(), TransportError>;
}
