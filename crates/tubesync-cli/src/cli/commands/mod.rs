//! CLI command handlers. Each command is in its own file.

mod pause;
mod remove;
mod resume;
mod retry;
mod serve;
mod status;
mod sync;
mod test_transport;

pub use pause::run_pause;
pub use remove::run_remove;
pub use resume::run_resume;
pub use retry::run_retry;
pub use serve::run_serve;
pub use status::run_status;
pub use sync::run_sync;
pub use test_transport::run_test_transport;

use anyhow::Result;
use tubesync_core::adapters::default_collaborators;
use tubesync_core::config::{self, ConfigHandle, TubesyncConfig};
use tubesync_core::job_store::JobStore;
use tubesync_core::Engine;

/// Engine over `store` with the bundled yt-dlp and mounted-share collaborators.
/// Settings changes made through it are saved to the config file.
pub(crate) async fn build_engine(store: JobStore, cfg: TubesyncConfig) -> Result<Engine> {
    let collaborators = default_collaborators(&cfg);
    let handle = ConfigHandle::persisted(cfg, config::config_path()?);
    Ok(Engine::new(store, handle, collaborators).await?)
}
