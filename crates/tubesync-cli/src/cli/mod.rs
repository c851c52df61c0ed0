//! CLI for tubesync.

mod commands;
pub(crate) mod control_socket;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tubesync_core::config;
use tubesync_core::events::EventBus;
use tubesync_core::job_store::JobStore;
use tubesync_core::pause::PauseTarget;

use commands::{
    run_pause, run_remove, run_resume, run_retry, run_serve, run_status, run_sync,
    run_test_transport,
};

/// Top-level CLI for tubesync.
#[derive(Debug, Parser)]
#[command(name = "tubesync")]
#[command(about = "tubesync: download new videos from subscribed channels and copy them to a share", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

/// Worker pool addressed by pause/resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PoolArg {
    Downloads,
    Uploads,
}

impl From<PoolArg> for PauseTarget {
    fn from(pool: PoolArg) -> Self {
        match pool {
            PoolArg::Downloads => PauseTarget::Downloads,
            PoolArg::Uploads => PauseTarget::Uploads,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Run the worker pools, the sync scheduler and the HTTP control surface.
    Serve,

    /// Show job counts, the last sync run and quota state.
    Status,

    /// Trigger a sync run (through the running server, or one-shot in this process).
    Sync,

    /// Stop a pool from starting new jobs; running transfers finish.
    Pause {
        #[arg(value_enum)]
        pool: PoolArg,
    },

    /// Let a paused pool start jobs again.
    Resume {
        #[arg(value_enum)]
        pool: PoolArg,
    },

    /// Put a failed job back in the download queue.
    Retry {
        /// Job identifier.
        id: i64,
    },

    /// Remove a job record by ID.
    Remove {
        /// Job identifier.
        id: i64,

        /// Also delete the job's local artifact, if any.
        #[arg(long)]
        delete_files: bool,
    },

    /// Check that the configured share is reachable and writable.
    TestTransport,
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg.redacted());

        // pause/resume only talk to a running server
        match cli.command {
            CliCommand::Pause { pool } => return run_pause(pool.into()).await,
            CliCommand::Resume { pool } => return run_resume(pool.into()).await,
            _ => {}
        }

        let store = JobStore::open_default(EventBus::new(cfg.workers.event_buffer)).await?;
        match cli.command {
            CliCommand::Serve => run_serve(store, cfg).await?,
            CliCommand::Status => run_status(store, cfg).await?,
            CliCommand::Sync => run_sync(store, cfg).await?,
            CliCommand::Retry { id } => run_retry(store, cfg, id).await?,
            CliCommand::Remove { id, delete_files } => {
                run_remove(store, cfg, id, delete_files).await?
            }
            CliCommand::TestTransport => run_test_transport(store, cfg).await?,
            CliCommand::Pause { .. } | CliCommand::Resume { .. } => {}
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
