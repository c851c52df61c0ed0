//! Control socket: server (during `tubesync serve`) and client (for
//! `tubesync pause|resume|sync`).
//! Protocol: one line per command: "pause <pool>", "resume <pool>" or "sync";
//! each is answered with one line, "ok", "busy" or "error <reason>".

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tubesync_core::pause::PauseTarget;
use tubesync_core::scheduler::SyncError;
use tubesync_core::Engine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Pause(PauseTarget),
    Resume(PauseTarget),
    Sync,
}

impl ControlCommand {
    pub fn parse(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace();
        let verb = words.next()?;
        let target = match words.next() {
            Some("downloads") => Some(PauseTarget::Downloads),
            Some("uploads") => Some(PauseTarget::Uploads),
            Some(_) => return None,
            None => None,
        };
        if words.next().is_some() {
            return None;
        }
        match (verb, target) {
            ("pause", Some(t)) => Some(Self::Pause(t)),
            ("resume", Some(t)) => Some(Self::Resume(t)),
            ("sync", None) => Some(Self::Sync),
            _ => None,
        }
    }

    pub fn to_line(self) -> String {
        match self {
            Self::Pause(t) => format!("pause {t}\n"),
            Self::Resume(t) => format!("resume {t}\n"),
            Self::Sync => "sync\n".to_string(),
        }
    }
}

fn apply(engine: &Engine, command: ControlCommand) -> &'static str {
    match command {
        ControlCommand::Pause(target) => {
            engine.set_paused(target, true);
            "ok"
        }
        ControlCommand::Resume(target) => {
            engine.set_paused(target, false);
            "ok"
        }
        ControlCommand::Sync => match engine.trigger_sync() {
            Ok(()) => "ok",
            Err(SyncError::Busy) => "busy",
        },
    }
}

/// Spawns a task that listens on `path` and applies each command line to
/// `engine` until `shutdown` is cancelled. The socket file is removed on exit.
pub fn spawn_control_listener(
    engine: Arc<Engine>,
    path: impl AsRef<Path>,
    shutdown: CancellationToken,
) -> Result<tokio::task::JoinHandle<()>> {
    let path = path.as_ref().to_path_buf();
    let _ = std::fs::remove_file(&path);
    let listener = UnixListener::bind(&path)
        .with_context(|| format!("bind control socket {}", path.display()))?;

    let handle = tokio::spawn(async move {
        loop {
            let accepted = tokio::select! {
                accepted = listener.accept() => accepted,
                _ = shutdown.cancelled() => break,
            };
            match accepted {
                Ok((stream, _)) => {
                    let engine = Arc::clone(&engine);
                    tokio::spawn(async move {
                        let (read, mut write) = stream.into_split();
                        let mut reader = BufReader::new(read).lines();
                        while let Ok(Some(line)) = reader.next_line().await {
                            let reply = match ControlCommand::parse(line.trim()) {
                                Some(command) => {
                                    tracing::debug!(?command, "control socket command");
                                    apply(&engine, command).to_string()
                                }
                                None => format!("error unknown command {:?}", line.trim()),
                            };
                            if write.write_all(format!("{reply}\n").as_bytes()).await.is_err() {
                                break;
                            }
                        }
                    });
                }
                Err(e) => tracing::debug!("control socket accept: {}", e),
            }
        }
        let _ = std::fs::remove_file(&path);
    });
    Ok(handle)
}

/// Sends one command to a running server and returns its reply line.
pub async fn send_command(socket_path: &Path, command: ControlCommand) -> Result<String> {
    if !socket_path.exists() {
        bail!("no running tubesync server (missing {})", socket_path.display());
    }
    let stream = UnixStream::connect(socket_path)
        .await
        .with_context(|| format!("connect to {}", socket_path.display()))?;
    let (read, mut write) = stream.into_split();
    write.write_all(command.to_line().as_bytes()).await?;
    let reply = BufReader::new(read)
        .lines()
        .next_line()
        .await?
        .unwrap_or_default();
    Ok(reply)
}
