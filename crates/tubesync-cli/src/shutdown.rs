//! Signal handling for `tubesync serve`.
//!
//! The first SIGINT, SIGTERM or SIGHUP cancels the returned token: the HTTP
//! server stops accepting, the pools stop claiming and running transfers get
//! the configured grace period. A second signal exits immediately.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// Exit status for a forced exit (128 + SIGINT).
const FORCED_EXIT: i32 = 130;

pub(crate) fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let count = Arc::new(AtomicU32::new(0));

    let handler_token = token.clone();
    tokio::spawn(async move {
        #[cfg(unix)]
        let (mut sigterm, mut sighup) = {
            use tokio::signal::unix::{signal, SignalKind};
            (
                register(signal(SignalKind::terminate()), "SIGTERM"),
                register(signal(SignalKind::hangup()), "SIGHUP"),
            )
        };

        loop {
            #[cfg(unix)]
            {
                tokio::select! {
                    r = tokio::signal::ctrl_c() => {
                        if let Err(e) = r {
                            tracing::warn!("listen for Ctrl+C: {e}");
                            return;
                        }
                    }
                    _ = recv(&mut sigterm) => {}
                    _ = recv(&mut sighup) => {}
                }
            }

            #[cfg(not(unix))]
            {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::warn!("listen for Ctrl+C: {e}");
                    return;
                }
            }

            if count.fetch_add(1, Ordering::SeqCst) == 0 {
                tracing::info!("shutdown requested, finishing running transfers");
                tracing::info!("press Ctrl+C again to force exit");
                handler_token.cancel();
            } else {
                tracing::warn!("force exit requested");
                std::process::exit(FORCED_EXIT);
            }
        }
    });

    token
}

#[cfg(unix)]
fn register(
    result: std::io::Result<tokio::signal::unix::Signal>,
    name: &str,
) -> Option<tokio::signal::unix::Signal> {
    match result {
        Ok(signal) => Some(signal),
        Err(e) => {
            tracing::warn!("register {name} handler: {e}; only Ctrl+C stops the server");
            None
        }
    }
}

/// Waits on `signal`; never resolves when it could not be registered.
#[cfg(unix)]
async fn recv(signal: &mut Option<tokio::signal::unix::Signal>) {
    match signal {
        Some(s) => {
            s.recv().await;
        }
        None => std::future::pending::<()>().await,
    }
}
