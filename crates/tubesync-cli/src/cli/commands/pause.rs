//! `tubesync pause <downloads|uploads>` – stop a pool of the running server
//! from claiming new jobs.

use anyhow::{bail, Result};
use tubesync_core::control::default_control_socket_path;
use tubesync_core::pause::PauseTarget;

use crate::cli::control_socket::{self, ControlCommand};

pub async fn run_pause(target: PauseTarget) -> Result<()> {
    let path = default_control_socket_path()?;
    let reply = control_socket::send_command(&path, ControlCommand::Pause(target)).await?;
    if reply != "ok" {
        bail!("server refused pause: {reply}");
    }
    println!("Paused {target}; running transfers will finish");
    Ok(())
}
