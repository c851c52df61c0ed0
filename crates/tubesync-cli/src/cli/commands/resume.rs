//! `tubesync resume <downloads|uploads>` – let a paused pool claim jobs again.

use anyhow::{bail, Result};
use tubesync_core::control::default_control_socket_path;
use tubesync_core::pause::PauseTarget;

use crate::cli::control_socket::{self, ControlCommand};

pub async fn run_resume(target: PauseTarget) -> Result<()> {
    let path = default_control_socket_path()?;
    let reply = control_socket::send_command(&path, ControlCommand::Resume(target)).await?;
    if reply != "ok" {
        bail!("server refused resume: {reply}");
    }
    println!("Resumed {target}");
    Ok(())
}
