//! Child process execution shared by the local and ssh transports.

use std::process::Stdio;
use std::time::Duration;

use fleetlog_core::{CommandOutput, ExecError};
use tokio::process::Command;

/// Spawn `command`, capture its output, and kill it if it outlives `timeout`.
pub(crate) async fn run(mut command: Command, timeout: Duration) -> Result<CommandOutput, ExecError> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = command
        .spawn()
        .map_err(|err| ExecError::Transport(format!("failed to spawn: {err}")))?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(err)) => return Err(ExecError::Transport(format!("failed to wait: {err}"))),
        Err(_) => return Err(ExecError::Timeout(timeout)),
    };

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        // Killed by a signal.
        exit_code: output.status.code().unwrap_or(-1),
    })
}
