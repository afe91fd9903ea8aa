//! Local shell transport.

use std::time::Duration;

use fleetlog_core::{CommandOutput, ExecError, HostId, RemoteCommand, Transport};
use futures::future::BoxFuture;
use tokio::process::Command;

use crate::process;

/// Runs commands on this machine via `sh -c`. The shell is needed because
/// rendered commands may contain pipes and a privilege prefix.
#[derive(Debug, Clone)]
pub struct LocalTransport {
    elevate: bool,
}

impl LocalTransport {
    pub fn new(elevate: bool) -> Self {
        Self { elevate }
    }

    pub async fn run(&self, command: &RemoteCommand, timeout: Duration) -> Result<CommandOutput, ExecError> {
        let line = command.render(self.elevate);
        tracing::debug!(command = %line, "running locally");
        let mut shell = Command::new("sh");
        shell.arg("-c").arg(&line);
        process::run(shell, timeout).await?.into_result(command)
    }
}

impl Transport for LocalTransport {
    fn execute<'a>(
        &'a self,
        _host: &'a HostId,
        command: &'a RemoteCommand,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<CommandOutput, ExecError>> {
        Box::pin(self.run(command, timeout))
    }
}
