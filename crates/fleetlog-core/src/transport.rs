//! Remote Execution Transport contract.
//!
//! A [`Transport`] runs one [`RemoteCommand`] on one host and reports either
//! the captured output or a typed [`ExecError`]. Implementations live in the
//! `fleetlog-exec` crate; tests use scripted fakes.

use std::time::Duration;

use futures::future::BoxFuture;

use crate::command::{strip_reader_marker, RemoteCommand};
use crate::error::ExecError;
use crate::types::HostId;

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: 0,
        }
    }

    /// Turn a non-accepted exit status, or a failed pipeline reader, into
    /// [`ExecError::CommandFailed`].
    pub fn into_result(self, command: &RemoteCommand) -> Result<Self, ExecError> {
        if let Some(code) = command.reader_failure(self.exit_code, &self.stderr) {
            return Err(ExecError::CommandFailed {
                code,
                stderr: strip_reader_marker(&self.stderr),
            });
        }
        if command.accepts_exit(self.exit_code) {
            Ok(self)
        } else {
            Err(ExecError::CommandFailed {
                code: self.exit_code,
                stderr: self.stderr,
            })
        }
    }
}

/// Runs commands on the local machine or on a named remote host.
pub trait Transport: Send + Sync {
    /// Execute `command` on `host`, giving up after `timeout`.
    ///
    /// A non-accepted exit status is reported as
    /// [`ExecError::CommandFailed`], an unknown host as
    /// [`ExecError::HostNotConfigured`].
    fn execute<'a>(
        &'a self,
        host: &'a HostId,
        command: &'a RemoteCommand,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<CommandOutput, ExecError>>;
}

/// Execute through `transport` under an outer deadline of `timeout`, so a
/// transport that ignores its own timeout still cannot stall the caller.
pub async fn execute_bounded(
    transport: &dyn Transport,
    host: &HostId,
    command: &RemoteCommand,
    timeout: Duration,
) -> Result<CommandOutput, ExecError> {
    tracing::debug!(host = %host, command = command.label(), "executing");
    match tokio::time::timeout(timeout, transport.execute(host, command, timeout)).await {
        Ok(result) => result,
        Err(_) => Err(ExecError::Timeout(timeout)),
    }
}
