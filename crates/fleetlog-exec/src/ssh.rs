//! SSH transport.
//!
//! The system `ssh` binary is invoked with every connection parameter as a
//! discrete argv entry; only the rendered remote command line is handed to
//! the remote shell, once. `BatchMode` keeps ssh from ever prompting.

use std::ffi::OsString;
use std::time::Duration;

use fleetlog_core::config::SshConfig;
use fleetlog_core::{CommandOutput, ConnectionParams, ExecError, FailureCategory, RemoteCommand};
use tokio::process::Command;

use crate::process;

/// Exit status ssh uses for its own failures.
const SSH_ERROR_EXIT: i32 = 255;

/// Client-side ssh settings shared by every host.
#[derive(Debug, Clone)]
pub struct SshOptions {
    pub program: String,
    pub connect_timeout: Duration,
    pub strict_host_key_checking: String,
}

impl From<&SshConfig> for SshOptions {
    fn from(config: &SshConfig) -> Self {
        Self {
            program: "ssh".to_string(),
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            strict_host_key_checking: config.strict_host_key_checking.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SshTransport {
    options: SshOptions,
    elevate: bool,
}

impl SshTransport {
    pub fn new(options: SshOptions, elevate: bool) -> Self {
        Self { options, elevate }
    }

    /// Full argv (after the program name) for running `command_line` on the
    /// host described by `params`.
    pub fn args(&self, params: &ConnectionParams, command_line: &str) -> Result<Vec<OsString>, ExecError> {
        params.validate().map_err(ExecError::Transport)?;

        let mut args: Vec<OsString> = vec![
            "-o".into(),
            "BatchMode=yes".into(),
            "-o".into(),
            format!("ConnectTimeout={}", self.options.connect_timeout.as_secs().max(1)).into(),
            "-o".into(),
            format!("StrictHostKeyChecking={}", self.options.strict_host_key_checking).into(),
            "-p".into(),
            params.port.to_string().into(),
        ];
        if let Some(user) = &params.user {
            args.push("-l".into());
            args.push(user.into());
        }
        if let Some(identity) = &params.identity_file {
            args.push("-i".into());
            args.push(identity.into());
        }
        args.push("--".into());
        args.push(params.hostname.as_str().into());
        args.push(command_line.into());
        Ok(args)
    }

    pub async fn run(
        &self,
        params: &ConnectionParams,
        command: &RemoteCommand,
        timeout: Duration,
    ) -> Result<CommandOutput, ExecError> {
        let line = command.render(self.elevate);
        let args = self.args(params, &line)?;
        tracing::debug!(hostname = %params.hostname, port = params.port, command = %line, "running over ssh");

        let mut ssh = Command::new(&self.options.program);
        ssh.args(args);
        let output = process::run(ssh, timeout).await?;
        classify_connection_failure(output)?.into_result(command)
    }
}

/// Turn ssh's own connection failures into structured errors. Anything
/// else, including remote commands that happen to exit 255, passes through.
fn classify_connection_failure(output: CommandOutput) -> Result<CommandOutput, ExecError> {
    if output.exit_code != SSH_ERROR_EXIT {
        return Ok(output);
    }
    let detail = output.stderr.trim().to_string();
    match FailureCategory::classify(&output.stderr) {
        Some(FailureCategory::ConnectionTimedOut) => Err(ExecError::ConnectionTimeout(detail)),
        Some(FailureCategory::ConnectionRefused) => Err(ExecError::ConnectionRefused(detail)),
        _ => Ok(output),
    }
}
