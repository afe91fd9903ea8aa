//! Per-host transport selection.

use std::sync::Arc;
use std::time::Duration;

use fleetlog_core::config::Config;
use fleetlog_core::{CommandOutput, ExecError, HostId, HostRegistry, RemoteCommand, Transport};
use futures::future::BoxFuture;

use crate::local::LocalTransport;
use crate::ssh::{SshOptions, SshTransport};

/// Sends `"local"` to the local shell and everything else over ssh.
///
/// Connection parameters are resolved on every call, so a host removed from
/// the registry fails with [`ExecError::HostNotConfigured`].
pub struct RoutingTransport {
    local: LocalTransport,
    ssh: SshTransport,
    registry: Arc<dyn HostRegistry>,
}

impl RoutingTransport {
    pub fn new(local: LocalTransport, ssh: SshTransport, registry: Arc<dyn HostRegistry>) -> Self {
        Self { local, ssh, registry }
    }

    pub fn from_config(config: &Config, registry: Arc<dyn HostRegistry>) -> Self {
        Self::new(
            LocalTransport::new(config.scan.elevate),
            SshTransport::new(SshOptions::from(&config.ssh), config.scan.elevate),
            registry,
        )
    }

    async fn route(
        &self,
        host: &HostId,
        command: &RemoteCommand,
        timeout: Duration,
    ) -> Result<CommandOutput, ExecError> {
        if host.is_local() {
            return self.local.run(command, timeout).await;
        }
        let params = self
            .registry
            .resolve(host)
            .ok_or_else(|| ExecError::HostNotConfigured(host.to_string()))?;
        self.ssh.run(&params, command, timeout).await
    }
}

impl Transport for RoutingTransport {
    fn execute<'a>(
        &'a self,
        host: &'a HostId,
        command: &'a RemoteCommand,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<CommandOutput, ExecError>> {
        Box::pin(self.route(host, command, timeout))
    }
}
