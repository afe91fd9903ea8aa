//! Host registry contract.
//!
//! The registry owns the mapping from host id to connection parameters. The
//! core reads it at call time only, so a host removed between listing and
//! use shows up as [`ExecError::HostNotConfigured`](crate::ExecError) rather
//! than a stale connection.

use std::sync::RwLock;

use crate::config::Config;
use crate::types::{ConnectionParams, Host, HostId};

/// Read-only view of the known hosts.
pub trait HostRegistry: Send + Sync {
    /// All hosts, local sentinel first.
    fn list_hosts(&self) -> Vec<Host>;

    /// Connection parameters for a remote host, `None` if unknown. The local
    /// sentinel has no parameters.
    fn resolve(&self, id: &HostId) -> Option<ConnectionParams>;
}

/// Registry backed by the `[[hosts]]` entries of the configuration file.
#[derive(Debug)]
pub struct StaticRegistry {
    hosts: RwLock<Vec<Host>>,
}

impl StaticRegistry {
    /// Build from an explicit host list. The list is used as-is; callers
    /// decide whether to include the local sentinel.
    pub fn new(hosts: Vec<Host>) -> Self {
        Self {
            hosts: RwLock::new(hosts),
        }
    }

    /// The local sentinel followed by every configured host, in file order.
    pub fn from_config(config: &Config) -> Self {
        let mut hosts = vec![Host::local(&config.local.display_name)];
        hosts.extend(config.hosts.iter().map(|entry| entry.to_host()));
        Self::new(hosts)
    }

    /// Swap the whole host list, e.g. after the registry file was edited.
    pub fn replace(&self, hosts: Vec<Host>) {
        let mut guard = self.hosts.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = hosts;
    }
}

impl HostRegistry for StaticRegistry {
    fn list_hosts(&self) -> Vec<Host> {
        self.hosts
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn resolve(&self, id: &HostId) -> Option<ConnectionParams> {
        self.hosts
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .find(|host| &host.id == id)
            .and_then(|host| host.connection.clone())
    }
}
