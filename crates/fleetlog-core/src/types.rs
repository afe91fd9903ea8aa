//! Core types for fleetlog-core.
//!
//! This module defines the data shared across every layer: the [`Host`]
//! identity and its connection parameters, the discovered [`LogSource`]
//! with its [`SourceKind`], and the per-host [`HostFailure`] record that
//! carries partial failure as data.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ExecError, FailureKind};

/// Identifier of the host that runs commands in-process instead of over ssh.
pub const LOCAL_HOST_ID: &str = "local";

/// Opaque host identity. `"local"` is reserved for the machine running fleetlog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HostId(String);

impl HostId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn local() -> Self {
        Self(LOCAL_HOST_ID.to_string())
    }

    pub fn is_local(&self) -> bool {
        self.0 == LOCAL_HOST_ID
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for HostId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for HostId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// How to reach a remote host over ssh. Owned by the host registry; the
/// core only ever reads it at call time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParams {
    pub hostname: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub identity_file: Option<PathBuf>,
}

fn default_ssh_port() -> u16 {
    22
}

impl ConnectionParams {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            port: default_ssh_port(),
            user: None,
            identity_file: None,
        }
    }

    /// Reject values that `ssh` would read as options or that cannot be a
    /// single argv entry. Each field is passed as its own argument, so this
    /// is the only check standing between a registry entry and the argv.
    pub fn validate(&self) -> Result<(), String> {
        check_argument("hostname", &self.hostname)?;
        if let Some(user) = &self.user {
            check_argument("user", user)?;
        }
        if let Some(path) = &self.identity_file {
            check_argument("identity_file", &path.to_string_lossy())?;
        }
        if self.port == 0 {
            return Err("port must be non-zero".to_string());
        }
        Ok(())
    }
}

fn check_argument(field: &str, value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err(format!("{field} must not be empty"));
    }
    if value.starts_with('-') {
        return Err(format!("{field} {value:?} must not start with '-'"));
    }
    if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(format!("{field} {value:?} contains whitespace or control characters"));
    }
    Ok(())
}

/// A machine from which log data can be read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Host {
    pub id: HostId,
    pub display_name: String,
    /// `None` for the local sentinel.
    #[serde(skip)]
    pub connection: Option<ConnectionParams>,
}

impl Host {
    pub fn local(display_name: impl Into<String>) -> Self {
        Self {
            id: HostId::local(),
            display_name: display_name.into(),
            connection: None,
        }
    }

    pub fn remote(
        id: impl Into<HostId>,
        display_name: impl Into<String>,
        connection: ConnectionParams,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            connection: Some(connection),
        }
    }
}

/// Which kind of log source was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    File,
    ServiceUnit,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::File => write!(f, "file"),
            SourceKind::ServiceUnit => write!(f, "service-unit"),
        }
    }
}

impl std::str::FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(SourceKind::File),
            "service-unit" | "unit" | "service" => Ok(SourceKind::ServiceUnit),
            other => Err(format!("unknown source kind {other:?}")),
        }
    }
}

/// Per-kind metadata. Service units carry none: there is no size or
/// modification time to report, and no zero stands in for one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SourceDetail {
    File {
        size: u64,
        modified: DateTime<Utc>,
    },
    ServiceUnit,
}

impl SourceDetail {
    pub fn kind(&self) -> SourceKind {
        match self {
            SourceDetail::File { .. } => SourceKind::File,
            SourceDetail::ServiceUnit => SourceKind::ServiceUnit,
        }
    }

    pub fn size(&self) -> Option<u64> {
        match self {
            SourceDetail::File { size, .. } => Some(*size),
            SourceDetail::ServiceUnit => None,
        }
    }

    pub fn modified(&self) -> Option<DateTime<Utc>> {
        match self {
            SourceDetail::File { modified, .. } => Some(*modified),
            SourceDetail::ServiceUnit => None,
        }
    }
}

/// A discoverable unit of log data on one host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSource {
    pub host_id: HostId,
    pub display_name: String,
    pub name: String,
    #[serde(flatten)]
    pub detail: SourceDetail,
}

impl LogSource {
    pub fn file(host: &Host, name: impl Into<String>, size: u64, modified: DateTime<Utc>) -> Self {
        Self {
            host_id: host.id.clone(),
            display_name: host.display_name.clone(),
            name: name.into(),
            detail: SourceDetail::File { size, modified },
        }
    }

    pub fn unit(host: &Host, name: impl Into<String>) -> Self {
        Self {
            host_id: host.id.clone(),
            display_name: host.display_name.clone(),
            name: name.into(),
            detail: SourceDetail::ServiceUnit,
        }
    }

    pub fn kind(&self) -> SourceKind {
        self.detail.kind()
    }

    pub fn key(&self) -> SourceKey {
        SourceKey {
            name: self.name.clone(),
            kind: self.kind(),
        }
    }
}

/// Identity of a source independent of the host it lives on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceKey {
    pub name: String,
    pub kind: SourceKind,
}

impl SourceKey {
    pub fn new(name: impl Into<String>, kind: SourceKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// A host that could not be enumerated or searched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostFailure {
    pub host_id: HostId,
    pub display_name: String,
    /// Normalised, human-readable reason ("Connection timed out", ...).
    pub error: String,
    pub kind: FailureKind,
}

impl HostFailure {
    pub fn new(host: &Host, error: &ExecError) -> Self {
        Self {
            host_id: host.id.clone(),
            display_name: host.display_name.clone(),
            error: error.summary(),
            kind: error.kind(),
        }
    }
}

/// Output of one enumeration pass over the fleet.
///
/// `sources` holds every source of every host that finished; a host either
/// contributes all of its sources or appears in `failed_hosts`, never both.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationResult {
    pub sources: Vec<LogSource>,
    pub failed_hosts: Vec<HostFailure>,
    /// Hosts that took part, i.e. `successful + failed`.
    pub hosts: Vec<HostSummary>,
}

/// The bare identity of a host as it appears in response payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostSummary {
    pub id: HostId,
    pub display_name: String,
}

impl From<&Host> for HostSummary {
    fn from(host: &Host) -> Self {
        Self {
            id: host.id.clone(),
            display_name: host.display_name.clone(),
        }
    }
}

impl AggregationResult {
    pub fn is_total_success(&self) -> bool {
        self.failed_hosts.is_empty()
    }

    pub fn total_hosts(&self) -> usize {
        self.hosts.len()
    }

    pub fn successful_hosts(&self) -> usize {
        self.hosts.len().saturating_sub(self.failed_hosts.len())
    }
}
