//! Configuration types for fleetlog.
//!
//! [`Config::load`] reads `~/.config/fleetlog/config.toml` (or an explicit
//! path), creating it with the built-in defaults if it does not yet exist,
//! then layers `FLEETLOG__SECTION__KEY` environment overrides on top.
//! [`Config::defaults`] returns the same defaults without touching the
//! filesystem (useful in tests).

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::types::{ConnectionParams, Host, HostId, LOCAL_HOST_ID};

// ---------------------------------------------------------------------------
// Embedded defaults
// ---------------------------------------------------------------------------

const DEFAULT_CONFIG: &str = r#"
[server]
bind = "127.0.0.1:5001"

[scan]
log_dir           = "/var/log"
recent_file_limit = 20
workers           = 8
step_timeout_secs = 5
budget_secs       = 30
elevate           = true
# host_timeout_secs = 20

[search]
workers             = 8
source_timeout_secs = 10
budget_secs         = 60
match_limit         = 100
# host_timeout_secs   = 30

[cache]
freshness_secs = 30

[content]
default_lines = 500
max_lines     = 5000

[ssh]
connect_timeout_secs     = 5
strict_host_key_checking = "accept-new"

[local]
display_name = "Local"

# [[hosts]]
# id            = "db1"
# display_name  = "Primary database"
# hostname      = "10.0.0.5"
# port          = 22
# user          = "ops"
# identity_file = "/home/ops/.ssh/id_ed25519"
"#;

// ---------------------------------------------------------------------------
// Public config types
// ---------------------------------------------------------------------------

/// Top-level application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub content: ContentConfig,
    #[serde(default)]
    pub ssh: SshConfig,
    #[serde(default)]
    pub local: LocalConfig,
    #[serde(default)]
    pub hosts: Vec<HostEntry>,
}

/// `[server]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String { "127.0.0.1:5001".to_string() }

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

/// `[scan]` section: source enumeration and the aggregate fan-out.
#[derive(Debug, Clone, Deserialize)]
pub struct ScanConfig {
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_recent_file_limit")]
    pub recent_file_limit: usize,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_step_timeout_secs")]
    pub step_timeout_secs: u64,
    #[serde(default = "default_scan_budget_secs")]
    pub budget_secs: u64,
    #[serde(default = "default_elevate")]
    pub elevate: bool,
    /// Limit on one host's whole enumeration. Unset means only the budget
    /// applies.
    #[serde(default)]
    pub host_timeout_secs: Option<u64>,
}

fn default_log_dir() -> String { "/var/log".to_string() }
fn default_recent_file_limit() -> usize { 20 }
fn default_workers() -> usize { 8 }
fn default_step_timeout_secs() -> u64 { 5 }
fn default_scan_budget_secs() -> u64 { 30 }
fn default_elevate() -> bool { true }

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            recent_file_limit: default_recent_file_limit(),
            workers: default_workers(),
            step_timeout_secs: default_step_timeout_secs(),
            budget_secs: default_scan_budget_secs(),
            elevate: default_elevate(),
            host_timeout_secs: None,
        }
    }
}

impl ScanConfig {
    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }

    pub fn budget(&self) -> Duration {
        Duration::from_secs(self.budget_secs)
    }

    pub fn host_timeout(&self) -> Option<Duration> {
        self.host_timeout_secs.map(Duration::from_secs)
    }
}

/// `[search]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_source_timeout_secs")]
    pub source_timeout_secs: u64,
    #[serde(default = "default_search_budget_secs")]
    pub budget_secs: u64,
    #[serde(default = "default_match_limit")]
    pub match_limit: usize,
    /// Limit on one host's enumeration plus every filter call on it.
    #[serde(default)]
    pub host_timeout_secs: Option<u64>,
}

fn default_source_timeout_secs() -> u64 { 10 }
fn default_search_budget_secs() -> u64 { 60 }
fn default_match_limit() -> usize { 100 }

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            source_timeout_secs: default_source_timeout_secs(),
            budget_secs: default_search_budget_secs(),
            match_limit: default_match_limit(),
            host_timeout_secs: None,
        }
    }
}

impl SearchConfig {
    pub fn source_timeout(&self) -> Duration {
        Duration::from_secs(self.source_timeout_secs)
    }

    pub fn budget(&self) -> Duration {
        Duration::from_secs(self.budget_secs)
    }

    pub fn host_timeout(&self) -> Option<Duration> {
        self.host_timeout_secs.map(Duration::from_secs)
    }
}

/// `[cache]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_freshness_secs")]
    pub freshness_secs: u64,
}

fn default_freshness_secs() -> u64 { 30 }

impl Default for CacheConfig {
    fn default() -> Self {
        Self { freshness_secs: default_freshness_secs() }
    }
}

impl CacheConfig {
    pub fn freshness(&self) -> Duration {
        Duration::from_secs(self.freshness_secs)
    }
}

/// `[content]` section: tail reads of a single source.
#[derive(Debug, Clone, Deserialize)]
pub struct ContentConfig {
    #[serde(default = "default_lines")]
    pub default_lines: usize,
    #[serde(default = "default_max_lines")]
    pub max_lines: usize,
}

fn default_lines() -> usize { 500 }
fn default_max_lines() -> usize { 5000 }

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            default_lines: default_lines(),
            max_lines: default_max_lines(),
        }
    }
}

/// `[ssh]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct SshConfig {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_strict_host_key_checking")]
    pub strict_host_key_checking: String,
}

fn default_connect_timeout_secs() -> u64 { 5 }
fn default_strict_host_key_checking() -> String { "accept-new".to_string() }

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            strict_host_key_checking: default_strict_host_key_checking(),
        }
    }
}

/// `[local]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct LocalConfig {
    #[serde(default = "default_local_display_name")]
    pub display_name: String,
}

fn default_local_display_name() -> String { "Local".to_string() }

impl Default for LocalConfig {
    fn default() -> Self {
        Self { display_name: default_local_display_name() }
    }
}

/// One `[[hosts]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct HostEntry {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(flatten)]
    pub connection: ConnectionParams,
}

impl HostEntry {
    pub fn to_host(&self) -> Host {
        let display_name = self
            .display_name
            .clone()
            .unwrap_or_else(|| self.id.clone());
        Host::remote(HostId::new(&self.id), display_name, self.connection.clone())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::defaults()
    }
}

impl Config {
    /// Load from `path` (or the default location), layered on top of the
    /// built-in defaults and under environment overrides. Creates the
    /// default file if no explicit path was given and none exists.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(explicit) => explicit.to_path_buf(),
            None => {
                let path = config_path();
                if !path.exists() {
                    write_default(&path)?;
                }
                path
            }
        };

        let config: Self = config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Toml))
            .add_source(config::File::from(path.as_path()).required(false))
            .add_source(
                config::Environment::with_prefix("FLEETLOG")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML string layered on top of the built-in defaults.
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let config: Self = config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Toml))
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Return the built-in defaults without touching the filesystem.
    pub fn defaults() -> Self {
        Self {
            server: ServerConfig::default(),
            scan: ScanConfig::default(),
            search: SearchConfig::default(),
            cache: CacheConfig::default(),
            content: ContentConfig::default(),
            ssh: SshConfig::default(),
            local: LocalConfig::default(),
            hosts: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("scan.workers", self.scan.workers as u64)?;
        positive("scan.recent_file_limit", self.scan.recent_file_limit as u64)?;
        positive("scan.step_timeout_secs", self.scan.step_timeout_secs)?;
        positive("scan.budget_secs", self.scan.budget_secs)?;
        positive("search.workers", self.search.workers as u64)?;
        positive("search.source_timeout_secs", self.search.source_timeout_secs)?;
        positive("search.budget_secs", self.search.budget_secs)?;
        positive("search.match_limit", self.search.match_limit as u64)?;
        positive("content.default_lines", self.content.default_lines as u64)?;
        positive("ssh.connect_timeout_secs", self.ssh.connect_timeout_secs)?;
        if let Some(secs) = self.scan.host_timeout_secs {
            positive("scan.host_timeout_secs", secs)?;
        }
        if let Some(secs) = self.search.host_timeout_secs {
            positive("search.host_timeout_secs", secs)?;
        }

        const HOST_KEY_POLICIES: &[&str] = &["yes", "no", "ask", "accept-new", "off"];
        if !HOST_KEY_POLICIES.contains(&self.ssh.strict_host_key_checking.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "ssh.strict_host_key_checking".to_string(),
                reason: format!("expected one of {}", HOST_KEY_POLICIES.join(", ")),
            });
        }

        if self.content.default_lines > self.content.max_lines {
            return Err(ConfigError::InvalidValue {
                field: "content.default_lines".to_string(),
                reason: format!("must not exceed content.max_lines ({})", self.content.max_lines),
            });
        }

        let mut seen = HashSet::new();
        for entry in &self.hosts {
            if entry.id.is_empty() || entry.id == LOCAL_HOST_ID {
                return Err(ConfigError::InvalidValue {
                    field: "hosts.id".to_string(),
                    reason: format!("{:?} is empty or reserved", entry.id),
                });
            }
            if !seen.insert(entry.id.as_str()) {
                return Err(ConfigError::InvalidValue {
                    field: "hosts.id".to_string(),
                    reason: format!("duplicate host id {:?}", entry.id),
                });
            }
            entry
                .connection
                .validate()
                .map_err(|reason| ConfigError::InvalidValue {
                    field: format!("hosts.{}", entry.id),
                    reason,
                })?;
        }
        Ok(())
    }
}

fn positive(field: &str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            reason: "must be greater than 0".to_string(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

fn config_path() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".to_string()))
                .join(".config")
        })
        .join("fleetlog")
        .join("config.toml")
}

fn write_default(path: &Path) -> Result<(), ConfigError> {
    let write = || -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, DEFAULT_CONFIG.trim_start())
    };
    write().map_err(|source| ConfigError::WriteDefault {
        path: path.display().to_string(),
        source,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
