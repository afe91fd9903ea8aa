//! Error taxonomy.
//!
//! [`ExecError`] is everything that can go wrong while reading from one host.
//! It never escapes the aggregator or the search engine as an `Err`; it is
//! folded into a [`HostFailure`](crate::types::HostFailure) instead.
//! [`RequestError`] is the only error a caller sees synchronously, and it is
//! raised before any remote work starts.

use std::sync::OnceLock;
use std::time::Duration;

use regex::RegexSet;
use serde::{Deserialize, Serialize};

/// Failure of a single remote (or local) command invocation, or of the
/// fan-out around it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecError {
    /// The registry has no connection parameters for this id.
    #[error("host '{0}' is not configured")]
    HostNotConfigured(String),

    /// The per-call deadline elapsed before the command finished.
    #[error("command timed out after {0:?}")]
    Timeout(Duration),

    /// The remote end never answered the connection attempt.
    #[error("connection timed out: {0}")]
    ConnectionTimeout(String),

    /// The remote end actively refused the connection.
    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    /// The command ran and exited non-zero.
    #[error("command exited with status {code}: {stderr}")]
    CommandFailed { code: i32, stderr: String },

    /// The command succeeded but its output did not have the fixed format.
    #[error("unexpected output from {command}: {reason}")]
    Parse { command: String, reason: String },

    /// The fan-out deadline expired while this host was still in flight.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// Anything else: spawn failures, I/O errors, invalid connection params.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Serialisable discriminant of [`ExecError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    HostNotConfigured,
    Timeout,
    ConnectionTimeout,
    ConnectionRefused,
    CommandFailed,
    ParseError,
    Cancelled,
    TransportError,
}

impl ExecError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ExecError::HostNotConfigured(_) => FailureKind::HostNotConfigured,
            ExecError::Timeout(_) => FailureKind::Timeout,
            ExecError::ConnectionTimeout(_) => FailureKind::ConnectionTimeout,
            ExecError::ConnectionRefused(_) => FailureKind::ConnectionRefused,
            ExecError::CommandFailed { .. } => FailureKind::CommandFailed,
            ExecError::Parse { .. } => FailureKind::ParseError,
            ExecError::Cancelled(_) => FailureKind::Cancelled,
            ExecError::Transport(_) => FailureKind::TransportError,
        }
    }

    /// Human-readable reason suitable for a `failed_hosts` entry.
    pub fn summary(&self) -> String {
        match self {
            ExecError::HostNotConfigured(_) => "Host not configured".to_string(),
            ExecError::Timeout(_) | ExecError::ConnectionTimeout(_) => {
                FailureCategory::ConnectionTimedOut.message().to_string()
            }
            ExecError::ConnectionRefused(_) => {
                FailureCategory::ConnectionRefused.message().to_string()
            }
            ExecError::CommandFailed { code, stderr } => match FailureCategory::classify(stderr) {
                Some(category) => category.message().to_string(),
                None => match first_line(stderr) {
                    Some(line) => format!("Command failed: {line}"),
                    None => format!("Command failed with exit status {code}"),
                },
            },
            ExecError::Parse { reason, .. } => format!("Unexpected output: {reason}"),
            ExecError::Cancelled(_) => "Timed out waiting for host".to_string(),
            ExecError::Transport(detail) => match FailureCategory::classify(detail) {
                Some(category) => category.message().to_string(),
                None => detail.clone(),
            },
        }
    }

    /// Whether this failure means the host itself was unreachable, as
    /// opposed to one command on a reachable host going wrong.
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            ExecError::HostNotConfigured(_)
                | ExecError::ConnectionTimeout(_)
                | ExecError::ConnectionRefused(_)
                | ExecError::Cancelled(_)
        )
    }
}

fn first_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).find(|line| !line.is_empty())
}

// ---------------------------------------------------------------------------
// Failure text classification
// ---------------------------------------------------------------------------

/// Coarse categories recognised in raw failure text from ssh or a remote
/// shell. Matching is substring based and therefore locale dependent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCategory {
    ConnectionTimedOut,
    ConnectionRefused,
    NoRouteToHost,
    HostUnresolved,
    PermissionDenied,
    HostKeyVerificationFailed,
}

const CATEGORY_PATTERNS: &[(FailureCategory, &str)] = &[
    (FailureCategory::ConnectionTimedOut, r"(?i)timed?[ -]?out"),
    (FailureCategory::ConnectionRefused, r"(?i)connection refused"),
    (FailureCategory::NoRouteToHost, r"(?i)no route to host|network is unreachable"),
    (
        FailureCategory::HostUnresolved,
        r"(?i)could not resolve hostname|name or service not known",
    ),
    (FailureCategory::PermissionDenied, r"(?i)permission denied"),
    (
        FailureCategory::HostKeyVerificationFailed,
        r"(?i)host key verification failed",
    ),
];

fn category_set() -> &'static RegexSet {
    static SET: OnceLock<RegexSet> = OnceLock::new();
    SET.get_or_init(|| {
        RegexSet::new(CATEGORY_PATTERNS.iter().map(|(_, pattern)| *pattern))
            .unwrap_or_else(|_| RegexSet::empty())
    })
}

impl FailureCategory {
    /// First category (in declaration order) whose pattern matches `text`.
    pub fn classify(text: &str) -> Option<Self> {
        let matches = category_set().matches(text);
        CATEGORY_PATTERNS
            .iter()
            .enumerate()
            .find(|(idx, _)| matches.matched(*idx))
            .map(|(_, (category, _))| *category)
    }

    pub fn message(self) -> &'static str {
        match self {
            FailureCategory::ConnectionTimedOut => "Connection timed out",
            FailureCategory::ConnectionRefused => "Connection refused",
            FailureCategory::NoRouteToHost => "No route to host",
            FailureCategory::HostUnresolved => "Could not resolve host",
            FailureCategory::PermissionDenied => "Permission denied",
            FailureCategory::HostKeyVerificationFailed => "Host key verification failed",
        }
    }
}

// ---------------------------------------------------------------------------
// Request validation
// ---------------------------------------------------------------------------

/// Malformed caller input, rejected before any remote work starts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("search query must not be empty")]
    EmptyQuery,

    #[error("search query must be a single line")]
    MultilineQuery,

    #[error("invalid host filter entry {0:?}")]
    InvalidHostFilter(String),

    #[error("invalid source name {0:?}")]
    InvalidSourceName(String),

    #[error("unknown source kind {0:?}")]
    InvalidSourceKind(String),

    #[error("line count must be between 1 and {max}, got {requested}")]
    LineCountOutOfRange { requested: usize, max: usize },
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration could not be loaded or failed validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(#[from] config::ConfigError),

    #[error("failed to write default config to {path}: {source}")]
    WriteDefault {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}
