//! Source Enumerator: the sources of one host.
//!
//! Three steps, strictly in order: list the log directory, stat the most
//! recent entries one by one, then list the journal's service units. A
//! failed listing (files or units) fails the host; a failed stat only
//! drops that one file.

use std::sync::Arc;
use std::time::Duration;

use crate::command::{join_path, parse_listing, parse_stat, parse_units, ListedEntry, RemoteCommand};
use crate::config::ScanConfig;
use crate::error::ExecError;
use crate::transport::{execute_bounded, Transport};
use crate::types::{Host, LogSource};

/// Receives sources as soon as their metadata is known.
pub trait ScanObserver: Send + Sync {
    fn source_found(&self, _source: &LogSource) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ScanObserver for NoopObserver {}

// ---------------------------------------------------------------------------
// Recency policy
// ---------------------------------------------------------------------------

/// Result of applying a truncation policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Truncated<T> {
    pub kept: Vec<T>,
    pub dropped: Vec<T>,
}

/// Keep only the `limit` most recently modified directory entries.
///
/// Recency comes from the listing rank (`ls -t` order), so the decision is
/// made before any stat call. Equal ranks keep their input order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecencyPolicy {
    pub limit: usize,
}

impl RecencyPolicy {
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }

    pub fn apply(&self, mut entries: Vec<ListedEntry>) -> Truncated<ListedEntry> {
        entries.sort_by_key(|entry| entry.rank);
        let dropped = if entries.len() > self.limit {
            entries.split_off(self.limit)
        } else {
            Vec::new()
        };
        Truncated {
            kept: entries,
            dropped,
        }
    }
}

// ---------------------------------------------------------------------------
// Enumeration
// ---------------------------------------------------------------------------

/// Knobs for one host's enumeration.
#[derive(Debug, Clone)]
pub struct EnumerationSettings {
    pub log_dir: String,
    pub policy: RecencyPolicy,
    /// Deadline for each individual remote call.
    pub step_timeout: Duration,
}

impl From<&ScanConfig> for EnumerationSettings {
    fn from(scan: &ScanConfig) -> Self {
        Self {
            log_dir: scan.log_dir.clone(),
            policy: RecencyPolicy::new(scan.recent_file_limit),
            step_timeout: scan.step_timeout(),
        }
    }
}

/// Enumerate every source on `host`.
///
/// Files come first, newest first; service units follow in name order.
pub async fn enumerate_host(
    transport: Arc<dyn Transport>,
    host: Host,
    settings: EnumerationSettings,
    observer: Arc<dyn ScanObserver>,
) -> Result<Vec<LogSource>, ExecError> {
    let transport = transport.as_ref();
    let listing = execute_bounded(
        transport,
        &host.id,
        &RemoteCommand::list_directory(settings.log_dir.clone()),
        settings.step_timeout,
    )
    .await?;

    let Truncated { kept, dropped } = settings.policy.apply(parse_listing(&listing.stdout));
    if !dropped.is_empty() {
        tracing::debug!(host = %host.id, kept = kept.len(), dropped = dropped.len(), "recency limit applied");
    }

    let mut files = Vec::with_capacity(kept.len());
    for entry in kept {
        let command = RemoteCommand::stat_file(join_path(&settings.log_dir, &entry.name));
        let stat = execute_bounded(transport, &host.id, &command, settings.step_timeout)
            .await
            .and_then(|output| {
                parse_stat(&output.stdout).map_err(|reason| ExecError::Parse {
                    command: command.label().to_string(),
                    reason,
                })
            });
        match stat {
            Ok((size, modified)) => {
                let source = LogSource::file(&host, entry.name, size, modified);
                observer.source_found(&source);
                files.push((entry.rank, source));
            }
            Err(err) => {
                tracing::warn!(host = %host.id, file = %entry.name, error = %err, "skipping file, stat failed");
            }
        }
    }
    files.sort_by(|(rank_a, a), (rank_b, b)| {
        b.detail
            .modified()
            .cmp(&a.detail.modified())
            .then(rank_a.cmp(rank_b))
    });

    let units = execute_bounded(
        transport,
        &host.id,
        &RemoteCommand::ListUnits,
        settings.step_timeout,
    )
    .await?;

    let mut sources: Vec<LogSource> = files.into_iter().map(|(_, source)| source).collect();
    for unit in parse_units(&units.stdout) {
        let source = LogSource::unit(&host, unit);
        observer.source_found(&source);
        sources.push(source);
    }

    tracing::debug!(host = %host.id, sources = sources.len(), "enumeration finished");
    Ok(sources)
}
