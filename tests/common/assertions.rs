//! Domain-specific assertion macros for fleetlog harnesses.
//!
//! These add context to failures: which host, which source and what the
//! surrounding result looked like, so a broken partial-failure invariant is
//! obvious from the panic message alone.

use fleetlog_core::{FailureKind, HostFailure, LogSource, ProgressEvent};

// ---------------------------------------------------------------------------
// Failure assertions
// ---------------------------------------------------------------------------

/// Assert that `failed_hosts` contains exactly one entry for `host` and that
/// it carries the expected `FailureKind`.
///
/// ```rust
/// assert_failed_host!(result.failed_hosts, "db1", FailureKind::ConnectionTimeout);
/// ```
#[macro_export]
macro_rules! assert_failed_host {
    ($failures:expr, $host:expr, $kind:expr) => {{
        let failures: &[fleetlog_core::HostFailure] = &$failures;
        let host: &str = $host;
        let expected: fleetlog_core::FailureKind = $kind;
        let entries: Vec<_> = failures.iter().filter(|f| f.host_id.as_str() == host).collect();
        match entries.as_slice() {
            [entry] if entry.kind == expected => {}
            [entry] => panic!(
                "assert_failed_host! failed for {:?}:\n  expected kind: {:?}\n  actual kind:   {:?}\n  error: {:?}",
                host, expected, entry.kind, entry.error
            ),
            [] => panic!(
                "assert_failed_host! failed: {:?} not in failed_hosts.\n  failed: {:?}",
                host,
                failures.iter().map(|f| f.host_id.as_str()).collect::<Vec<_>>()
            ),
            many => panic!(
                "assert_failed_host! failed: {:?} listed {} times in failed_hosts",
                host,
                many.len()
            ),
        }
    }};
}

/// Assert that `host` does not appear in `failed_hosts`.
#[macro_export]
macro_rules! assert_not_failed {
    ($failures:expr, $host:expr) => {{
        let failures: &[fleetlog_core::HostFailure] = &$failures;
        let host: &str = $host;
        if let Some(entry) = failures.iter().find(|f| f.host_id.as_str() == host) {
            panic!(
                "assert_not_failed! failed: {:?} unexpectedly failed.\n  kind: {:?}\n  error: {:?}",
                host, entry.kind, entry.error
            );
        }
    }};
}

// ---------------------------------------------------------------------------
// Source assertions
// ---------------------------------------------------------------------------

/// Assert that no source in the list belongs to `host`.
#[macro_export]
macro_rules! assert_no_sources_from {
    ($sources:expr, $host:expr) => {{
        let sources: &[fleetlog_core::LogSource] = &$sources;
        let host: &str = $host;
        let leaked: Vec<&str> = sources
            .iter()
            .filter(|s| s.host_id.as_str() == host)
            .map(|s| s.name.as_str())
            .collect();
        if !leaked.is_empty() {
            panic!(
                "assert_no_sources_from! failed: {} source(s) from {:?} present: {:?}",
                leaked.len(),
                host,
                leaked
            );
        }
    }};
}

/// Assert the exact names (in order) of the sources belonging to `host`.
///
/// ```rust
/// assert_source_names!(result.sources, "web1", ["syslog", "auth.log", "sshd.service"]);
/// ```
#[macro_export]
macro_rules! assert_source_names {
    ($sources:expr, $host:expr, [$($name:expr),* $(,)?]) => {{
        let sources: &[fleetlog_core::LogSource] = &$sources;
        let host: &str = $host;
        let actual: Vec<&str> = sources
            .iter()
            .filter(|s| s.host_id.as_str() == host)
            .map(|s| s.name.as_str())
            .collect();
        let expected: Vec<&str> = vec![$($name),*];
        pretty_assertions::assert_eq!(actual, expected, "sources of {:?}", host);
    }};
}

// ---------------------------------------------------------------------------
// Progress assertions
// ---------------------------------------------------------------------------

/// Assert that exactly one event is terminal and that it is the last one.
#[macro_export]
macro_rules! assert_single_terminal {
    ($events:expr) => {{
        let events: &[fleetlog_core::ProgressEvent] = &$events;
        let terminals: Vec<usize> = events
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_terminal())
            .map(|(i, _)| i)
            .collect();
        if terminals.len() != 1 {
            panic!(
                "assert_single_terminal! failed: {} terminal events in {:#?}",
                terminals.len(),
                events
            );
        }
        if terminals[0] != events.len() - 1 {
            panic!(
                "assert_single_terminal! failed: terminal event at {} of {}",
                terminals[0],
                events.len()
            );
        }
    }};
}

// ---------------------------------------------------------------------------
// Helpers used by the macros' callers
// ---------------------------------------------------------------------------

/// Host ids of every failure, in order.
pub fn failed_ids(failures: &[HostFailure]) -> Vec<&str> {
    failures.iter().map(|f| f.host_id.as_str()).collect()
}

/// Host ids that contributed at least one source, deduplicated in first-seen
/// order.
pub fn contributing_hosts(sources: &[LogSource]) -> Vec<&str> {
    let mut seen = Vec::new();
    for source in sources {
        if !seen.contains(&source.host_id.as_str()) {
            seen.push(source.host_id.as_str());
        }
    }
    seen
}

/// The last event, which must be `complete`.
pub fn completion(events: &[ProgressEvent]) -> (usize, usize, usize, Vec<HostFailure>) {
    match events.last() {
        Some(ProgressEvent::Complete {
            total_sources,
            total_hosts,
            successful_hosts,
            failed_hosts,
        }) => (*total_sources, *total_hosts, *successful_hosts, failed_hosts.clone()),
        other => panic!("expected a complete event last, got {other:?}"),
    }
}

pub fn is_kind(failure: &HostFailure, kind: FailureKind) -> bool {
    failure.kind == kind
}
