//! Source enumeration integration harness.
//!
//! # What this covers
//!
//! - **Step order**: one directory listing, then one stat per kept file,
//!   then one unit listing. Nothing runs after a failed listing.
//! - **Ordering**: files newest first, units after files in name order,
//!   directories never reported.
//! - **Recency limit**: only the 20 most recent entries are stat'ed.
//! - **Partial stat failure**: a failed stat drops that file and nothing
//!   else.
//! - **Fatal failures**: a failed file listing or unit listing fails the
//!   whole host.
//! - **Observer**: every reported source is seen exactly once.
//! - **Step timeout**: a stalled remote call becomes `Timeout`.
//!
//! # What this does NOT cover
//!
//! - Real `ls`/`stat`/`journalctl` output (see `transport_harness`)
//! - Concurrency across hosts (see `aggregate_harness`)
//!
//! # Running
//!
//! ```sh
//! cargo test --test enumerate_harness
//! ```

mod common;
use common::*;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use fleetlog_core::enumerate::{enumerate_host, EnumerationSettings, NoopObserver, ScanObserver};
use fleetlog_core::{ExecError, Host, HostRegistry, LogSource, RemoteCommand, SourceKind, Transport};
use pretty_assertions::assert_eq;

#[derive(Default)]
struct Recorder(Mutex<Vec<String>>);

impl ScanObserver for Recorder {
    fn source_found(&self, source: &LogSource) {
        self.0.lock().unwrap().push(source.name.clone());
    }
}

async fn enumerate(host: FakeHost) -> (Arc<FakeTransport>, Result<Vec<LogSource>, ExecError>) {
    let (transport, registry) = fleet(vec![("web1", host)]);
    let result = enumerate_with(&transport, registry.list_hosts().remove(0), Arc::new(NoopObserver)).await;
    (transport, result)
}

async fn enumerate_with(
    transport: &Arc<FakeTransport>,
    host: Host,
    observer: Arc<dyn ScanObserver>,
) -> Result<Vec<LogSource>, ExecError> {
    enumerate_host(
        Arc::clone(transport) as Arc<dyn Transport>,
        host,
        EnumerationSettings::from(&test_config().scan),
        observer,
    )
    .await
}

// ---------------------------------------------------------------------------
// Ordering
// ---------------------------------------------------------------------------

#[tokio::test]
async fn files_newest_first_then_units_by_name() {
    let (_, result) = enumerate(healthy_host()).await;
    let sources = result.unwrap();

    assert_source_names!(
        sources,
        "web1",
        ["syslog", "auth.log", "kern.log.1.gz", "cron.service", "sshd.service"]
    );
    let kinds: Vec<SourceKind> = sources.iter().map(LogSource::kind).collect();
    assert_eq!(
        kinds,
        vec![
            SourceKind::File,
            SourceKind::File,
            SourceKind::File,
            SourceKind::ServiceUnit,
            SourceKind::ServiceUnit
        ]
    );
}

#[tokio::test]
async fn file_metadata_comes_from_stat() {
    let host = FakeHost::new().file("syslog", 4096, T0);
    let (_, result) = enumerate(host).await;
    let sources = result.unwrap();

    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0].detail.size(), Some(4096));
    assert_eq!(sources[0].detail.modified().map(|t| t.timestamp()), Some(T0));
    assert_eq!(sources[0].display_name, "web1 host");
}

#[tokio::test]
async fn units_have_no_size_or_mtime() {
    let (_, result) = enumerate(FakeHost::new().unit("nginx.service")).await;
    let sources = result.unwrap();
    assert_eq!(sources[0].detail.size(), None);
    assert_eq!(sources[0].detail.modified(), None);
}

#[tokio::test]
async fn empty_host_has_no_sources() {
    let (_, result) = enumerate(FakeHost::new()).await;
    assert_eq!(result.unwrap(), Vec::<LogSource>::new());
}

// ---------------------------------------------------------------------------
// Remote call sequence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn steps_run_list_then_stat_then_units() {
    let host = FakeHost::new().file("b.log", 10, T0).file("a.log", 10, T0 + 60).unit("cron.service");
    let (transport, result) = enumerate(host).await;
    result.unwrap();

    let commands = transport.commands_for("web1");
    let labels: Vec<&str> = commands.iter().map(RemoteCommand::label).collect();
    assert_eq!(labels, vec!["list-directory", "stat-file", "stat-file", "list-units"]);
    assert_eq!(commands[1], RemoteCommand::stat_file("/var/log/a.log"));
    assert_eq!(commands[2], RemoteCommand::stat_file("/var/log/b.log"));
}

#[tokio::test]
async fn only_the_twenty_most_recent_files_are_stat_ed() {
    let (transport, result) = enumerate(many_files(25)).await;
    let sources = result.unwrap();

    assert_eq!(sources.len(), 20);
    assert_eq!(sources.first().map(|s| s.name.as_str()), Some("app-24.log"));
    assert_eq!(sources.last().map(|s| s.name.as_str()), Some("app-05.log"));

    let stats = transport
        .commands_for("web1")
        .into_iter()
        .filter(|c| matches!(c, RemoteCommand::StatFile { .. }))
        .count();
    assert_eq!(stats, 20);
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_stat_drops_only_that_file() {
    let host = healthy_host().failing_stat("auth.log");
    let (_, result) = enumerate(host).await;
    assert_source_names!(
        result.unwrap(),
        "web1",
        ["syslog", "kern.log.1.gz", "cron.service", "sshd.service"]
    );
}

#[tokio::test]
async fn failed_unit_listing_fails_the_host() {
    let host = healthy_host().failing_units(ExecError::CommandFailed {
        code: 1,
        stderr: "journalctl: command not found".into(),
    });
    let (_, result) = enumerate(host).await;
    assert!(matches!(result, Err(ExecError::CommandFailed { code: 1, .. })));
}

#[tokio::test]
async fn unreachable_host_stops_after_the_listing() {
    let (transport, result) = enumerate(unreachable_host()).await;
    assert!(matches!(result, Err(ExecError::ConnectionTimeout(_))));
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn stalled_call_hits_the_step_timeout() {
    let host = healthy_host().latency(Duration::from_secs(60));
    let (_, result) = enumerate(host).await;
    assert_eq!(result, Err(ExecError::Timeout(Duration::from_secs(5))));
}

// ---------------------------------------------------------------------------
// Observer
// ---------------------------------------------------------------------------

#[tokio::test]
async fn observer_sees_each_source_once() {
    let (transport, registry) = fleet(vec![("web1", healthy_host())]);
    let recorder = Arc::new(Recorder::default());
    let sources = enumerate_with(
        &transport,
        registry.list_hosts().remove(0),
        Arc::clone(&recorder) as Arc<dyn ScanObserver>,
    )
    .await
    .unwrap();

    let mut seen = recorder.0.lock().unwrap().clone();
    let mut reported: Vec<String> = sources.into_iter().map(|s| s.name).collect();
    seen.sort();
    reported.sort();
    assert_eq!(seen, reported);
}
