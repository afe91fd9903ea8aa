//! Test builders — fluent constructors for fake hosts, registries, config
//! and the wired-up application state.
//!
//! These are for readability in test assertions, not for production use.
//! They panic on invalid input rather than returning `Result`.

use std::sync::Arc;
use std::time::Duration;

use fleetlog::AppState;
use fleetlog_core::config::Config;
use fleetlog_core::{
    Aggregator, Clock, ConnectionParams, ExecError, Host, HostRegistry, ManualClock,
    SearchEngine, StaticRegistry, Transport,
};

use crate::common::fake_transport::{FakeFile, FakeHost, FakeTransport};

// ---------------------------------------------------------------------------
// FakeHost
// ---------------------------------------------------------------------------

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// A file with `size` bytes, modified at `modified` epoch seconds, with
    /// no content.
    pub fn file(self, name: &str, size: u64, modified: i64) -> Self {
        self.file_with_lines(name, size, modified, &[])
    }

    pub fn file_with_lines(mut self, name: &str, size: u64, modified: i64, lines: &[&str]) -> Self {
        self.files.push(FakeFile {
            name: name.to_string(),
            size,
            modified,
            lines: lines.iter().map(|l| l.to_string()).collect(),
        });
        self
    }

    pub fn file_with_content(mut self, name: &str, modified: i64, lines: Vec<String>) -> Self {
        let size = lines.iter().map(|l| l.len() as u64 + 1).sum();
        self.files.push(FakeFile {
            name: name.to_string(),
            size,
            modified,
            lines,
        });
        self
    }

    pub fn directory(mut self, name: &str) -> Self {
        self.directories.push(name.to_string());
        self
    }

    pub fn unit(self, name: &str) -> Self {
        self.unit_with_lines(name, &[])
    }

    pub fn unit_with_lines(mut self, name: &str, lines: &[&str]) -> Self {
        self.units
            .push((name.to_string(), lines.iter().map(|l| l.to_string()).collect()));
        self
    }

    pub fn unreachable(mut self, err: ExecError) -> Self {
        self.unreachable = Some(err);
        self
    }

    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn failing_stat(mut self, name: &str) -> Self {
        self.stat_failures.insert(name.to_string());
        self
    }

    pub fn failing_units(mut self, err: ExecError) -> Self {
        self.units_failure = Some(err);
        self
    }

    pub fn failing_filter(mut self, name: &str) -> Self {
        self.filter_failures.insert(name.to_string());
        self
    }

    pub fn broken_reader(mut self, name: &str) -> Self {
        self.broken_readers.insert(name.to_string());
        self
    }
}

// ---------------------------------------------------------------------------
// Registry / config
// ---------------------------------------------------------------------------

/// Registry with the local sentinel (when `"local"` is listed) and one
/// remote host per other id, in the given order.
pub fn registry(ids: &[&str]) -> Arc<StaticRegistry> {
    let hosts = ids
        .iter()
        .map(|id| {
            if *id == "local" {
                Host::local("Local")
            } else {
                Host::remote(*id, format!("{id} host"), ConnectionParams::new(format!("{id}.internal")))
            }
        })
        .collect();
    Arc::new(StaticRegistry::new(hosts))
}

/// Defaults with a small worker pool and short deadlines.
pub fn test_config() -> Config {
    let mut config = Config::defaults();
    config.scan.workers = 4;
    config.scan.step_timeout_secs = 5;
    config.scan.budget_secs = 30;
    config.search.workers = 4;
    config.search.source_timeout_secs = 5;
    config.search.budget_secs = 30;
    config.cache.freshness_secs = 30;
    config
}

/// A fake transport and a registry built from `hosts`.
pub fn fleet(hosts: Vec<(&str, FakeHost)>) -> (Arc<FakeTransport>, Arc<StaticRegistry>) {
    let ids: Vec<&str> = hosts.iter().map(|(id, _)| *id).collect();
    let transport = FakeTransport::new();
    for (id, host) in hosts {
        transport.set_host(id, host);
    }
    (Arc::new(transport), registry(&ids))
}

pub fn aggregator(transport: &Arc<FakeTransport>, registry: &Arc<StaticRegistry>, config: &Config) -> Aggregator {
    Aggregator::new(
        Arc::clone(transport) as Arc<dyn Transport>,
        Arc::clone(registry) as Arc<dyn HostRegistry>,
        &config.scan,
    )
}

pub fn search_engine(
    transport: &Arc<FakeTransport>,
    registry: &Arc<StaticRegistry>,
    config: &Config,
) -> SearchEngine {
    SearchEngine::new(
        Arc::clone(transport) as Arc<dyn Transport>,
        Arc::clone(registry) as Arc<dyn HostRegistry>,
        &config.scan,
        &config.search,
    )
}

/// Application state over a fake fleet with a manual clock.
pub fn app_state(
    transport: &Arc<FakeTransport>,
    registry: &Arc<StaticRegistry>,
    config: &Config,
) -> (Arc<AppState>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let state = AppState::new(
        config,
        Arc::clone(transport) as Arc<dyn Transport>,
        Arc::clone(registry) as Arc<dyn HostRegistry>,
        Arc::clone(&clock) as Arc<dyn Clock>,
    );
    (Arc::new(state), clock)
}
