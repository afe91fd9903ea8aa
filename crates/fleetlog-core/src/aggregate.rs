//! Fan-Out Aggregator and its two projections.
//!
//! One [`Aggregator::scan`] enumerates every registered host through the
//! shared [`FanOut`]. Each host contributes all of its sources or lands in
//! `failed_hosts`; partial per-host output is never merged. [`FlatView`]
//! and [`MatrixView`] are pure projections of the resulting
//! [`AggregationResult`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::ScanConfig;
use crate::enumerate::{enumerate_host, EnumerationSettings, NoopObserver, ScanObserver};
use crate::error::ExecError;
use crate::fanout::FanOut;
use crate::registry::HostRegistry;
use crate::transport::Transport;
use crate::types::{
    AggregationResult, Host, HostFailure, HostId, HostSummary, LogSource, SourceDetail, SourceKey,
    SourceKind,
};

/// Enumerates every host in the registry concurrently.
pub struct Aggregator {
    transport: Arc<dyn Transport>,
    registry: Arc<dyn HostRegistry>,
    settings: EnumerationSettings,
    fanout: FanOut,
}

impl Aggregator {
    pub fn new(
        transport: Arc<dyn Transport>,
        registry: Arc<dyn HostRegistry>,
        scan: &ScanConfig,
    ) -> Self {
        Self {
            transport,
            registry,
            settings: EnumerationSettings::from(scan),
            fanout: FanOut::new(scan.workers, scan.budget()).with_task_timeout(scan.host_timeout()),
        }
    }

    pub fn registry(&self) -> &Arc<dyn HostRegistry> {
        &self.registry
    }

    pub fn settings(&self) -> &EnumerationSettings {
        &self.settings
    }

    /// One full enumeration pass over the fleet.
    pub async fn scan(&self) -> AggregationResult {
        self.scan_observed(Arc::new(NoopObserver), |_, _| {}, None)
            .await
    }

    /// Like [`scan`](Self::scan), reporting sources and host completions as
    /// they happen and stopping early when `cancel` fires. `host_finished`
    /// is called exactly once per host.
    pub async fn scan_observed(
        &self,
        observer: Arc<dyn ScanObserver>,
        mut host_finished: impl FnMut(&Host, &Result<Vec<LogSource>, ExecError>) + Send,
        cancel: Option<CancellationToken>,
    ) -> AggregationResult {
        let hosts = self.registry.list_hosts();
        let mut fanout = self.fanout.clone();
        if let Some(token) = cancel {
            fanout = fanout.with_cancellation(token);
        }

        let transport = Arc::clone(&self.transport);
        let settings = self.settings.clone();
        let outcomes = fanout
            .run(
                hosts,
                move |host: Host| {
                    enumerate_host(
                        Arc::clone(&transport),
                        host,
                        settings.clone(),
                        Arc::clone(&observer),
                    )
                },
                |host, outcome| host_finished(host, outcome),
            )
            .await;

        let result = merge(outcomes);
        tracing::info!(
            hosts = result.total_hosts(),
            failed = result.failed_hosts.len(),
            sources = result.sources.len(),
            "scan finished"
        );
        result
    }
}

/// Fold per-host outcomes into one result. Hosts keep their input order.
pub fn merge(outcomes: Vec<(Host, Result<Vec<LogSource>, ExecError>)>) -> AggregationResult {
    let mut result = AggregationResult::default();
    for (host, outcome) in outcomes {
        result.hosts.push(HostSummary::from(&host));
        match outcome {
            Ok(sources) => result.sources.extend(sources),
            Err(err) => {
                tracing::warn!(host = %host.id, error = %err, "host enumeration failed");
                result.failed_hosts.push(HostFailure::new(&host, &err));
            }
        }
    }
    result
}

// ---------------------------------------------------------------------------
// Projections
// ---------------------------------------------------------------------------

/// Flat list of every source plus the failure summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatView {
    pub sources: Vec<LogSource>,
    pub failed_hosts: Vec<HostFailure>,
    pub total_hosts: usize,
    pub successful_hosts: usize,
}

impl From<&AggregationResult> for FlatView {
    fn from(result: &AggregationResult) -> Self {
        Self {
            sources: result.sources.clone(),
            failed_hosts: result.failed_hosts.clone(),
            total_hosts: result.total_hosts(),
            successful_hosts: result.successful_hosts(),
        }
    }
}

/// One row of the matrix: a source identity and the hosts that have it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixRow {
    pub name: String,
    pub kind: SourceKind,
    /// Hosts lacking this source have no entry.
    pub hosts: BTreeMap<HostId, SourceDetail>,
}

/// Host × source matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixView {
    /// Sorted by `(name, kind)`.
    pub rows: Vec<MatrixRow>,
    pub hosts: Vec<HostSummary>,
    pub failed_hosts: Vec<HostFailure>,
    pub total_hosts: usize,
    pub successful_hosts: usize,
}

impl MatrixView {
    /// Group `result.sources` by source identity. The row set and cell
    /// contents do not depend on the order of `result.sources`.
    pub fn project(result: &AggregationResult) -> Self {
        let mut grouped: BTreeMap<SourceKey, BTreeMap<HostId, SourceDetail>> = BTreeMap::new();
        for source in &result.sources {
            grouped
                .entry(source.key())
                .or_default()
                .insert(source.host_id.clone(), source.detail.clone());
        }
        let rows = grouped
            .into_iter()
            .map(|(key, hosts)| MatrixRow {
                name: key.name,
                kind: key.kind,
                hosts,
            })
            .collect();
        Self {
            rows,
            hosts: result.hosts.clone(),
            failed_hosts: result.failed_hosts.clone(),
            total_hosts: result.total_hosts(),
            successful_hosts: result.successful_hosts(),
        }
    }

    /// Every `(source, host)` pair present in the matrix.
    pub fn pairs(&self) -> BTreeSet<(SourceKey, HostId)> {
        self.rows
            .iter()
            .flat_map(|row| {
                let key = SourceKey::new(row.name.clone(), row.kind);
                row.hosts.keys().map(move |host| (key.clone(), host.clone()))
            })
            .collect()
    }
}
