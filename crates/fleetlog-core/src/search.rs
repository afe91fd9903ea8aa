//! Fleet Search Engine.
//!
//! A search enumerates each selected host, then runs one fixed-string filter
//! per in-scope source, sequentially within the host. Hosts run through the
//! shared [`FanOut`]. A host lands in `failed_hosts` when its enumeration
//! fails or when every one of its filter calls fails; a host with no matches
//! appears in neither list.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::command::{parse_matches, ContentTarget, RemoteCommand};
use crate::config::{ScanConfig, SearchConfig};
use crate::content::validate_source_name;
use crate::enumerate::{enumerate_host, EnumerationSettings, NoopObserver};
use crate::error::{ExecError, RequestError};
use crate::fanout::FanOut;
use crate::registry::HostRegistry;
use crate::transport::{execute_bounded, Transport};
use crate::types::{Host, HostFailure, HostId, LogSource, SourceKind};

/// Which sources a search covers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SearchScope {
    #[default]
    All,
    /// Every source with this name, file or unit.
    Source(String),
}

impl SearchScope {
    /// `None`, empty and `"all"` mean every source.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("") | Some("all") => SearchScope::All,
            Some(name) => SearchScope::Source(name.to_string()),
        }
    }

    fn matches(&self, source: &LogSource) -> bool {
        match self {
            SearchScope::All => true,
            SearchScope::Source(name) => &source.name == name,
        }
    }
}

impl fmt::Display for SearchScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchScope::All => f.write_str("all"),
            SearchScope::Source(name) => f.write_str(name),
        }
    }
}

/// A search as the caller asked for it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchRequest {
    pub query: String,
    pub scope: SearchScope,
    /// Empty means every registered host.
    pub hosts: Vec<String>,
    pub case_sensitive: bool,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    /// Reject malformed input before any remote work.
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.query.trim().is_empty() {
            return Err(RequestError::EmptyQuery);
        }
        if self.query.contains(['\n', '\r', '\0']) {
            return Err(RequestError::MultilineQuery);
        }
        for entry in &self.hosts {
            let malformed = entry.is_empty()
                || entry.starts_with('-')
                || entry.chars().any(|c| c.is_whitespace() || c.is_control());
            if malformed {
                return Err(RequestError::InvalidHostFilter(entry.clone()));
            }
        }
        if let SearchScope::Source(name) = &self.scope {
            validate_source_name(name)?;
        }
        Ok(())
    }
}

/// One matching line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub host_id: HostId,
    pub display_name: String,
    pub source_name: String,
    pub source_kind: SourceKind,
    /// 1-based, as reported by the remote filter.
    pub line_number: u64,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub scope: String,
    pub case_sensitive: bool,
    pub results: Vec<SearchHit>,
    pub total_matches: usize,
    pub failed_hosts: Vec<HostFailure>,
    pub hosts_searched: usize,
}

#[derive(Debug, Clone)]
struct SearchPlan {
    query: String,
    scope: SearchScope,
    case_sensitive: bool,
    match_limit: usize,
    source_timeout: Duration,
    enumeration: EnumerationSettings,
}

/// Runs fleet-wide searches.
pub struct SearchEngine {
    transport: Arc<dyn Transport>,
    registry: Arc<dyn HostRegistry>,
    enumeration: EnumerationSettings,
    match_limit: usize,
    source_timeout: Duration,
    fanout: FanOut,
}

impl SearchEngine {
    pub fn new(
        transport: Arc<dyn Transport>,
        registry: Arc<dyn HostRegistry>,
        scan: &ScanConfig,
        search: &SearchConfig,
    ) -> Self {
        Self {
            transport,
            registry,
            enumeration: EnumerationSettings::from(scan),
            match_limit: search.match_limit,
            source_timeout: search.source_timeout(),
            fanout: FanOut::new(search.workers, search.budget())
                .with_task_timeout(search.host_timeout()),
        }
    }

    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, RequestError> {
        request.validate()?;

        let (hosts, mut failed_hosts) = self.select_hosts(&request.hosts);
        let hosts_searched = hosts.len() + failed_hosts.len();
        let plan = Arc::new(SearchPlan {
            query: request.query.clone(),
            scope: request.scope.clone(),
            case_sensitive: request.case_sensitive,
            match_limit: self.match_limit,
            source_timeout: self.source_timeout,
            enumeration: self.enumeration.clone(),
        });

        let transport = Arc::clone(&self.transport);
        let outcomes = self
            .fanout
            .run(
                hosts,
                move |host: Host| search_host(Arc::clone(&transport), host, Arc::clone(&plan)),
                |_, _| {},
            )
            .await;

        let mut results = Vec::new();
        for (host, outcome) in outcomes {
            match outcome {
                Ok(hits) => results.extend(hits),
                Err(err) => {
                    tracing::warn!(host = %host.id, error = %err, "host search failed");
                    failed_hosts.push(HostFailure::new(&host, &err));
                }
            }
        }

        tracing::info!(
            query = %request.query,
            scope = %request.scope,
            matches = results.len(),
            failed = failed_hosts.len(),
            "search finished"
        );
        Ok(SearchResponse {
            query: request.query.clone(),
            scope: request.scope.to_string(),
            case_sensitive: request.case_sensitive,
            total_matches: results.len(),
            results,
            failed_hosts,
            hosts_searched,
        })
    }

    /// Registered hosts matching the filter, in registry order, plus a
    /// failure for every filter entry the registry does not know.
    fn select_hosts(&self, filter: &[String]) -> (Vec<Host>, Vec<HostFailure>) {
        let registered = self.registry.list_hosts();
        if filter.is_empty() {
            return (registered, Vec::new());
        }

        let wanted: HashSet<&str> = filter.iter().map(String::as_str).collect();
        let known: HashSet<&str> = registered.iter().map(|host| host.id.as_str()).collect();
        let mut seen = HashSet::new();
        let unknown: Vec<HostFailure> = filter
            .iter()
            .filter(|id| !known.contains(id.as_str()) && seen.insert(id.as_str()))
            .map(|id| {
                let host = Host {
                    id: HostId::new(id.as_str()),
                    display_name: id.clone(),
                    connection: None,
                };
                HostFailure::new(&host, &ExecError::HostNotConfigured(id.clone()))
            })
            .collect();
        let selected = registered
            .iter()
            .filter(|host| wanted.contains(host.id.as_str()))
            .cloned()
            .collect();
        (selected, unknown)
    }
}

async fn search_host(
    transport: Arc<dyn Transport>,
    host: Host,
    plan: Arc<SearchPlan>,
) -> Result<Vec<SearchHit>, ExecError> {
    let sources = enumerate_host(
        Arc::clone(&transport),
        host.clone(),
        plan.enumeration.clone(),
        Arc::new(NoopObserver),
    )
    .await?;
    let targets: Vec<LogSource> = sources
        .into_iter()
        .filter(|source| plan.scope.matches(source))
        .collect();

    let mut hits = Vec::new();
    let mut failures = 0usize;
    let mut first_error = None;
    for source in &targets {
        let command = RemoteCommand::FilterContent {
            target: ContentTarget::for_source(&plan.enumeration.log_dir, &source.name, source.kind()),
            query: plan.query.clone(),
            case_sensitive: plan.case_sensitive,
            limit: plan.match_limit,
        };
        match execute_bounded(transport.as_ref(), &host.id, &command, plan.source_timeout).await {
            Ok(output) => {
                hits.extend(parse_matches(&output.stdout).into_iter().map(|matched| SearchHit {
                    host_id: host.id.clone(),
                    display_name: host.display_name.clone(),
                    source_name: source.name.clone(),
                    source_kind: source.kind(),
                    line_number: matched.line_number,
                    text: matched.text,
                }));
            }
            Err(err) if err.is_connection_failure() => return Err(err),
            Err(err) => {
                tracing::debug!(host = %host.id, source = %source.name, error = %err, "source search failed");
                failures += 1;
                first_error.get_or_insert(err);
            }
        }
    }

    match first_error {
        Some(err) if failures == targets.len() => Err(err),
        _ => Ok(hits),
    }
}
