//! HTTP surface.
//!
//! Aggregate and search endpoints always answer 200 with per-host failures
//! in the payload; only malformed requests (400) and a failed single-source
//! read (502) use error statuses.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use fleetlog_core::cache::{ResultCache, SystemClock};
use fleetlog_core::{
    stream_scan, Aggregator, CachedAggregator, Clock, Config, ContentReader, FlatView,
    HostFailure, HostRegistry, HostSummary, LogContent, MatrixView, RequestError, SearchEngine,
    SearchRequest, SearchResponse, SearchScope, SourceKind, StaticRegistry, TailError,
    TailRequest, Transport,
};
use fleetlog_exec::RoutingTransport;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;

/// Everything a request handler needs.
pub struct AppState {
    pub registry: Arc<dyn HostRegistry>,
    pub scans: CachedAggregator,
    pub search: SearchEngine,
    pub content: ContentReader,
}

impl AppState {
    /// Wire the production registry and transport from `config`.
    pub fn from_config(config: &Config) -> Self {
        let registry: Arc<dyn HostRegistry> = Arc::new(StaticRegistry::from_config(config));
        let transport: Arc<dyn Transport> =
            Arc::new(RoutingTransport::from_config(config, Arc::clone(&registry)));
        Self::new(config, transport, registry, Arc::new(SystemClock))
    }

    pub fn new(
        config: &Config,
        transport: Arc<dyn Transport>,
        registry: Arc<dyn HostRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let aggregator = Arc::new(Aggregator::new(
            Arc::clone(&transport),
            Arc::clone(&registry),
            &config.scan,
        ));
        Self {
            scans: CachedAggregator::new(
                aggregator,
                ResultCache::new(clock, config.cache.freshness()),
            ),
            search: SearchEngine::new(
                Arc::clone(&transport),
                Arc::clone(&registry),
                &config.scan,
                &config.search,
            ),
            content: ContentReader::new(transport, Arc::clone(&registry), config),
            registry,
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/hosts", get(list_hosts))
        .route("/api/logs", get(list_logs))
        .route("/api/logs/matrix", get(log_matrix))
        .route("/api/logs/stream", get(stream_logs))
        .route("/api/search", get(search))
        .route("/api/hosts/{host}/logs/{name}", get(read_log))
        .route("/api/cache/invalidate", post(invalidate_cache))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ApiError {
    BadRequest(RequestError),
    Upstream(HostFailure),
}

impl From<RequestError> for ApiError {
    fn from(err: RequestError) -> Self {
        ApiError::BadRequest(err)
    }
}

impl From<TailError> for ApiError {
    fn from(err: TailError) -> Self {
        match err {
            TailError::Request(err) => ApiError::BadRequest(err),
            TailError::Host(failure) => ApiError::Upstream(failure),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(err) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": err.to_string() }))).into_response()
            }
            ApiError::Upstream(failure) => (
                StatusCode::BAD_GATEWAY,
                Json(json!({
                    "error": failure.error,
                    "host_id": failure.host_id,
                    "kind": failure.kind,
                })),
            )
                .into_response(),
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn list_hosts(State(state): State<Arc<AppState>>) -> Json<Vec<HostSummary>> {
    Json(state.registry.list_hosts().iter().map(HostSummary::from).collect())
}

async fn list_logs(State(state): State<Arc<AppState>>) -> Json<FlatView> {
    let result = state.scans.flat().await;
    Json(FlatView::from(result.as_ref()))
}

async fn log_matrix(State(state): State<Arc<AppState>>) -> Json<MatrixView> {
    let matrix = state.scans.matrix().await;
    Json(matrix.as_ref().clone())
}

async fn stream_logs(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let events = stream_scan(Arc::clone(state.scans.aggregator())).map(|event| {
        let event = Event::default()
            .json_data(&event)
            .unwrap_or_else(|_| Event::default().data(r#"{"status":"error","message":"unserialisable event"}"#));
        Ok(event)
    });
    Sse::new(events).keep_alive(KeepAlive::default())
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    q: Option<String>,
    #[serde(default)]
    scope: Option<String>,
    /// Comma-separated host ids.
    #[serde(default)]
    hosts: Option<String>,
    #[serde(default)]
    case_sensitive: Option<bool>,
}

impl From<SearchParams> for SearchRequest {
    fn from(params: SearchParams) -> Self {
        SearchRequest {
            query: params.q.unwrap_or_default(),
            scope: SearchScope::parse(params.scope.as_deref()),
            hosts: params
                .hosts
                .as_deref()
                .map(|hosts| {
                    hosts
                        .split(',')
                        .map(str::trim)
                        .filter(|id| !id.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            case_sensitive: params.case_sensitive.unwrap_or(false),
        }
    }
}

async fn search(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let request = SearchRequest::from(params);
    Ok(Json(state.search.search(&request).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct TailParams {
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    lines: Option<usize>,
}

async fn read_log(
    State(state): State<Arc<AppState>>,
    Path((host, name)): Path<(String, String)>,
    Query(params): Query<TailParams>,
) -> Result<Json<LogContent>, ApiError> {
    let kind = match params.kind.as_deref() {
        None => SourceKind::File,
        Some(raw) => raw
            .parse::<SourceKind>()
            .map_err(|_| RequestError::InvalidSourceKind(raw.to_string()))?,
    };
    let request = TailRequest {
        host_id: host.into(),
        name,
        kind,
        lines: params.lines,
    };
    Ok(Json(state.content.read_tail(&request).await?))
}

async fn invalidate_cache(State(state): State<Arc<AppState>>) -> StatusCode {
    state.scans.invalidate();
    StatusCode::NO_CONTENT
}
