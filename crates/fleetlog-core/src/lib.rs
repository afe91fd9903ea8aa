//! fleetlog-core — discovery, aggregation and search of logs across a fleet.
//!
//! Every read from a host is a command run through a [`Transport`]; this
//! crate decides which commands to run, in what order and under which
//! deadlines, and folds per-host failures into the results as data.
//!
//! # Architecture
//!
//! ```text
//!                       ┌──► Aggregator ──► ResultCache ──► flat / matrix
//! Registry ──► FanOut ──┼──► Progress stream (SSE)
//!                       └──► SearchEngine
//!                 │
//!            Enumerator ──► Transport (local sh / ssh)
//! ```

pub mod aggregate;
pub mod cache;
pub mod command;
pub mod config;
pub mod content;
pub mod enumerate;
pub mod error;
pub mod fanout;
pub mod progress;
pub mod registry;
pub mod search;
pub mod transport;
pub mod types;

pub use aggregate::{Aggregator, FlatView, MatrixRow, MatrixView};
pub use cache::{AggregationKind, CachedAggregator, Clock, ManualClock, ResultCache, SystemClock};
pub use command::RemoteCommand;
pub use config::Config;
pub use content::{ContentReader, LogContent, TailError, TailRequest};
pub use error::{ConfigError, ExecError, FailureCategory, FailureKind, RequestError};
pub use fanout::FanOut;
pub use progress::{stream_scan, ProgressEvent, ProgressStream};
pub use registry::{HostRegistry, StaticRegistry};
pub use search::{SearchEngine, SearchHit, SearchRequest, SearchResponse, SearchScope};
pub use transport::{CommandOutput, Transport};
pub use types::{
    AggregationResult, ConnectionParams, Host, HostFailure, HostId, HostSummary, LogSource,
    SourceDetail, SourceKey, SourceKind,
};
