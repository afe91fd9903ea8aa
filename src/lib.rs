//! fleetlog — browse and search logs across a fleet of hosts.
//!
//! The discovery, aggregation and search engine lives in `fleetlog-core`;
//! command execution over `sh` and `ssh` lives in `fleetlog-exec`. This
//! crate adds the HTTP surface so that integration tests can drive the
//! router directly.
//!
//! # Architecture
//!
//! ```text
//! CLI / HTTP ──► CachedAggregator ──► Aggregator ──┐
//!            ├─► progress stream ──────────────────┤
//!            ├─► SearchEngine ─────────────────────┼──► FanOut ──► RoutingTransport
//!            └─► ContentReader ────────────────────┘                 ├─► sh -c
//!                                                                    └─► ssh
//! ```

pub mod server;

pub use server::{router, AppState};
