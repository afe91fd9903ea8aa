//! Shared test utilities for fleetlog integration harnesses.
//!
//! Import everything you need via `mod common; use common::*;` at the top of
//! each harness file. The fake transport sleeps on tokio's clock, so latency
//! scenarios are deterministic under `#[tokio::test(start_paused = true)]`.

#![allow(dead_code, unused_imports)]

pub mod assertions;
pub mod builders;
pub mod fake_transport;
pub mod fixtures;

pub use assertions::*;
pub use builders::*;
pub use fake_transport::*;
pub use fixtures::*;
