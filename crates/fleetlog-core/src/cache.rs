//! Result Cache.
//!
//! [`ResultCache`] holds at most one entry per [`AggregationKind`] and never
//! returns one older than its freshness window. The clock is injected so
//! tests control time. [`CachedAggregator`] is the read-through wrapper the
//! HTTP layer and CLI use.
//!
//! The entry map sits behind a `std::sync::Mutex` that is only ever held for
//! a lookup or an insert, never across a scan. Every [`ResultCache::invalidate`]
//! bumps a generation counter; a scan stores its result only if the
//! generation it started under is still current.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::aggregate::{Aggregator, MatrixView};
use crate::types::AggregationResult;

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Tokio's clock; follows `tokio::time::pause` in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// Which projection an entry holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationKind {
    Flat,
    Matrix,
}

/// A cached aggregate.
#[derive(Debug, Clone)]
pub enum CachedPayload {
    Flat(Arc<AggregationResult>),
    Matrix(Arc<MatrixView>),
}

impl CachedPayload {
    pub fn kind(&self) -> AggregationKind {
        match self {
            CachedPayload::Flat(_) => AggregationKind::Flat,
            CachedPayload::Matrix(_) => AggregationKind::Matrix,
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    payload: CachedPayload,
    stored_at: Instant,
}

#[derive(Debug, Default)]
struct CacheState {
    generation: u64,
    entries: HashMap<AggregationKind, CacheEntry>,
}

impl CacheState {
    fn insert(&mut self, payload: CachedPayload, stored_at: Instant) {
        self.entries.insert(payload.kind(), CacheEntry { payload, stored_at });
    }
}

/// Freshness-bounded store keyed by aggregation kind.
pub struct ResultCache {
    clock: Arc<dyn Clock>,
    freshness: Duration,
    state: Mutex<CacheState>,
}

impl ResultCache {
    pub fn new(clock: Arc<dyn Clock>, freshness: Duration) -> Self {
        Self {
            clock,
            freshness,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn freshness(&self) -> Duration {
        self.freshness
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current generation. Read it before starting the work whose result
    /// will be stored with [`ResultCache::put_if_current`].
    pub fn generation(&self) -> u64 {
        self.state().generation
    }

    /// The fresh entry for `kind` with the time it was stored. A stale entry
    /// is evicted and `None` returned.
    pub fn get(&self, kind: AggregationKind) -> Option<(CachedPayload, Instant)> {
        let now = self.clock.now();
        let mut state = self.state();
        let entry = state.entries.get(&kind)?.clone();
        if now.saturating_duration_since(entry.stored_at) < self.freshness {
            Some((entry.payload, entry.stored_at))
        } else {
            state.entries.remove(&kind);
            None
        }
    }

    /// Store `payload` stamped with the current time.
    pub fn put(&self, payload: CachedPayload) {
        let now = self.clock.now();
        self.put_at(payload, now);
    }

    /// Store `payload` stamped with `stored_at`, e.g. the time of the scan it
    /// was derived from.
    pub fn put_at(&self, payload: CachedPayload, stored_at: Instant) {
        self.state().insert(payload, stored_at);
    }

    /// Store `payloads` stamped with `stored_at`, unless the cache was
    /// invalidated after `generation` was read. Returns whether they were
    /// stored.
    pub fn put_if_current(
        &self,
        generation: u64,
        payloads: impl IntoIterator<Item = CachedPayload>,
        stored_at: Instant,
    ) -> bool {
        let mut state = self.state();
        if state.generation != generation {
            return false;
        }
        for payload in payloads {
            state.insert(payload, stored_at);
        }
        true
    }

    /// Drop every entry and start a new generation.
    pub fn invalidate(&self) {
        let mut state = self.state();
        state.generation += 1;
        state.entries.clear();
    }

    /// Invalidate and store `payload` as the only entry, atomically.
    pub fn replace(&self, payload: CachedPayload) {
        let now = self.clock.now();
        let mut state = self.state();
        state.generation += 1;
        state.entries.clear();
        state.insert(payload, now);
    }

    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Read-through
// ---------------------------------------------------------------------------

/// An [`Aggregator`] behind a [`ResultCache`].
///
/// Two concurrent misses may both scan; the later write wins. A scan that
/// was running when the cache was invalidated does not store its result.
pub struct CachedAggregator {
    aggregator: Arc<Aggregator>,
    cache: ResultCache,
}

impl CachedAggregator {
    pub fn new(aggregator: Arc<Aggregator>, cache: ResultCache) -> Self {
        Self { aggregator, cache }
    }

    pub fn aggregator(&self) -> &Arc<Aggregator> {
        &self.aggregator
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Flat result, from cache when fresh. A scan in which every host failed
    /// is cached like any other.
    pub async fn flat(&self) -> Arc<AggregationResult> {
        if let Some((CachedPayload::Flat(result), _)) = self.cache.get(AggregationKind::Flat) {
            tracing::debug!("flat cache hit");
            return result;
        }
        let generation = self.cache.generation();
        let result = Arc::new(self.aggregator.scan().await);
        let stored = self.cache.put_if_current(
            generation,
            [CachedPayload::Flat(Arc::clone(&result))],
            self.cache.now(),
        );
        if !stored {
            tracing::debug!("cache invalidated during scan, result not stored");
        }
        result
    }

    /// Matrix result. Re-projects a fresh flat entry when there is one, and
    /// only scans when neither is fresh.
    pub async fn matrix(&self) -> Arc<MatrixView> {
        if let Some((CachedPayload::Matrix(matrix), _)) = self.cache.get(AggregationKind::Matrix) {
            tracing::debug!("matrix cache hit");
            return matrix;
        }
        let generation = self.cache.generation();
        if let Some((CachedPayload::Flat(result), stored_at)) = self.cache.get(AggregationKind::Flat) {
            tracing::debug!("matrix projected from cached flat scan");
            let matrix = Arc::new(MatrixView::project(&result));
            self.cache
                .put_if_current(generation, [CachedPayload::Matrix(Arc::clone(&matrix))], stored_at);
            return matrix;
        }

        let result = Arc::new(self.aggregator.scan().await);
        let matrix = Arc::new(MatrixView::project(&result));
        let stored = self.cache.put_if_current(
            generation,
            [CachedPayload::Flat(result), CachedPayload::Matrix(Arc::clone(&matrix))],
            self.cache.now(),
        );
        if !stored {
            tracing::debug!("cache invalidated during scan, result not stored");
        }
        matrix
    }

    /// Store the result of a scan that ran outside this wrapper, e.g. a
    /// completed progress stream. Replaces every entry.
    pub fn store_flat(&self, result: AggregationResult) {
        self.cache.replace(CachedPayload::Flat(Arc::new(result)));
    }

    pub fn invalidate(&self) {
        tracing::info!("result cache invalidated");
        self.cache.invalidate();
    }
}
