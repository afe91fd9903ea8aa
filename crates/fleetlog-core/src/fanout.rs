//! Bounded-concurrency fan-out.
//!
//! [`FanOut`] runs one task per item with at most `workers` in flight, an
//! optional per-task timeout, and a hard wall-clock budget for the whole
//! run. When the budget expires (or the cancellation token fires) every
//! task still running is aborted and reported as [`ExecError::Cancelled`];
//! nothing is awaited past the deadline.
//!
//! Both the aggregator and the search engine go through this one utility.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::ExecError;

/// Fan-out parameters.
#[derive(Debug, Clone)]
pub struct FanOut {
    workers: usize,
    task_timeout: Option<Duration>,
    budget: Duration,
    cancel: Option<CancellationToken>,
}

impl FanOut {
    /// `workers` is clamped to at least one.
    pub fn new(workers: usize, budget: Duration) -> Self {
        Self {
            workers: workers.max(1),
            task_timeout: None,
            budget,
            cancel: None,
        }
    }

    /// Fail a single task with [`ExecError::Timeout`] after `timeout`;
    /// `None` leaves only the overall budget.
    pub fn with_task_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.task_timeout = timeout;
        self
    }

    /// Stop early, cancelling in-flight tasks, when `token` fires.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Run `task` for every item.
    ///
    /// `on_complete` is called once per item, in completion order, as soon
    /// as that item's outcome is known; items cut off by the deadline are
    /// reported after the deadline. The returned vector is in input order.
    pub async fn run<I, T, F, Fut, C>(
        &self,
        items: Vec<I>,
        task: F,
        mut on_complete: C,
    ) -> Vec<(I, Result<T, ExecError>)>
    where
        I: Clone + Send + 'static,
        T: Send + 'static,
        F: Fn(I) -> Fut,
        Fut: Future<Output = Result<T, ExecError>> + Send + 'static,
        C: FnMut(&I, &Result<T, ExecError>) + Send,
    {
        let deadline = Instant::now() + self.budget;
        let permits = Arc::new(Semaphore::new(self.workers));
        let mut set = JoinSet::new();
        let mut outcomes: Vec<Option<Result<T, ExecError>>> = items.iter().map(|_| None).collect();

        for (idx, item) in items.iter().enumerate() {
            let permits = Arc::clone(&permits);
            let work = task(item.clone());
            let task_timeout = self.task_timeout;
            set.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return (idx, Err(ExecError::Cancelled("worker pool closed".to_string())));
                };
                let guarded = AssertUnwindSafe(work).catch_unwind();
                let outcome = match task_timeout {
                    Some(limit) => match tokio::time::timeout(limit, guarded).await {
                        Ok(done) => done,
                        Err(_) => return (idx, Err(ExecError::Timeout(limit))),
                    },
                    None => guarded.await,
                };
                let result = outcome
                    .unwrap_or_else(|_| Err(ExecError::Transport("task panicked".to_string())));
                (idx, result)
            });
        }

        let stop_reason = loop {
            let joined = tokio::select! {
                biased;
                _ = cancelled(self.cancel.as_ref()) => break Some("request cancelled"),
                joined = tokio::time::timeout_at(deadline, set.join_next()) => joined,
            };
            match joined {
                Err(_) => break Some("fan-out budget exceeded"),
                Ok(None) => break None,
                Ok(Some(Ok((idx, result)))) => {
                    on_complete(&items[idx], &result);
                    outcomes[idx] = Some(result);
                }
                Ok(Some(Err(join_error))) => {
                    tracing::warn!(error = %join_error, "fan-out task did not finish");
                }
            }
        };

        if let Some(reason) = stop_reason {
            let in_flight = set.len();
            set.abort_all();
            tracing::warn!(in_flight, reason, budget = ?self.budget, "fan-out stopped early");
        }
        drop(set);

        items
            .into_iter()
            .zip(outcomes)
            .map(|(item, outcome)| {
                let result = match outcome {
                    Some(result) => result,
                    None => {
                        let result = Err(ExecError::Cancelled(
                            stop_reason.unwrap_or("task did not finish").to_string(),
                        ));
                        on_complete(&item, &result);
                        result
                    }
                };
                (item, result)
            })
            .collect()
    }
}

async fn cancelled(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}
