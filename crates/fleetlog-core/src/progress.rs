//! Progress Streamer.
//!
//! [`stream_scan`] runs one fleet scan in the background and returns a
//! [`ProgressStream`] of [`ProgressEvent`]s: a start event, one `source`
//! event per discovered source, `progress` events as hosts finish, and
//! exactly one terminal `complete` or `error`. Dropping the stream cancels
//! the scan.

use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::{FutureExt, Stream};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::aggregate::Aggregator;
use crate::enumerate::ScanObserver;
use crate::types::{HostFailure, LogSource};

/// One record of the progress feed. Serialised with a `status` tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProgressEvent {
    Progress {
        message: String,
        percent: u8,
    },
    Source {
        source: LogSource,
    },
    Complete {
        total_sources: usize,
        total_hosts: usize,
        successful_hosts: usize,
        failed_hosts: Vec<HostFailure>,
    },
    Error {
        message: String,
    },
}

impl ProgressEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressEvent::Complete { .. } | ProgressEvent::Error { .. })
    }
}

/// Best-effort completion estimate. Never decreases, never exceeds 100.
#[derive(Debug, Clone)]
pub struct ProgressMeter {
    planned: usize,
    done: usize,
    last: u8,
}

impl ProgressMeter {
    pub fn new(planned: usize) -> Self {
        Self {
            planned,
            done: 0,
            last: 0,
        }
    }

    /// Record one finished unit of work and return the new percentage.
    pub fn advance(&mut self) -> u8 {
        self.done = self.done.saturating_add(1);
        let estimate = if self.planned == 0 {
            100
        } else {
            (self.done.min(self.planned) * 100 / self.planned) as u8
        };
        self.last = self.last.max(estimate.min(100));
        self.last
    }
}

// ---------------------------------------------------------------------------
// Producer side
// ---------------------------------------------------------------------------

/// Sender that stops forwarding after the first terminal event.
struct EventSink {
    tx: mpsc::UnboundedSender<ProgressEvent>,
    finished: AtomicBool,
}

impl EventSink {
    fn emit(&self, event: ProgressEvent) {
        if !self.finished.load(Ordering::Acquire) {
            let _ = self.tx.send(event);
        }
    }

    fn finish(&self, event: ProgressEvent) {
        if !self.finished.swap(true, Ordering::AcqRel) {
            let _ = self.tx.send(event);
        }
    }
}

struct SinkObserver(Arc<EventSink>);

impl ScanObserver for SinkObserver {
    fn source_found(&self, source: &LogSource) {
        self.0.emit(ProgressEvent::Source {
            source: source.clone(),
        });
    }
}

/// Start a scan on the current tokio runtime and stream its progress.
pub fn stream_scan(aggregator: Arc<Aggregator>) -> ProgressStream {
    let (tx, rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let sink = Arc::new(EventSink {
        tx,
        finished: AtomicBool::new(false),
    });

    let token = cancel.clone();
    tokio::spawn(async move {
        let planned = aggregator.registry().list_hosts().len();
        sink.emit(ProgressEvent::Progress {
            message: format!("Listing log sources on {planned} hosts"),
            percent: 0,
        });

        let mut meter = ProgressMeter::new(planned);
        let progress_sink = Arc::clone(&sink);
        let scan = aggregator.scan_observed(
            Arc::new(SinkObserver(Arc::clone(&sink))),
            move |host, outcome| {
                let message = match outcome {
                    Ok(sources) => format!("{}: {} sources", host.display_name, sources.len()),
                    Err(err) => format!("{}: {}", host.display_name, err.summary()),
                };
                progress_sink.emit(ProgressEvent::Progress {
                    message,
                    percent: meter.advance(),
                });
            },
            Some(token.clone()),
        );

        match AssertUnwindSafe(scan).catch_unwind().await {
            Ok(_) if token.is_cancelled() => {
                tracing::debug!("progress stream cancelled by consumer");
                sink.finish(ProgressEvent::Error {
                    message: "Scan cancelled".to_string(),
                });
            }
            Ok(result) => sink.finish(ProgressEvent::Complete {
                total_sources: result.sources.len(),
                total_hosts: result.total_hosts(),
                successful_hosts: result.successful_hosts(),
                failed_hosts: result.failed_hosts,
            }),
            Err(_) => {
                tracing::error!("scan panicked while streaming");
                sink.finish(ProgressEvent::Error {
                    message: "Scan aborted unexpectedly".to_string(),
                });
            }
        }
    });

    ProgressStream {
        rx,
        done: false,
        _cancel: cancel.drop_guard(),
    }
}

// ---------------------------------------------------------------------------
// Consumer side
// ---------------------------------------------------------------------------

/// Ordered event feed of one scan.
///
/// Ends right after the first terminal event. If the producer goes away
/// without sending one, a synthetic `error` event is yielded instead.
pub struct ProgressStream {
    rx: mpsc::UnboundedReceiver<ProgressEvent>,
    done: bool,
    _cancel: DropGuard,
}

impl ProgressStream {
    /// Wrap an existing receiver, e.g. in tests. `cancel` fires on drop.
    pub fn from_receiver(rx: mpsc::UnboundedReceiver<ProgressEvent>, cancel: CancellationToken) -> Self {
        Self {
            rx,
            done: false,
            _cancel: cancel.drop_guard(),
        }
    }
}

impl Stream for ProgressStream {
    type Item = ProgressEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(event)) => {
                this.done = event.is_terminal();
                Poll::Ready(Some(event))
            }
            Poll::Ready(None) => {
                this.done = true;
                Poll::Ready(Some(ProgressEvent::Error {
                    message: "Scan ended without a result".to_string(),
                }))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
