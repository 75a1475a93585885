//! Bounded-concurrency dispatch of entries to workers.
//!
//! Workers run as futures on the calling task: they interleave at I/O
//! suspension points instead of occupying threads, and at most
//! `max_workers` of them exist at any instant.

use std::sync::atomic::{AtomicUsize, Ordering};

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tokio_util::sync::CancellationToken;

use super::report::{ExtractionReport, WorkerResult};
use super::worker::Worker;
use crate::io::ReadAt;
use crate::options::ExtractOptions;
use crate::zip::ArchiveEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    /// Entries remain in the queue.
    Dispatching,
    /// Queue empty or closed; waiting for in-flight workers.
    Draining,
    Completed,
    /// Dispatch stopped early through fail-fast or cancellation.
    Failed,
}

/// Counts running extractions and remembers the maximum.
#[derive(Debug, Default)]
struct InFlightGauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

struct InFlightGuard<'a>(&'a InFlightGauge);

impl InFlightGauge {
    fn enter(&self) -> InFlightGuard<'_> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        InFlightGuard(self)
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct Scheduler<'a, R: ReadAt + ?Sized> {
    worker: Worker<'a, R>,
    max_workers: usize,
    fail_fast: bool,
    cancel: Option<&'a CancellationToken>,
    state: SchedulerState,
    gauge: InFlightGauge,
}

impl<'a, R: ReadAt + ?Sized> Scheduler<'a, R> {
    pub fn new(worker: Worker<'a, R>, options: &'a ExtractOptions) -> Self {
        Self {
            worker,
            max_workers: options.workers(),
            fail_fast: options.fail_fast,
            cancel: options.cancel.as_ref(),
            state: SchedulerState::Idle,
            gauge: InFlightGauge::default(),
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Run every entry and collect the outcome.
    ///
    /// A failing entry never cancels its siblings. With fail-fast, entries
    /// still queued after a failure are skipped; running ones finish.
    pub async fn run(&mut self, entries: &[ArchiveEntry]) -> ExtractionReport {
        let mut report = ExtractionReport::default();
        let mut queue = entries.iter();
        let mut stopped = false;
        let mut in_flight = FuturesUnordered::new();

        transition(&mut self.state, SchedulerState::Dispatching);
        let worker = &self.worker;
        let gauge = &self.gauge;

        loop {
            while !stopped && in_flight.len() < self.max_workers {
                if self.cancel.is_some_and(|t| t.is_cancelled()) {
                    tracing::debug!("cancelled, closing the queue");
                    stopped = true;
                    break;
                }
                let Some(entry) = queue.next() else { break };
                in_flight.push(async move {
                    let _guard = gauge.enter();
                    worker.extract(entry).await
                });
            }

            if self.state == SchedulerState::Dispatching && (stopped || queue.len() == 0) {
                transition(&mut self.state, SchedulerState::Draining);
            }

            let Some(result): Option<WorkerResult> = in_flight.next().await else {
                break;
            };
            if result.outcome.is_err() && self.fail_fast && !stopped {
                tracing::debug!(entry = %result.name, "fail-fast, closing the queue");
                stopped = true;
            }
            report.record(result);
        }

        drop(in_flight);
        report.skipped = queue.map(|e| e.name.clone()).collect();
        report.peak_in_flight = self.gauge.peak.load(Ordering::SeqCst);
        report.sort();

        let last = if stopped {
            SchedulerState::Failed
        } else {
            SchedulerState::Completed
        };
        transition(&mut self.state, last);
        report
    }
}

fn transition(state: &mut SchedulerState, next: SchedulerState) {
    tracing::trace!(from = ?*state, to = ?next, "scheduler state");
    *state = next;
}
