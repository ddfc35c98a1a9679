use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::OutboxToggle;
use crate::outbox::{OutboxMessage, OutboxStore, StoreError};

use super::registry::{HandlerContext, HandlerError, HandlerResolver};

/// Outcome of one committed cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Messages claimed this cycle.
    pub claimed: usize,
    /// Keys delivered and marked `Success`.
    pub delivered: Vec<String>,
    /// Messages whose handler returned an error (left for TTL reclaim).
    pub failed: usize,
    /// Messages with no handler for their kind (left for TTL reclaim).
    pub unresolved: usize,
}

/// Running totals for one worker.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WorkerStats {
    /// Cycles started (including disabled and failed ones).
    pub polls: usize,
    /// Cycles skipped because processing was disabled.
    pub skipped_disabled: usize,
    pub delivered: usize,
    pub failed: usize,
    pub unresolved: usize,
    /// Cycles rolled back because of a store error.
    pub store_errors: usize,
}

impl WorkerStats {
    pub fn merge(&mut self, other: &WorkerStats) {
        self.polls += other.polls;
        self.skipped_disabled += other.skipped_disabled;
        self.delivered += other.delivered;
        self.failed += other.failed;
        self.unresolved += other.unresolved;
        self.store_errors += other.store_errors;
    }
}

/// One polling worker: claim a batch, deliver each message, mark the
/// delivered subset done, all in one transaction.
pub struct OutboxWorker<S, H> {
    id: usize,
    store: Arc<S>,
    handlers: Arc<H>,
    toggle: OutboxToggle,
    batch_size: usize,
    in_progress_ttl: Duration,
}

impl<S, H> OutboxWorker<S, H>
where
    S: OutboxStore,
    H: HandlerResolver,
{
    pub fn new(store: Arc<S>, handlers: Arc<H>, toggle: OutboxToggle) -> Self {
        Self {
            id: 0,
            store,
            handlers,
            toggle,
            batch_size: 100,
            in_progress_ttl: Duration::from_secs(30),
        }
    }

    pub fn with_id(mut self, id: usize) -> Self {
        self.id = id;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_in_progress_ttl(mut self, ttl: Duration) -> Self {
        self.in_progress_ttl = ttl;
        self
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Run one cycle.
    ///
    /// Returns `Ok(None)` without touching the store when processing is
    /// disabled, `Ok(Some(report))` once the cycle committed, and `Err` when
    /// the claim or the final mark failed and the cycle was rolled back.
    pub fn run_cycle(&self) -> Result<Option<CycleReport>, StoreError> {
        if !self.toggle.is_enabled() {
            debug!(worker = self.id, "outbox processing disabled");
            return Ok(None);
        }

        let report: Result<CycleReport, StoreError> = self.store.with_transaction(None, |tx| {
            let messages = self
                .store
                .claim_batch(Some(&mut *tx), self.batch_size, self.in_progress_ttl)
                .inspect_err(|err| {
                    error!(worker = self.id, error = %err, "cannot fetch messages from outbox")
                })?;
            debug!(worker = self.id, size = messages.len(), "outbox messages fetched");

            let mut report = CycleReport {
                claimed: messages.len(),
                delivered: Vec::with_capacity(messages.len()),
                ..CycleReport::default()
            };

            for message in &messages {
                self.dispatch(message, &mut report);
            }

            self.store
                .mark_success(Some(&mut *tx), &report.delivered)
                .inspect_err(|err| {
                    error!(
                        worker = self.id,
                        error = %err,
                        "cannot mark outbox messages as processed"
                    )
                })?;
            if !report.delivered.is_empty() {
                info!(
                    worker = self.id,
                    size = report.delivered.len(),
                    "outbox messages marked as processed"
                );
            }

            Ok(report)
        });

        report.map(Some)
    }

    /// Run one cycle and fold its outcome into `stats`.
    pub fn poll(&self, stats: &mut WorkerStats) {
        stats.polls += 1;
        match self.run_cycle() {
            Ok(None) => stats.skipped_disabled += 1,
            Ok(Some(report)) => {
                stats.delivered += report.delivered.len();
                stats.failed += report.failed;
                stats.unresolved += report.unresolved;
            }
            Err(err) => {
                stats.store_errors += 1;
                error!(worker = self.id, error = %err, "outbox worker cycle failed");
            }
        }
    }

    fn dispatch(&self, message: &OutboxMessage, report: &mut CycleReport) {
        let key = message.idempotency_key.as_str();

        let handler = match self.handlers.resolve(message.kind) {
            Ok(handler) => handler,
            Err(err) => {
                error!(worker = self.id, key, kind = %message.kind, error = %err, "cannot resolve outbox handler");
                report.unresolved += 1;
                return;
            }
        };

        let context = HandlerContext {
            worker_id: self.id,
            idempotency_key: message.idempotency_key.clone(),
            kind: message.kind,
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(&context, &message.payload)))
            .unwrap_or_else(|panic| Err(HandlerError::Panicked(panic_message(panic.as_ref()))));

        match outcome {
            Ok(()) => report.delivered.push(message.idempotency_key.clone()),
            Err(err) => {
                warn!(worker = self.id, key, kind = %message.kind, error = %err, "outbox handler failed");
                report.failed += 1;
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
