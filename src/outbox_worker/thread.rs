//! Pool of background outbox workers.

use std::io;
use std::sync::mpsc::{channel, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use crate::config::OutboxToggle;
use crate::outbox::OutboxStore;

use super::registry::HandlerResolver;
use super::worker::{OutboxWorker, WorkerStats};

/// Pool parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchSettings {
    pub workers: usize,
    pub batch_size: usize,
    /// Idle time before each cycle.
    pub poll_interval: Duration,
    pub in_progress_ttl: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            workers: 1,
            batch_size: 100,
            poll_interval: Duration::from_secs(1),
            in_progress_ttl: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid dispatch settings: {0}")]
    InvalidSettings(&'static str),
    #[error("cannot spawn outbox worker {worker}: {source}")]
    Spawn {
        worker: usize,
        #[source]
        source: io::Error,
    },
}

struct WorkerHandle {
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<WorkerStats>>,
}

/// A fixed pool of polling workers sharing one store.
///
/// Workers coordinate only through the store's claim step, so no in-process
/// lock is involved. Each worker loops: wait `poll_interval` (or until
/// stopped), run one cycle, check for stop. A batch in flight is always
/// finished and committed or rolled back before the worker exits.
///
/// ```ignore
/// let dispatcher = OutboxDispatcher::start(
///     Arc::new(db.clone()),
///     Arc::new(registry),
///     config.toggle(),
///     config.dispatch_settings(),
/// )?;
///
/// // ... later, on shutdown
/// let stats = dispatcher.stop();
/// ```
pub struct OutboxDispatcher {
    workers: Vec<WorkerHandle>,
}

impl OutboxDispatcher {
    /// Spawn `settings.workers` worker threads and return immediately.
    pub fn start<S, H>(
        store: Arc<S>,
        handlers: Arc<H>,
        toggle: OutboxToggle,
        settings: DispatchSettings,
    ) -> Result<Self, DispatchError>
    where
        S: OutboxStore + 'static,
        H: HandlerResolver + 'static,
    {
        if settings.workers == 0 {
            return Err(DispatchError::InvalidSettings("worker count must be positive"));
        }
        if settings.batch_size == 0 {
            return Err(DispatchError::InvalidSettings("batch size must be positive"));
        }

        let mut dispatcher = OutboxDispatcher {
            workers: Vec::with_capacity(settings.workers),
        };

        for id in 0..settings.workers {
            let worker = OutboxWorker::new(store.clone(), handlers.clone(), toggle.clone())
                .with_id(id)
                .with_batch_size(settings.batch_size)
                .with_in_progress_ttl(settings.in_progress_ttl);

            // On failure `dispatcher` drops here, which stops the workers
            // already spawned.
            let handle = spawn_worker(worker, settings.poll_interval)
                .map_err(|source| DispatchError::Spawn { worker: id, source })?;
            dispatcher.workers.push(handle);
        }

        info!(
            workers = settings.workers,
            batch_size = settings.batch_size,
            "outbox dispatcher started"
        );
        Ok(dispatcher)
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Signal every worker to stop without waiting.
    pub fn signal_stop(&self) {
        for worker in &self.workers {
            let _ = worker.stop_tx.send(());
        }
    }

    /// Signal every worker to stop, wait for them to finish their current
    /// cycle, and return their combined statistics.
    pub fn stop(mut self) -> WorkerStats {
        self.signal_stop();

        let mut total = WorkerStats::default();
        for (id, worker) in self.workers.iter_mut().enumerate() {
            if let Some(handle) = worker.handle.take() {
                match handle.join() {
                    Ok(stats) => total.merge(&stats),
                    Err(_) => warn!(worker = id, "outbox worker panicked"),
                }
            }
        }

        info!(
            delivered = total.delivered,
            failed = total.failed,
            "outbox dispatcher stopped"
        );
        total
    }
}

impl Drop for OutboxDispatcher {
    fn drop(&mut self) {
        // Don't join on drop - workers finish their current cycle and exit.
        self.signal_stop();
    }
}

fn spawn_worker<S, H>(
    worker: OutboxWorker<S, H>,
    poll_interval: Duration,
) -> io::Result<WorkerHandle>
where
    S: OutboxStore + 'static,
    H: HandlerResolver + 'static,
{
    let (stop_tx, stop_rx) = channel::<()>();

    let handle = thread::Builder::new()
        .name(format!("outbox-worker-{}", worker.id()))
        .spawn(move || {
            let mut stats = WorkerStats::default();

            loop {
                // Idle; a stop signal cuts the wait short.
                match stop_rx.recv_timeout(poll_interval) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => {}
                }

                worker.poll(&mut stats);

                match stop_rx.try_recv() {
                    Ok(()) | Err(TryRecvError::Disconnected) => break,
                    Err(TryRecvError::Empty) => {}
                }
            }

            stats
        })?;

    Ok(WorkerHandle {
        stop_tx,
        handle: Some(handle),
    })
}
