use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::outbox::{
    OutboxKind, OutboxMessage, OutboxRecord, OutboxStatus, OutboxStore, StoreError,
};
use crate::transaction::{Transactional, TransactionError};

use super::transaction::{apply_status, HashMapTransaction, Write};

#[derive(Default)]
pub(super) struct State {
    pub(super) outbox: HashMap<String, OutboxRecord>,
    pub(super) tables: HashMap<String, BTreeMap<String, Vec<u8>>>,
    /// Outbox row key -> id of the transaction holding its lock.
    pub(super) row_locks: HashMap<String, u64>,
    /// Waiting transaction id -> id of the transaction holding the lock it
    /// waits for.
    waits_for: HashMap<u64, u64>,
    sequences: HashMap<String, u64>,
    next_seq: u64,
    next_tx: u64,
}

impl State {
    /// Whether `waiter` is blocked, directly or through a chain of other
    /// waiters, on `target`.
    fn waits_on(&self, waiter: u64, target: u64) -> bool {
        let mut current = waiter;
        // A chain can't be longer than the number of waiters.
        for _ in 0..=self.waits_for.len() {
            match self.waits_for.get(&current) {
                Some(&next) if next == target => return true,
                Some(&next) => current = next,
                None => return false,
            }
        }
        false
    }
}

pub(super) struct Shared {
    pub(super) state: Mutex<State>,
    pub(super) released: Condvar,
}

/// In-process transactional database holding the outbox table and any
/// number of business tables.
///
/// Cloning yields another handle to the same storage, so the database can be
/// shared between producers and worker threads.
///
/// - Writes are staged per transaction and applied atomically on commit.
/// - `claim_batch` locks the rows it selects and skips rows locked by other
///   open transactions (`FOR UPDATE SKIP LOCKED`).
/// - `mark_success` waits for rows locked by other open transactions.
/// - Sequences (`next_id`) are not transactional, like database sequences.
#[derive(Clone)]
pub struct HashMapDatabase {
    shared: Arc<Shared>,
    clock: Arc<dyn Clock>,
}

impl HashMapDatabase {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    pub fn with_clock(clock: impl Clock + 'static) -> Self {
        HashMapDatabase {
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                released: Condvar::new(),
            }),
            clock: Arc::new(clock),
        }
    }

    fn state(&self, operation: &'static str) -> Result<MutexGuard<'_, State>, StoreError> {
        self.shared
            .state
            .lock()
            .map_err(|_| StoreError::LockPoisoned(operation))
    }

    fn check_owner(&self, tx: &HashMapTransaction) -> Result<(), TransactionError> {
        if !Arc::ptr_eq(&tx.shared, &self.shared) {
            return Err(TransactionError::Foreign(tx.id));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Outbox inspection
    // ------------------------------------------------------------------

    /// Committed state of one outbox row.
    pub fn get(&self, idempotency_key: &str) -> Result<Option<OutboxRecord>, StoreError> {
        let state = self.state("outbox read")?;
        Ok(state.outbox.get(idempotency_key).cloned())
    }

    /// Number of committed outbox rows.
    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.state("outbox read")?.outbox.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    pub fn count_by_status(&self, status: OutboxStatus) -> Result<usize, StoreError> {
        let state = self.state("outbox read")?;
        Ok(state
            .outbox
            .values()
            .filter(|record| record.status == status)
            .count())
    }

    /// Committed keys with the given status, sorted.
    pub fn keys_by_status(&self, status: OutboxStatus) -> Result<Vec<String>, StoreError> {
        let state = self.state("outbox read")?;
        let mut keys: Vec<String> = state
            .outbox
            .values()
            .filter(|record| record.status == status)
            .map(|record| record.idempotency_key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    // ------------------------------------------------------------------
    // Business tables
    // ------------------------------------------------------------------

    /// Next value of the named sequence, starting at 1.
    pub fn next_id(&self, sequence: &str) -> Result<u64, StoreError> {
        let mut state = self.state("sequence")?;
        let value = state.sequences.entry(sequence.to_string()).or_insert(0);
        *value += 1;
        Ok(*value)
    }

    /// Insert or replace a row in `table`.
    pub fn put_row(
        &self,
        tx: Option<&mut HashMapTransaction>,
        table: &str,
        id: &str,
        value: Vec<u8>,
    ) -> Result<(), StoreError> {
        self.with_transaction(tx, |tx| {
            self.check_owner(tx)?;
            tx.writes.push(Write::Row {
                table: table.to_string(),
                id: id.to_string(),
                value,
            });
            Ok(())
        })
    }

    /// Read a row. With a transaction, that transaction's own writes are
    /// visible; without one only committed rows are.
    pub fn get_row(
        &self,
        tx: Option<&HashMapTransaction>,
        table: &str,
        id: &str,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        if let Some(tx) = tx {
            self.check_owner(tx)?;
            if let Some(value) = tx.staged_row(table, id) {
                return Ok(Some(value.to_vec()));
            }
        }
        let state = self.state("row read")?;
        Ok(state
            .tables
            .get(table)
            .and_then(|rows| rows.get(id))
            .cloned())
    }

    /// All committed rows of `table`, ordered by id.
    pub fn rows(&self, table: &str) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        let state = self.state("row read")?;
        Ok(state
            .tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .map(|(id, value)| (id.clone(), value.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    // ------------------------------------------------------------------
    // Outbox operations on an explicit transaction
    // ------------------------------------------------------------------

    fn enqueue_in(
        &self,
        tx: &mut HashMapTransaction,
        idempotency_key: &str,
        kind: OutboxKind,
        payload: &[u8],
    ) -> Result<(), StoreError> {
        self.check_owner(tx)?;
        let mut state = self.state("enqueue")?;

        if state.outbox.contains_key(idempotency_key) || tx.has_staged_insert(idempotency_key) {
            debug!(key = idempotency_key, "outbox message already enqueued");
            return Ok(());
        }

        state.next_seq += 1;
        let seq = state.next_seq;
        drop(state);

        tx.writes.push(Write::Enqueue(OutboxRecord {
            seq,
            idempotency_key: idempotency_key.to_string(),
            kind,
            data: payload.to_vec(),
            status: OutboxStatus::Created,
            updated_at: self.clock.now(),
        }));
        Ok(())
    }

    fn claim_in(
        &self,
        tx: &mut HashMapTransaction,
        limit: usize,
        in_progress_ttl: Duration,
    ) -> Result<Vec<OutboxMessage>, StoreError> {
        self.check_owner(tx)?;
        if limit == 0 {
            return Ok(Vec::new());
        }

        let now = self.clock.now();
        let mut state = self.state("claim")?;

        let mut candidates: Vec<OutboxRecord> = state
            .outbox
            .values()
            .chain(
                tx.staged_inserts()
                    .filter(|record| !state.outbox.contains_key(&record.idempotency_key)),
            )
            .filter(|record| match state.row_locks.get(&record.idempotency_key) {
                Some(owner) => *owner == tx.id,
                None => true,
            })
            .map(|record| tx.overlay(record))
            .filter(|record| record.is_claimable(now, in_progress_ttl))
            .collect();

        candidates.sort_by(|a, b| a.updated_at.cmp(&b.updated_at).then(a.seq.cmp(&b.seq)));
        candidates.truncate(limit);

        for record in &candidates {
            state
                .row_locks
                .insert(record.idempotency_key.clone(), tx.id);
            tx.locked.insert(record.idempotency_key.clone());
        }
        drop(state);

        let mut claimed = Vec::with_capacity(candidates.len());
        for record in candidates {
            tx.writes.push(Write::Status {
                key: record.idempotency_key.clone(),
                status: OutboxStatus::InProgress,
                updated_at: now,
            });
            claimed.push(OutboxMessage::new(record.idempotency_key, record.kind, record.data));
        }

        debug!(tx = tx.id, size = claimed.len(), "outbox batch claimed");
        Ok(claimed)
    }

    fn mark_success_in(
        &self,
        tx: &mut HashMapTransaction,
        keys: &[String],
    ) -> Result<(), StoreError> {
        self.check_owner(tx)?;
        if keys.is_empty() {
            return Ok(());
        }

        let now = self.clock.now();
        // Sorted so that two updaters lock overlapping rows in the same order.
        let keys: BTreeSet<&String> = keys.iter().collect();
        let mut state = self.state("mark success")?;

        for key in keys {
            loop {
                let holder = match state.row_locks.get(key.as_str()) {
                    Some(owner) if *owner != tx.id => *owner,
                    _ => break,
                };
                if state.waits_on(holder, tx.id) {
                    state.waits_for.remove(&tx.id);
                    warn!(tx = tx.id, holder, key = key.as_str(), "outbox row lock deadlock");
                    return Err(StoreError::Deadlock { tx: tx.id, holder });
                }
                state.waits_for.insert(tx.id, holder);
                state = self
                    .shared
                    .released
                    .wait(state)
                    .map_err(|_| StoreError::LockPoisoned("mark success"))?;
            }
            state.waits_for.remove(&tx.id);

            if !state.outbox.contains_key(key.as_str()) && !tx.has_staged_insert(key) {
                continue;
            }

            state.row_locks.insert(key.clone(), tx.id);
            tx.locked.insert(key.clone());
            tx.writes.push(Write::Status {
                key: key.clone(),
                status: OutboxStatus::Success,
                updated_at: now,
            });
        }

        Ok(())
    }
}

impl Default for HashMapDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl Transactional for HashMapDatabase {
    type Transaction = HashMapTransaction;

    fn begin(&self) -> Result<HashMapTransaction, TransactionError> {
        let mut state = self
            .shared
            .state
            .lock()
            .map_err(|_| TransactionError::LockPoisoned("begin"))?;
        state.next_tx += 1;
        Ok(HashMapTransaction::new(state.next_tx, self.shared.clone()))
    }

    fn commit(&self, mut tx: HashMapTransaction) -> Result<(), TransactionError> {
        self.check_owner(&tx)?;
        let mut state = self
            .shared
            .state
            .lock()
            .map_err(|_| TransactionError::LockPoisoned("commit"))?;

        for write in tx.writes.drain(..) {
            match write {
                Write::Enqueue(record) => {
                    state
                        .outbox
                        .entry(record.idempotency_key.clone())
                        .or_insert(record);
                }
                Write::Status {
                    key,
                    status,
                    updated_at,
                } => {
                    if let Some(record) = state.outbox.get_mut(&key) {
                        apply_status(record, status, updated_at);
                    }
                }
                Write::Row { table, id, value } => {
                    state.tables.entry(table).or_default().insert(id, value);
                }
            }
        }

        tx.release(&mut state);
        drop(state);
        self.shared.released.notify_all();
        Ok(())
    }

    fn rollback(&self, mut tx: HashMapTransaction) -> Result<(), TransactionError> {
        self.check_owner(&tx)?;
        let mut state = self
            .shared
            .state
            .lock()
            .map_err(|_| TransactionError::LockPoisoned("rollback"))?;
        tx.release(&mut state);
        drop(state);
        self.shared.released.notify_all();
        Ok(())
    }
}

impl OutboxStore for HashMapDatabase {
    fn enqueue(
        &self,
        tx: Option<&mut HashMapTransaction>,
        idempotency_key: &str,
        kind: OutboxKind,
        payload: &[u8],
    ) -> Result<(), StoreError> {
        self.with_transaction(tx, |tx| self.enqueue_in(tx, idempotency_key, kind, payload))
    }

    fn claim_batch(
        &self,
        tx: Option<&mut HashMapTransaction>,
        limit: usize,
        in_progress_ttl: Duration,
    ) -> Result<Vec<OutboxMessage>, StoreError> {
        self.with_transaction(tx, |tx| self.claim_in(tx, limit, in_progress_ttl))
    }

    fn mark_success(
        &self,
        tx: Option<&mut HashMapTransaction>,
        keys: &[String],
    ) -> Result<(), StoreError> {
        self.with_transaction(tx, |tx| self.mark_success_in(tx, keys))
    }
}
