use std::collections::HashSet;
use std::sync::Arc;
use std::time::SystemTime;

use crate::outbox::{OutboxRecord, OutboxStatus};

use super::database::{Shared, State};

/// A write staged by an open transaction, applied in order on commit.
#[derive(Debug, Clone)]
pub(super) enum Write {
    /// Insert-if-absent, mirroring `ON CONFLICT (idempotency_key) DO NOTHING`.
    Enqueue(OutboxRecord),
    Status {
        key: String,
        status: OutboxStatus,
        updated_at: SystemTime,
    },
    Row {
        table: String,
        id: String,
        value: Vec<u8>,
    },
}

/// Open transaction on a [`HashMapDatabase`](super::HashMapDatabase).
///
/// Writes stay private to the transaction until commit. Row locks taken by
/// claims and status updates are held until commit or rollback; dropping an
/// unfinished transaction rolls it back.
pub struct HashMapTransaction {
    pub(super) id: u64,
    pub(super) shared: Arc<Shared>,
    pub(super) writes: Vec<Write>,
    pub(super) locked: HashSet<String>,
    pub(super) active: bool,
}

impl HashMapTransaction {
    pub(super) fn new(id: u64, shared: Arc<Shared>) -> Self {
        Self {
            id,
            shared,
            writes: Vec::new(),
            locked: HashSet::new(),
            active: true,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Number of writes staged so far.
    pub fn pending_writes(&self) -> usize {
        self.writes.len()
    }

    pub(super) fn staged_inserts(&self) -> impl Iterator<Item = &OutboxRecord> {
        self.writes.iter().filter_map(|write| match write {
            Write::Enqueue(record) => Some(record),
            _ => None,
        })
    }

    pub(super) fn has_staged_insert(&self, key: &str) -> bool {
        self.staged_inserts()
            .any(|record| record.idempotency_key == key)
    }

    /// The record as this transaction sees it (its own status writes applied).
    pub(super) fn overlay(&self, record: &OutboxRecord) -> OutboxRecord {
        let mut record = record.clone();
        for write in &self.writes {
            if let Write::Status {
                key,
                status,
                updated_at,
            } = write
            {
                if *key == record.idempotency_key {
                    apply_status(&mut record, *status, *updated_at);
                }
            }
        }
        record
    }

    pub(super) fn staged_row(&self, table: &str, id: &str) -> Option<&[u8]> {
        self.writes.iter().rev().find_map(|write| match write {
            Write::Row {
                table: t,
                id: i,
                value,
            } if t == table && i == id => Some(value.as_slice()),
            _ => None,
        })
    }

    /// Drop every lock this transaction holds and mark it finished.
    pub(super) fn release(&mut self, state: &mut State) {
        for key in self.locked.drain() {
            if state.row_locks.get(&key) == Some(&self.id) {
                state.row_locks.remove(&key);
            }
        }
        self.writes.clear();
        self.active = false;
    }
}

impl Drop for HashMapTransaction {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        let shared = self.shared.clone();
        let mut state = shared
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        self.release(&mut state);
        drop(state);
        shared.released.notify_all();
    }
}

/// Forward-only status transition: nothing overwrites `Success` except
/// another `Success`.
pub(super) fn apply_status(record: &mut OutboxRecord, status: OutboxStatus, updated_at: SystemTime) {
    if record.status == OutboxStatus::Success && status != OutboxStatus::Success {
        return;
    }
    record.status = status;
    record.updated_at = updated_at;
}
