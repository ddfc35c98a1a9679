use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use super::OutboxKind;

/// Lifecycle of an outbox row. Transitions only move forward:
/// `Created -> InProgress -> Success`, with `InProgress -> InProgress` when a
/// stale claim is taken over by another worker.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboxStatus {
    Created,
    InProgress,
    Success,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Created => "CREATED",
            OutboxStatus::InProgress => "IN_PROGRESS",
            OutboxStatus::Success => "SUCCESS",
        }
    }
}

/// Durable outbox row: `{idempotency_key, data, status, kind, updated_at}`.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct OutboxRecord {
    /// Insertion sequence, used to order rows that share an `updated_at`.
    pub seq: u64,
    pub idempotency_key: String,
    pub kind: OutboxKind,
    pub data: Vec<u8>,
    pub status: OutboxStatus,
    pub updated_at: SystemTime,
}

impl OutboxRecord {
    /// Whether a worker may claim this row at `now`.
    ///
    /// `Created` rows are always claimable. `InProgress` rows become
    /// claimable once their claim is older than `ttl` (strictly), which is how
    /// batches abandoned by a crashed worker get picked up again.
    pub fn is_claimable(&self, now: SystemTime, ttl: Duration) -> bool {
        match self.status {
            OutboxStatus::Created => true,
            OutboxStatus::InProgress => now
                .duration_since(self.updated_at)
                .map(|age| age > ttl)
                .unwrap_or(false),
            OutboxStatus::Success => false,
        }
    }
}
