use std::fmt;

use serde::{Deserialize, Serialize};

/// Tag selecting which handler delivers a message. Persisted as an integer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum OutboxKind {
    #[default]
    Undefined,
    Book,
    Author,
    /// Kinds registered by the embedding application.
    Custom(i32),
}

impl OutboxKind {
    pub fn as_i32(&self) -> i32 {
        match self {
            OutboxKind::Undefined => 0,
            OutboxKind::Book => 1,
            OutboxKind::Author => 2,
            OutboxKind::Custom(value) => *value,
        }
    }

    /// Conventional idempotency key for an event about `entity_id`:
    /// `<kind>_<entity_id>`.
    pub fn idempotency_key(&self, entity_id: impl fmt::Display) -> String {
        format!("{}_{}", self, entity_id)
    }
}

impl From<i32> for OutboxKind {
    fn from(value: i32) -> Self {
        match value {
            0 => OutboxKind::Undefined,
            1 => OutboxKind::Book,
            2 => OutboxKind::Author,
            other => OutboxKind::Custom(other),
        }
    }
}

impl From<OutboxKind> for i32 {
    fn from(kind: OutboxKind) -> Self {
        kind.as_i32()
    }
}

impl fmt::Display for OutboxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutboxKind::Undefined => write!(f, "undefined"),
            OutboxKind::Book => write!(f, "book"),
            OutboxKind::Author => write!(f, "author"),
            OutboxKind::Custom(value) => write!(f, "kind{}", value),
        }
    }
}

/// A claimed message as handed to a worker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboxMessage {
    pub idempotency_key: String,
    pub kind: OutboxKind,
    pub payload: Vec<u8>,
}

impl OutboxMessage {
    pub fn new(idempotency_key: impl Into<String>, kind: OutboxKind, payload: Vec<u8>) -> Self {
        Self {
            idempotency_key: idempotency_key.into(),
            kind,
            payload,
        }
    }

    /// Create a message with a bitcode (fast binary) payload.
    pub fn encode<T: Serialize>(
        idempotency_key: impl Into<String>,
        kind: OutboxKind,
        payload: &T,
    ) -> Result<Self, bitcode::Error> {
        let bytes = bitcode::serialize(payload)?;
        Ok(Self::new(idempotency_key, kind, bytes))
    }

    /// Decode a bitcode payload.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, bitcode::Error> {
        bitcode::deserialize(&self.payload)
    }

    /// Decode a JSON payload.
    pub fn decode_json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }

    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}
