use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::outbox::OutboxKind;

/// Per-delivery context handed to a handler alongside the raw payload.
///
/// The idempotency key lets a sink de-duplicate repeated deliveries of the
/// same logical event; the core only guarantees at-least-once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerContext {
    pub worker_id: usize,
    pub idempotency_key: String,
    pub kind: OutboxKind,
}

/// Error returned by a delivery function.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The payload could not be decoded into what the sink expects.
    #[error("decode failed: {0}")]
    DecodeFailed(String),
    /// The sink rejected the message.
    #[error("rejected: {0}")]
    Rejected(String),
    /// The sink could not be reached.
    #[error("sink unavailable: {0}")]
    Unavailable(String),
    /// The handler panicked.
    #[error("handler panicked: {0}")]
    Panicked(String),
    #[error("handler error: {0}")]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        HandlerError::DecodeFailed(err.to_string())
    }
}

impl From<bitcode::Error> for HandlerError {
    fn from(err: bitcode::Error) -> Self {
        HandlerError::DecodeFailed(err.to_string())
    }
}

/// No handler is available for a kind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("unsupported outbox kind: {0}")]
    UnsupportedKind(OutboxKind),
}

/// Delivery function: performs the external side effect for one payload.
pub type KindHandler =
    Arc<dyn Fn(&HandlerContext, &[u8]) -> Result<(), HandlerError> + Send + Sync>;

/// Maps a message kind to its delivery function.
pub trait HandlerResolver: Send + Sync {
    fn resolve(&self, kind: OutboxKind) -> Result<KindHandler, ResolveError>;
}

impl<F> HandlerResolver for F
where
    F: Fn(OutboxKind) -> Result<KindHandler, ResolveError> + Send + Sync,
{
    fn resolve(&self, kind: OutboxKind) -> Result<KindHandler, ResolveError> {
        self(kind)
    }
}

/// Flat kind -> handler table.
///
/// ```ignore
/// let registry = HandlerRegistry::new()
///     .handler(OutboxKind::Book, |_, payload| notify_book_service(payload))
///     .handler(OutboxKind::Author, |_, payload| notify_author_service(payload));
/// ```
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<OutboxKind, KindHandler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the delivery function for `kind`, replacing any previous one.
    pub fn handler<F>(mut self, kind: OutboxKind, handler: F) -> Self
    where
        F: Fn(&HandlerContext, &[u8]) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.handlers.insert(kind, Arc::new(handler));
        self
    }

    pub fn kinds(&self) -> Vec<OutboxKind> {
        let mut kinds: Vec<OutboxKind> = self.handlers.keys().copied().collect();
        kinds.sort_by_key(|kind| kind.as_i32());
        kinds
    }

    pub fn contains(&self, kind: OutboxKind) -> bool {
        self.handlers.contains_key(&kind)
    }
}

impl HandlerResolver for HandlerRegistry {
    fn resolve(&self, kind: OutboxKind) -> Result<KindHandler, ResolveError> {
        self.handlers
            .get(&kind)
            .cloned()
            .ok_or(ResolveError::UnsupportedKind(kind))
    }
}
