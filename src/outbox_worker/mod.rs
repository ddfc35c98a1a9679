//! Outbox workers.
//!
//! - `HandlerRegistry` / `HandlerResolver` - map a message kind to its
//!   delivery function
//! - `OutboxWorker` - one claim / deliver / mark cycle in a single
//!   transaction
//! - `OutboxDispatcher` - a fixed pool of background worker threads
//!
//! Failures are absorbed per message: a handler error or an unknown kind
//! leaves the message `InProgress`, and it is claimed again once the
//! in-progress TTL elapses. There is no attempt limit.

mod registry;
mod thread;
mod worker;

pub use registry::{
    HandlerContext, HandlerError, HandlerRegistry, HandlerResolver, KindHandler, ResolveError,
};
pub use thread::{DispatchError, DispatchSettings, OutboxDispatcher};
pub use worker::{CycleReport, OutboxWorker, WorkerStats};
