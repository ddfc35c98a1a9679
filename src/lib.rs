mod clock;
mod config;
mod hashmap;
mod library;
mod outbox;
mod outbox_worker;
mod transaction;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, OutboxConfig, OutboxToggle};
pub use hashmap::{HashMapDatabase, HashMapTransaction};
pub use library::{
    Author, AuthorRepository, Book, BookRepository, LibraryError, LibraryService,
};
pub use outbox::{OutboxKind, OutboxMessage, OutboxRecord, OutboxStatus, OutboxStore, StoreError};
pub use outbox_worker::{
    CycleReport, DispatchError, DispatchSettings, HandlerContext, HandlerError, HandlerRegistry,
    HandlerResolver, KindHandler, OutboxDispatcher, OutboxWorker, ResolveError, WorkerStats,
};
pub use transaction::{require_transaction, Transactional, TransactionError};

// Environment variable names read by `OutboxConfig::from_env`
pub use config::{
    ENV_BATCH_SIZE, ENV_ENABLED, ENV_IN_PROGRESS_TTL_MS, ENV_WAIT_TIME_MS, ENV_WORKERS,
};
