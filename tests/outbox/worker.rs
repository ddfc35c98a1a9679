use std::sync::Arc;
use std::time::Duration;

use relay_outbox::{
    HandlerRegistry, HashMapDatabase, ManualClock, OutboxKind, OutboxStatus, OutboxStore,
    OutboxToggle, OutboxWorker, StoreError, WorkerStats,
};

use crate::support::{FlakyStore, Recorder};

const TTL: Duration = Duration::from_secs(30);

fn registry(recorder: &Recorder) -> Arc<HandlerRegistry> {
    let books = recorder.clone();
    let authors = recorder.clone();
    Arc::new(
        HandlerRegistry::new()
            .handler(OutboxKind::Book, move |ctx, payload| books.handle(ctx, payload))
            .handler(OutboxKind::Author, move |ctx, payload| authors.handle(ctx, payload)),
    )
}

fn seed_books_and_authors(db: &HashMapDatabase, clock: &ManualClock) {
    for id in 1..=5 {
        db.enqueue(None, &OutboxKind::Book.idempotency_key(id), OutboxKind::Book, b"{}")
            .unwrap();
        clock.advance(Duration::from_millis(1));
        db.enqueue(None, &OutboxKind::Author.idempotency_key(id), OutboxKind::Author, b"{}")
            .unwrap();
        clock.advance(Duration::from_millis(1));
    }
}

/// Cycle until a cycle claims nothing.
fn drain<S: OutboxStore, H: relay_outbox::HandlerResolver>(
    worker: &OutboxWorker<S, H>,
) -> WorkerStats {
    let mut stats = WorkerStats::default();
    loop {
        let report = worker.run_cycle().unwrap().unwrap();
        stats.polls += 1;
        stats.delivered += report.delivered.len();
        stats.failed += report.failed;
        if report.claimed == 0 {
            return stats;
        }
    }
}

#[test]
fn failing_kind_does_not_block_other_kinds() {
    let clock = ManualClock::default();
    let db = Arc::new(HashMapDatabase::with_clock(clock.clone()));
    seed_books_and_authors(&db, &clock);

    let recorder = Recorder::new();
    recorder.reject(OutboxKind::Book);
    let worker = OutboxWorker::new(db.clone(), registry(&recorder), OutboxToggle::new(true))
        .with_batch_size(3)
        .with_in_progress_ttl(TTL);

    let stats = drain(&worker);
    assert_eq!(stats.delivered, 5);
    assert_eq!(stats.failed, 5);
    assert_eq!(db.count_by_status(OutboxStatus::Success).unwrap(), 5);
    assert_eq!(
        db.keys_by_status(OutboxStatus::InProgress).unwrap(),
        (1..=5).map(|id| format!("book_{}", id)).collect::<Vec<_>>()
    );

    recorder.accept_all();
    assert_eq!(drain(&worker).delivered, 0);

    clock.advance(TTL + Duration::from_millis(1));
    assert_eq!(drain(&worker).delivered, 5);
    assert_eq!(db.count_by_status(OutboxStatus::Success).unwrap(), 10);

    let attempts = recorder.attempts();
    assert_eq!(attempts["book_1"], 2);
    assert_eq!(attempts["author_1"], 1);
}

#[test]
fn toggle_is_read_every_cycle() {
    let clock = ManualClock::default();
    let db = Arc::new(HashMapDatabase::with_clock(clock.clone()));
    seed_books_and_authors(&db, &clock);

    let recorder = Recorder::new();
    let toggle = OutboxToggle::new(false);
    let worker = OutboxWorker::new(db.clone(), registry(&recorder), toggle.clone());

    assert!(worker.run_cycle().unwrap().is_none());
    assert_eq!(db.count_by_status(OutboxStatus::Created).unwrap(), 10);

    toggle.enable();
    let report = worker.run_cycle().unwrap().unwrap();
    assert_eq!(report.delivered.len(), 10);

    toggle.disable();
    assert!(worker.run_cycle().unwrap().is_none());
}

#[test]
fn claim_failure_rolls_back_without_delivering() {
    let clock = ManualClock::default();
    let store = Arc::new(FlakyStore::new(HashMapDatabase::with_clock(clock.clone())));
    seed_books_and_authors(store.database(), &clock);

    let recorder = Recorder::new();
    let worker = OutboxWorker::new(store.clone(), registry(&recorder), OutboxToggle::new(true));

    store.fail_claim(true);
    let err = worker.run_cycle().unwrap_err();
    assert_eq!(err, StoreError::Storage("claim refused".to_string()));
    assert!(recorder.deliveries().is_empty());
    assert_eq!(store.database().count_by_status(OutboxStatus::Created).unwrap(), 10);

    let mut stats = WorkerStats::default();
    worker.poll(&mut stats);
    assert_eq!(stats.store_errors, 1);

    store.fail_claim(false);
    worker.poll(&mut stats);
    assert_eq!(stats.delivered, 10);
}

#[test]
fn mark_failure_rolls_back_and_redelivers() {
    let clock = ManualClock::default();
    let store = Arc::new(FlakyStore::new(HashMapDatabase::with_clock(clock.clone())));
    seed_books_and_authors(store.database(), &clock);

    let recorder = Recorder::new();
    let worker = OutboxWorker::new(store.clone(), registry(&recorder), OutboxToggle::new(true))
        .with_batch_size(4);

    store.fail_mark(true);
    assert!(worker.run_cycle().is_err());
    assert_eq!(recorder.deliveries().len(), 4);
    // The claim was rolled back with the mark, so nothing waits on a TTL.
    assert_eq!(store.database().count_by_status(OutboxStatus::Created).unwrap(), 10);

    store.fail_mark(false);
    let report = worker.run_cycle().unwrap().unwrap();
    assert_eq!(report.delivered.len(), 4);
    assert_eq!(recorder.attempts()["book_1"], 2);

    let stats = drain(&worker);
    assert_eq!(stats.delivered, 6);
    assert_eq!(store.database().count_by_status(OutboxStatus::Success).unwrap(), 10);
}
