use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use relay_outbox::{
    HashMapDatabase, ManualClock, OutboxKind, OutboxStatus, OutboxStore, Transactional,
};

fn seeded(clock: &ManualClock, count: usize) -> HashMapDatabase {
    let db = HashMapDatabase::with_clock(clock.clone());
    for id in 1..=count {
        db.enqueue(None, &OutboxKind::Book.idempotency_key(id), OutboxKind::Book, b"{}")
            .unwrap();
        clock.advance(Duration::from_millis(1));
    }
    db
}

#[test]
fn racing_producers_store_each_key_once() {
    let db = HashMapDatabase::new();

    thread::scope(|scope| {
        for producer in 0..8 {
            let db = &db;
            scope.spawn(move || {
                for id in 0..20 {
                    let payload = format!("{{\"producer\":{}}}", producer);
                    db.enqueue(
                        None,
                        &OutboxKind::Author.idempotency_key(id),
                        OutboxKind::Author,
                        payload.as_bytes(),
                    )
                    .unwrap();
                }
            });
        }
    });

    assert_eq!(db.len().unwrap(), 20);
    assert_eq!(db.count_by_status(OutboxStatus::Created).unwrap(), 20);
}

#[test]
fn concurrent_open_claims_are_disjoint() {
    let clock = ManualClock::default();
    let db = seeded(&clock, 40);
    let barrier = Arc::new(Barrier::new(4));

    let batches: Vec<Vec<String>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let db = &db;
                let barrier = barrier.clone();
                scope.spawn(move || {
                    let mut tx = db.begin().unwrap();
                    let claimed = db
                        .claim_batch(Some(&mut tx), 10, Duration::from_secs(30))
                        .unwrap();
                    // Hold every claim open until all four have claimed.
                    barrier.wait();
                    db.commit(tx).unwrap();
                    claimed
                        .into_iter()
                        .map(|message| message.idempotency_key)
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let mut seen = HashSet::new();
    for batch in &batches {
        assert_eq!(batch.len(), 10);
        for key in batch {
            assert!(seen.insert(key.clone()), "{} claimed twice", key);
        }
    }
    assert_eq!(seen.len(), 40);
    assert_eq!(db.count_by_status(OutboxStatus::InProgress).unwrap(), 40);
}

#[test]
fn abandoned_claim_is_recovered_after_ttl() {
    let clock = ManualClock::default();
    let db = seeded(&clock, 3);
    let ttl = Duration::from_secs(10);

    let first = db.claim_batch(None, 10, ttl).unwrap();
    assert_eq!(first.len(), 3);

    clock.advance(Duration::from_secs(10));
    assert!(db.claim_batch(None, 10, ttl).unwrap().is_empty());

    clock.advance(Duration::from_millis(1));
    let second = db.claim_batch(None, 10, ttl).unwrap();
    assert_eq!(second.len(), 3);

    db.mark_success(None, &["book_2".to_string()]).unwrap();
    assert_eq!(db.keys_by_status(OutboxStatus::Success).unwrap(), vec!["book_2".to_string()]);

    clock.advance(Duration::from_secs(60));
    let third = db.claim_batch(None, 10, ttl).unwrap();
    let keys: Vec<_> = third.into_iter().map(|m| m.idempotency_key).collect();
    assert_eq!(keys, vec!["book_1".to_string(), "book_3".to_string()]);
}

#[test]
fn business_rows_and_messages_commit_together() {
    let db = HashMapDatabase::new();

    let mut tx = db.begin().unwrap();
    db.put_row(Some(&mut tx), "book", "1", b"dune".to_vec()).unwrap();
    db.enqueue(Some(&mut tx), "book_1", OutboxKind::Book, b"{}").unwrap();
    assert!(db.get("book_1").unwrap().is_none());
    db.rollback(tx).unwrap();

    assert!(db.is_empty().unwrap());
    assert!(db.get_row(None, "book", "1").unwrap().is_none());

    let mut tx = db.begin().unwrap();
    db.put_row(Some(&mut tx), "book", "1", b"dune".to_vec()).unwrap();
    db.enqueue(Some(&mut tx), "book_1", OutboxKind::Book, b"{}").unwrap();
    db.commit(tx).unwrap();

    assert_eq!(db.get_row(None, "book", "1").unwrap(), Some(b"dune".to_vec()));
    assert_eq!(db.get("book_1").unwrap().unwrap().status, OutboxStatus::Created);
}
