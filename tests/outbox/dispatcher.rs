use std::sync::Arc;
use std::thread;
use std::time::Duration;

use relay_outbox::{
    DispatchError, DispatchSettings, HandlerRegistry, HashMapDatabase, OutboxConfig,
    OutboxDispatcher, OutboxKind, OutboxStatus, OutboxStore, OutboxToggle,
};

use crate::support::{wait_until, Recorder};

fn settings(workers: usize) -> DispatchSettings {
    DispatchSettings {
        workers,
        batch_size: 7,
        poll_interval: Duration::from_millis(5),
        in_progress_ttl: Duration::from_secs(30),
    }
}

fn registry(recorder: &Recorder) -> Arc<HandlerRegistry> {
    let recorder = recorder.clone();
    Arc::new(
        HandlerRegistry::new()
            .handler(OutboxKind::Book, move |ctx, payload| recorder.handle(ctx, payload)),
    )
}

fn seed(db: &HashMapDatabase, count: usize) {
    for id in 1..=count {
        db.enqueue(None, &OutboxKind::Book.idempotency_key(id), OutboxKind::Book, b"{}")
            .unwrap();
    }
}

#[test]
fn pool_delivers_every_message_once() {
    let db = Arc::new(HashMapDatabase::new());
    seed(&db, 100);

    let recorder = Recorder::new();
    let dispatcher = OutboxDispatcher::start(
        db.clone(),
        registry(&recorder),
        OutboxToggle::new(true),
        settings(4),
    )
    .unwrap();
    assert_eq!(dispatcher.worker_count(), 4);

    assert!(wait_until(Duration::from_secs(5), || {
        db.count_by_status(OutboxStatus::Success).unwrap() == 100
    }));
    let stats = dispatcher.stop();

    assert_eq!(stats.delivered, 100);
    assert_eq!(stats.store_errors, 0);
    let attempts = recorder.attempts();
    assert_eq!(attempts.len(), 100);
    assert!(attempts.values().all(|&count| count == 1));
}

#[test]
fn messages_enqueued_while_running_are_picked_up() {
    let db = Arc::new(HashMapDatabase::new());
    let recorder = Recorder::new();
    let dispatcher = OutboxDispatcher::start(
        db.clone(),
        registry(&recorder),
        OutboxToggle::new(true),
        settings(2),
    )
    .unwrap();

    seed(&db, 10);
    assert!(wait_until(Duration::from_secs(5), || {
        recorder.deliveries().len() == 10
    }));
    dispatcher.stop();
}

#[test]
fn disabled_pool_idles_until_enabled() {
    let db = Arc::new(HashMapDatabase::new());
    seed(&db, 5);

    let recorder = Recorder::new();
    let toggle = OutboxToggle::new(false);
    let dispatcher =
        OutboxDispatcher::start(db.clone(), registry(&recorder), toggle.clone(), settings(2))
            .unwrap();

    thread::sleep(Duration::from_millis(100));
    assert_eq!(db.count_by_status(OutboxStatus::Created).unwrap(), 5);

    toggle.enable();
    assert!(wait_until(Duration::from_secs(5), || {
        db.count_by_status(OutboxStatus::Success).unwrap() == 5
    }));

    let stats = dispatcher.stop();
    assert!(stats.skipped_disabled > 0);
    assert_eq!(stats.delivered, 5);
}

#[test]
fn invalid_settings_are_rejected() {
    let db = Arc::new(HashMapDatabase::new());
    let recorder = Recorder::new();

    let err = OutboxDispatcher::start(
        db.clone(),
        registry(&recorder),
        OutboxToggle::default(),
        settings(0),
    )
    .err()
    .unwrap();
    assert!(matches!(err, DispatchError::InvalidSettings(_)));

    let err = OutboxDispatcher::start(
        db,
        registry(&recorder),
        OutboxToggle::default(),
        DispatchSettings {
            batch_size: 0,
            ..settings(1)
        },
    )
    .err()
    .unwrap();
    assert_eq!(err.to_string(), "invalid dispatch settings: batch size must be positive");
}

#[test]
fn config_drives_the_pool() {
    let config = OutboxConfig::from_lookup(|name| {
        let value = match name {
            "OUTBOX_ENABLED" => "true",
            "OUTBOX_WORKERS" => "3",
            "OUTBOX_BATCH_SIZE" => "2",
            "OUTBOX_WAIT_TIME_MS" => "5",
            "OUTBOX_IN_PROGRESS_TTL_MS" => "60000",
            _ => return None,
        };
        Some(value.to_string())
    })
    .unwrap();

    let db = Arc::new(HashMapDatabase::new());
    seed(&db, 9);

    let recorder = Recorder::new();
    let dispatcher = OutboxDispatcher::start(
        db.clone(),
        registry(&recorder),
        config.toggle(),
        config.dispatch_settings(),
    )
    .unwrap();
    assert_eq!(dispatcher.worker_count(), 3);

    assert!(wait_until(Duration::from_secs(5), || {
        db.count_by_status(OutboxStatus::Success).unwrap() == 9
    }));
    assert_eq!(dispatcher.stop().delivered, 9);
}
