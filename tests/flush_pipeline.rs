mod common;

use common::{controller_over, entry, ids, pipeline, record, FailingBuffer, RecordingGateway};
use std::sync::Arc;
use roadvision_hub::buffer::SharedBuffer;
use roadvision_hub::flush::FlushOutcome;
use roadvision_hub::telemetry::{QueueEntry, Record};
use tokio::sync::mpsc;
use tokio_test::assert_ok;

#[tokio::test]
async fn test_below_batch_size_never_persists() {
    let p = pipeline(5, RecordingGateway::new(1));

    for seq in 0..4 {
        let (len, outcome) = assert_ok!(p.controller.submit(entry(1, seq)).await);
        assert_eq!(len, seq as usize + 1);
        assert_eq!(outcome, FlushOutcome::NotReady);
    }

    assert_eq!(p.gateway.attempts(), 0);
    assert_eq!(p.buffer.len().await.unwrap(), 4);
}

#[tokio::test]
async fn test_full_batch_persists_once_and_drains_buffer() {
    let p = pipeline(5, RecordingGateway::new(1));

    for seq in 0..4 {
        p.controller.submit(entry(1, seq)).await.unwrap();
    }
    let (_, outcome) = p.controller.submit(entry(1, 4)).await.unwrap();

    assert!(outcome.is_persisted());
    let batches = p.gateway.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(
        batches[0],
        (0..5).map(|seq| record(1, seq)).collect::<Vec<Record>>()
    );
    assert_eq!(p.buffer.len().await.unwrap(), 0);

    let stats = p.controller.stats();
    assert_eq!(stats.flushes, 1);
    assert_eq!(stats.persisted_records, 5);
}

#[tokio::test]
async fn test_malformed_entry_restores_whole_claim() {
    let p = pipeline(3, RecordingGateway::new(1));

    p.buffer.insert(entry(1, 0)).await.unwrap();
    p.buffer.insert(QueueEntry::new("{not a record")).await.unwrap();
    let len = p.buffer.insert(entry(1, 2)).await.unwrap();

    let outcome = p.controller.flush_if_ready(len).await.unwrap();

    assert_eq!(outcome, FlushOutcome::Restored { invalid: 1 });
    assert_eq!(p.gateway.attempts(), 0);
    assert_eq!(
        p.buffer.claim(3).await.unwrap(),
        vec![entry(1, 0), QueueEntry::new("{not a record"), entry(1, 2)]
    );
    assert_eq!(p.controller.stats().invalid_entries, 1);
}

#[tokio::test]
async fn test_restored_entries_stay_ahead_of_new_inserts() {
    let p = pipeline(2, RecordingGateway::new(1));

    p.buffer.insert(QueueEntry::new("garbage")).await.unwrap();
    let (_, outcome) = p.controller.submit(entry(1, 1)).await.unwrap();
    assert_eq!(outcome, FlushOutcome::Restored { invalid: 1 });

    p.buffer.insert(entry(1, 2)).await.unwrap();
    assert_eq!(
        p.buffer.snapshot(),
        vec![QueueEntry::new("garbage"), entry(1, 1), entry(1, 2)]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_two_producers_share_one_batch() {
    let p = pipeline(10, RecordingGateway::new(1));

    let mut producers = Vec::new();
    for owner in [1, 2] {
        let controller = p.controller.clone();
        producers.push(tokio::spawn(async move {
            let mut outcomes = Vec::new();
            for seq in 0..5 {
                let (_, outcome) = controller.submit(entry(owner, seq)).await.unwrap();
                outcomes.push(outcome);
                tokio::task::yield_now().await;
            }
            outcomes
        }));
    }

    let mut persisted = 0;
    for producer in producers {
        persisted += producer
            .await
            .unwrap()
            .iter()
            .filter(|o| o.is_persisted())
            .count();
    }
    assert_eq!(persisted, 1);

    let batches = p.gateway.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 10);

    for owner in [1, 2] {
        let own: Vec<Record> = batches[0]
            .iter()
            .filter(|r| r.owner() == owner)
            .cloned()
            .collect();
        let expected: Vec<Record> = (0..5).map(|seq| record(owner, seq)).collect();
        assert_eq!(own, expected, "producer {} order broken", owner);
    }
    assert_eq!(p.buffer.len().await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_flushes_claim_batch_once() {
    let p = pipeline(4, RecordingGateway::new(1));
    for seq in 0..4 {
        p.buffer.insert(entry(1, seq)).await.unwrap();
    }

    let a = p.controller.clone();
    let b = p.controller.clone();
    let (first, second) = tokio::join!(
        tokio::spawn(async move { a.flush_if_ready(4).await.unwrap() }),
        tokio::spawn(async move { b.flush_if_ready(4).await.unwrap() }),
    );
    let outcomes = [first.unwrap(), second.unwrap()];

    assert_eq!(outcomes.iter().filter(|o| o.is_persisted()).count(), 1);
    assert!(outcomes.contains(&FlushOutcome::Raced));
    assert_eq!(p.gateway.batches().len(), 1);
    assert_eq!(p.controller.stats().raced_claims, 1);
}

#[tokio::test]
async fn test_store_failure_retries_then_succeeds() {
    let p = pipeline(2, RecordingGateway::failing(1, 1));

    p.controller.submit(entry(1, 0)).await.unwrap();
    let (_, outcome) = p.controller.submit(entry(1, 1)).await.unwrap();

    assert!(outcome.is_persisted());
    assert_eq!(p.gateway.attempts(), 2);
    assert_eq!(p.controller.stats().gateway_failures, 1);
    assert_eq!(p.buffer.dead_letter_len().await.unwrap(), 0);
}

#[tokio::test]
async fn test_persistent_store_failure_dead_letters_batch() {
    let p = pipeline(2, RecordingGateway::failing(1, usize::MAX));

    p.controller.submit(entry(1, 0)).await.unwrap();
    let (_, outcome) = p.controller.submit(entry(1, 1)).await.unwrap();

    assert_eq!(outcome, FlushOutcome::DeadLettered { count: 2 });
    // First attempt plus two retries
    assert_eq!(p.gateway.attempts(), 3);
    assert_eq!(p.buffer.len().await.unwrap(), 0);
    assert_eq!(
        p.buffer.take_dead_letters(10).await.unwrap(),
        vec![entry(1, 0), entry(1, 1)]
    );
    assert_eq!(p.controller.stats().dead_lettered, 2);
}

#[tokio::test]
async fn test_batch_fans_out_to_matching_owners_only() {
    let p = pipeline(2, RecordingGateway::new(10));

    let (tx1, mut rx1) = mpsc::channel(4);
    let (tx2, mut rx2) = mpsc::channel(4);
    let (tx3, mut rx3) = mpsc::channel(4);
    p.registry.register(1, tx1);
    p.registry.register(2, tx2);
    p.registry.register(3, tx3);

    p.controller.submit(entry(1, 0)).await.unwrap();
    let (_, outcome) = p.controller.submit(entry(2, 1)).await.unwrap();

    match outcome {
        FlushOutcome::Persisted { records, report } => {
            assert_eq!(records.iter().map(|r| r.id).collect::<Vec<_>>(), vec![10, 11]);
            assert_eq!(report.groups, 2);
            assert_eq!(report.deliveries, 2);
        }
        other => panic!("expected persisted batch, got {:?}", other),
    }

    assert_eq!(ids(&rx1.recv().await.unwrap()), vec![10]);
    assert_eq!(ids(&rx2.recv().await.unwrap()), vec![11]);
    assert!(rx3.try_recv().is_err());
}

#[tokio::test]
async fn test_disconnected_subscriber_does_not_break_dispatch() {
    let p = pipeline(1, RecordingGateway::new(1));

    let (gone_tx, gone_rx) = mpsc::channel(4);
    let (live_tx, mut live_rx) = mpsc::channel(4);
    let (other_tx, mut other_rx) = mpsc::channel(4);
    p.registry.register(1, gone_tx);
    p.registry.register(1, live_tx);
    p.registry.register(2, other_tx);
    drop(gone_rx);

    p.controller.submit(entry(1, 0)).await.unwrap();
    p.controller.submit(entry(2, 1)).await.unwrap();

    assert_eq!(ids(&live_rx.recv().await.unwrap()), vec![1]);
    assert_eq!(ids(&other_rx.recv().await.unwrap()), vec![2]);
    assert_eq!(p.registry.lookup(1).len(), 1);
    assert_eq!(p.registry.subscriber_count(), 2);
}

#[tokio::test]
async fn test_records_persisted_while_unwatched_are_not_replayed() {
    let p = pipeline(1, RecordingGateway::new(1));

    p.controller.submit(entry(4, 0)).await.unwrap();

    let (tx, mut rx) = mpsc::channel(4);
    p.registry.register(4, tx);
    p.controller.submit(entry(4, 1)).await.unwrap();

    assert_eq!(ids(&rx.recv().await.unwrap()), vec![2]);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_failed_restore_parks_claim_in_dead_letters() {
    let buffer = Arc::new(FailingBuffer::new(true, false));
    let gateway = Arc::new(RecordingGateway::new(1));
    let controller = controller_over(buffer.clone(), 3, gateway.clone());

    buffer.insert(entry(1, 0)).await.unwrap();
    buffer.insert(QueueEntry::new("garbage")).await.unwrap();
    let len = buffer.insert(entry(1, 2)).await.unwrap();

    let outcome = controller.flush_if_ready(len).await.unwrap();

    assert_eq!(outcome, FlushOutcome::DeadLettered { count: 3 });
    assert_eq!(gateway.attempts(), 0);
    assert_eq!(buffer.len().await.unwrap(), 0);
    assert_eq!(
        buffer.take_dead_letters(10).await.unwrap(),
        vec![entry(1, 0), QueueEntry::new("garbage"), entry(1, 2)]
    );
    assert_eq!(controller.stats().dead_lettered, 3);
}

#[tokio::test]
async fn test_failed_dead_letter_after_store_failure_is_reported() {
    let buffer = Arc::new(FailingBuffer::new(false, true));
    let gateway = Arc::new(RecordingGateway::failing(1, usize::MAX));
    let controller = controller_over(buffer.clone(), 2, gateway.clone());

    controller.submit(entry(1, 0)).await.unwrap();
    let result = controller.submit(entry(1, 1)).await;

    assert!(result.is_err());
    assert_eq!(gateway.attempts(), 3);
    assert_eq!(controller.stats().dead_lettered, 0);
}
