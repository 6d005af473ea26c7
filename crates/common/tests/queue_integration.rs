//! Integration tests for the bounded work queue
//!
//! Covers FIFO order, exactly-once delivery across many producers and
//! consumers, backpressure, and close-then-drain shutdown.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use resilex_common::observability::{counters, EventKind, InMemoryMetrics, Observer};
use resilex_common::sync::{TryPutError, WaitLimit, WorkQueue};
use resilex_common::testing::RecordingSink;
use resilex_common::ResilienceError;
use tokio_util::sync::CancellationToken;

/// Validates per-producer FIFO order and exactly-once delivery.
///
/// # Test Steps
/// 1. Four producers each enqueue 250 `(producer, seq)` pairs into a queue of
///    capacity 16
/// 2. Four consumers drain until the queue reports closed
/// 3. Every pair arrives exactly once and each producer's sequence numbers
///    arrive in increasing order within each consumer
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_producers_many_consumers_exactly_once() {
    let queue = WorkQueue::new(16).expect("valid queue");

    let consumers: Vec<_> = (0..4)
        .map(|_| {
            let queue = queue.clone();
            tokio::spawn(async move {
                let mut received = Vec::new();
                while let Ok(item) = queue.take().await {
                    received.push(item);
                }
                received
            })
        })
        .collect();

    let producers: Vec<_> = (0..4u32)
        .map(|producer| {
            let queue = queue.clone();
            tokio::spawn(async move {
                for seq in 0..250u32 {
                    queue.put((producer, seq)).await.expect("queue open");
                }
            })
        })
        .collect();

    for producer in producers {
        producer.await.expect("producer task");
    }
    queue.close();

    let mut seen: HashMap<(u32, u32), usize> = HashMap::new();
    for consumer in consumers {
        let received = consumer.await.expect("consumer task");
        let mut last_seq: HashMap<u32, u32> = HashMap::new();
        for (producer, seq) in received {
            if let Some(previous) = last_seq.insert(producer, seq) {
                assert!(seq > previous, "producer {producer} reordered: {previous} then {seq}");
            }
            *seen.entry((producer, seq)).or_default() += 1;
        }
    }

    assert_eq!(seen.len(), 1000);
    assert!(seen.values().all(|&count| count == 1), "an item was delivered twice");

    let stats = queue.stats();
    assert_eq!(stats.produced, 1000);
    assert_eq!(stats.consumed, 1000);
    assert_eq!(stats.in_flight(), 0);
}

#[tokio::test]
async fn test_put_blocks_until_take_makes_room() {
    let queue = WorkQueue::new(1).expect("valid queue");
    queue.put("first").await.expect("room");

    let producer_queue = queue.clone();
    let producer = tokio::spawn(async move { producer_queue.put("second").await });

    tokio::task::yield_now().await;
    assert!(!producer.is_finished());
    assert_eq!(queue.len(), 1);

    assert_eq!(queue.take().await.expect("buffered"), "first");
    producer.await.expect("producer task").expect("put completes");
    assert_eq!(queue.take().await.expect("buffered"), "second");
}

/// Validates close semantics end to end.
///
/// Assertions:
/// - Puts after close fail and are counted as dropped.
/// - Buffered items are still delivered in order.
/// - Takes on a closed, drained queue fail with `QueueClosed`.
#[tokio::test]
async fn test_close_then_drain() {
    let sink = Arc::new(RecordingSink::new());
    let metrics = Arc::new(InMemoryMetrics::new());
    let queue = WorkQueue::with_observer(
        4,
        Observer::noop().with_sink(sink.clone()).with_metrics(metrics.clone()),
    )
    .expect("valid queue");

    for i in 0..3 {
        queue.put(i).await.expect("queue open");
    }
    queue.close();

    assert!(matches!(queue.put(3).await, Err(ResilienceError::QueueClosed)));
    assert_eq!(queue.try_put(4), Err(TryPutError::Closed(4)));

    let drained: Vec<_> = [queue.take().await, queue.take().await, queue.take().await]
        .into_iter()
        .map(|item| item.expect("buffered item"))
        .collect();
    assert_eq!(drained, vec![0, 1, 2]);
    assert!(matches!(queue.take().await, Err(ResilienceError::QueueClosed)));

    assert_eq!(sink.count(EventKind::QueueClosed), 1);
    assert_eq!(sink.count(EventKind::ItemDropped), 1);
    assert_eq!(metrics.get(counters::QUEUE_ITEMS_DROPPED_TOTAL), 1);
    assert!(queue.stats().closed);
}

#[tokio::test]
async fn test_take_cancelled_by_token() {
    let queue = WorkQueue::<u8>::new(2).expect("valid queue");
    let token = CancellationToken::new();
    token.cancel();

    let result = queue.take_within(&WaitLimit::cancel(token)).await;
    assert!(matches!(result, Err(ResilienceError::Cancelled)));

    queue.put(1).await.expect("queue still usable");
    assert_eq!(queue.take().await.expect("buffered"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_put_timeout_on_full_queue() {
    let queue = WorkQueue::new(1).expect("valid queue");
    queue.put(1u32).await.expect("room");

    let result = queue.put_timeout(2, Duration::from_millis(50)).await;
    assert!(matches!(result, Err(ResilienceError::Timeout { timeout }) if timeout == Duration::from_millis(50)));
    assert_eq!(queue.len(), 1);
}
