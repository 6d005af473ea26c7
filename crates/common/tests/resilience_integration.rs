//! Integration tests for the resilience module
//!
//! Tests retry backoff and exhaustion, circuit breaker state transitions, and
//! the composed executor and worker pool against scripted failure scenarios.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use resilex_common::observability::{counters, EventKind, InMemoryMetrics, Observer};
use resilex_common::resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, ExecutorConfig, ResilientExecutor,
    RetryConfig, RetryPolicy, WorkerPool,
};
use resilex_common::sync::PoolConfig;
use resilex_common::testing::RecordingSink;
use resilex_common::{MockClock, ResilienceError};

/// Custom error type for testing
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
struct TestError {
    message: String,
}

impl TestError {
    fn new(message: &str) -> Self {
        Self { message: message.to_string() }
    }
}

/// Validates the documented backoff schedule and exhaustion semantics.
///
/// # Test Steps
/// 1. Configure `max_attempts = 4`, `base_delay = 100ms` on a mock clock
/// 2. Run an operation that always fails
/// 3. Verify exactly 4 invocations and waits of 100ms, 200ms, 400ms
/// 4. Verify the error is `RetriesExhausted` carrying the last failure
#[tokio::test]
async fn test_retry_backoff_growth_and_exhaustion() {
    let clock = MockClock::new();
    let config = RetryConfig::new()
        .max_attempts(4)
        .base_delay(Duration::from_millis(100))
        .build()
        .expect("valid config");
    let policy = RetryPolicy::with_clock(config, clock.clone()).expect("valid policy");
    let attempts = Arc::new(AtomicU32::new(0));

    let counter = Arc::clone(&attempts);
    let result: Result<(), _> = policy
        .execute(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Err(TestError::new(&format!("failure {n}"))) }
        })
        .await;

    assert_eq!(attempts.load(Ordering::SeqCst), 4);
    assert_eq!(
        clock.sleeps(),
        vec![Duration::from_millis(100), Duration::from_millis(200), Duration::from_millis(400)]
    );
    let err = result.expect_err("all attempts fail");
    assert!(matches!(err, ResilienceError::RetriesExhausted { attempts: 4, .. }));
    assert_eq!(err.operation_error().map(|e| e.message.as_str()), Some("failure 4"));
    assert_eq!(
        std::error::Error::source(&err).map(ToString::to_string),
        Some("failure 4".to_string())
    );
}

/// Validates the full breaker cycle Closed → Open → HalfOpen → Open →
/// HalfOpen → Closed with exactly one trial per half-open period.
#[tokio::test]
async fn test_circuit_breaker_full_cycle() {
    let clock = MockClock::new();
    let sink = Arc::new(RecordingSink::new());
    let metrics = Arc::new(InMemoryMetrics::new());
    let config = CircuitBreakerConfig::new()
        .failure_threshold(3)
        .cooldown(Duration::from_secs(5))
        .build()
        .expect("valid config");
    let breaker = CircuitBreaker::with_clock_and_observer(
        config,
        clock.clone(),
        Observer::noop().with_sink(sink.clone()).with_metrics(metrics.clone()),
    )
    .expect("valid breaker");
    let invocations = Arc::new(AtomicU32::new(0));

    let call = |succeed: bool| {
        let invocations = Arc::clone(&invocations);
        let breaker = breaker.clone();
        async move {
            breaker
                .call(|| async move {
                    invocations.fetch_add(1, Ordering::SeqCst);
                    if succeed {
                        Ok(())
                    } else {
                        Err(TestError::new("backend down"))
                    }
                })
                .await
        }
    };

    for _ in 0..3 {
        assert!(matches!(call(false).await, Err(ResilienceError::OperationFailed { .. })));
    }
    assert_eq!(breaker.state(), CircuitState::Open);
    assert!(matches!(call(true).await, Err(ResilienceError::CircuitOpen)));
    assert_eq!(invocations.load(Ordering::SeqCst), 3);

    clock.advance(Duration::from_secs(6));
    assert!(matches!(call(false).await, Err(ResilienceError::OperationFailed { .. })));
    assert_eq!(breaker.state(), CircuitState::Open);
    assert!(matches!(call(true).await, Err(ResilienceError::CircuitOpen)));

    clock.advance(Duration::from_secs(6));
    call(true).await.expect("trial succeeds");
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(breaker.failure_count(), 0);
    assert_eq!(invocations.load(Ordering::SeqCst), 5);

    assert_eq!(sink.count(EventKind::CircuitOpened), 2);
    assert_eq!(sink.count(EventKind::CircuitHalfOpened), 2);
    assert_eq!(sink.count(EventKind::CircuitClosed), 1);
    assert_eq!(metrics.get(counters::CIRCUIT_REJECTED_TOTAL), 2);
}

/// Validates that concurrent callers racing a half-open breaker produce
/// exactly one trial invocation.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_half_open_race_admits_one_trial() {
    let clock = MockClock::new();
    let config = CircuitBreakerConfig { failure_threshold: 1, cooldown: Duration::from_secs(1) };
    let breaker = CircuitBreaker::with_clock(config, clock.clone()).expect("valid breaker");
    let _ = breaker.call(|| async { Err::<(), _>(TestError::new("down")) }).await;
    clock.advance(Duration::from_secs(2));

    let trials = Arc::new(AtomicU32::new(0));
    let (release_tx, release_rx) = tokio::sync::watch::channel(false);

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let breaker = breaker.clone();
        let trials = Arc::clone(&trials);
        let mut release = release_rx.clone();
        tasks.push(tokio::spawn(async move {
            breaker
                .call(|| async move {
                    trials.fetch_add(1, Ordering::SeqCst);
                    let _ = release.wait_for(|released| *released).await;
                    Ok::<_, TestError>(())
                })
                .await
        }));
    }

    // Every caller has either started the trial or been rejected.
    while u64::from(trials.load(Ordering::SeqCst)) + breaker.snapshot().rejected_calls < 8 {
        tokio::task::yield_now().await;
    }
    release_tx.send(true).expect("receivers alive");

    let mut admitted = 0;
    for task in tasks {
        match task.await.expect("caller task") {
            Ok(()) => admitted += 1,
            Err(ResilienceError::CircuitOpen) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(trials.load(Ordering::SeqCst), 1);
    assert_eq!(admitted, 1);
    assert_eq!(breaker.state(), CircuitState::Closed);
}

/// Validates producer/consumer execution through the worker pool with a
/// flaky operation that succeeds on its second attempt.
#[tokio::test(start_paused = true)]
async fn test_worker_pool_runs_flaky_jobs_through_executor() {
    let config = ExecutorConfig {
        pool: PoolConfig { capacity: 2 },
        retry: RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
            max_delay: None,
        },
        breaker: CircuitBreakerConfig { failure_threshold: 10, cooldown: Duration::from_secs(1) },
        acquire_timeout: None,
    };
    let executor = ResilientExecutor::new(&config).expect("valid executor");
    let pool = WorkerPool::start(executor, 3, 4).expect("pool starts");

    let mut handles = Vec::new();
    for job in 0..12u32 {
        let attempts = Arc::new(AtomicU32::new(0));
        let handle = pool
            .submit(move || {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if attempt == 1 {
                        Err(TestError::new("first attempt fails"))
                    } else {
                        Ok(job * 10)
                    }
                }
            })
            .await
            .expect("queue open");
        handles.push(handle.map(|result| result.map(|value| value + 1)));
    }

    let results = futures::future::join_all(handles).await;
    let values: Vec<u32> = results.into_iter().map(|r| r.expect("second attempt succeeds")).collect();
    assert_eq!(values, (0..12).map(|job| job * 10 + 1).collect::<Vec<_>>());

    let stats = pool.shutdown().await;
    assert_eq!(stats.submitted, 12);
    assert_eq!(stats.completed, 12);
    assert_eq!(stats.failed, 0);
    assert_eq!(pool.executor().pool().held(), 0);
    assert_eq!(pool.executor().breaker().state(), CircuitState::Closed);
}
