//! Retry with exponential backoff
//!
//! [`RetryPolicy`] re-invokes a fallible async operation until it succeeds or
//! `max_attempts` invocations have failed. The wait before attempt `n + 1` is
//! `base_delay * 2^(n - 1)`, optionally capped by `max_delay`:
//!
//! | after failure | delay (base 100ms) |
//! |---------------|--------------------|
//! | 1 | 100ms |
//! | 2 | 200ms |
//! | 3 | 400ms |
//!
//! Waits go through the policy's [`Clock`], so tests can observe the schedule
//! with [`MockClock`](crate::time::MockClock) without sleeping.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::error::{ResilienceError, ResilienceResult};
use crate::observability::{counters, EventKind, Observer};
use crate::time::{Clock, SystemClock};
use crate::utils::serde::{duration_millis, option_duration_millis};

/// Retry parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total invocations allowed, including the first one
    pub max_attempts: u32,
    /// Delay after the first failure
    #[serde(with = "duration_millis")]
    pub base_delay: Duration,
    /// Upper bound for any single delay
    #[serde(default, with = "option_duration_millis")]
    pub max_delay: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay: Duration::from_millis(100), max_delay: None }
    }
}

impl RetryConfig {
    /// Start a builder seeded with the defaults
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> RetryConfigBuilder {
        RetryConfigBuilder::new()
    }

    /// Alias for [`RetryConfig::new`]
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> ResilienceResult<()> {
        if self.max_attempts == 0 {
            return Err(ResilienceError::invalid_config("max_attempts must be greater than 0"));
        }
        if let Some(max_delay) = self.max_delay {
            if max_delay < self.base_delay {
                return Err(ResilienceError::invalid_config(
                    "max_delay must not be smaller than base_delay",
                ));
            }
        }
        Ok(())
    }

    /// Delay to wait after the `attempt`-th failure (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        let exponent = attempt.saturating_sub(1);
        let delay = 2u32
            .checked_pow(exponent)
            .map_or(Duration::MAX, |factor| self.base_delay.saturating_mul(factor));
        match self.max_delay {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }
}

/// Builder for [`RetryConfig`]
#[derive(Debug, Default)]
pub struct RetryConfigBuilder {
    config: RetryConfig,
}

impl RetryConfigBuilder {
    /// Start from [`RetryConfig::default`]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total invocations allowed, including the first one
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.config.max_attempts = max_attempts;
        self
    }

    /// Delay after the first failure; doubles after each further failure
    pub fn base_delay(mut self, base_delay: Duration) -> Self {
        self.config.base_delay = base_delay;
        self
    }

    /// Cap on any single delay
    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.config.max_delay = Some(max_delay);
        self
    }

    /// Validate and return the configuration
    pub fn build(self) -> ResilienceResult<RetryConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// How a single attempt ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Succeeded,
    Failed { message: String },
}

/// One invocation made by [`RetryPolicy::execute_with_report`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRecord {
    /// 1-based attempt number
    pub attempt: u32,
    /// Backoff waited before this attempt (zero for the first)
    pub delay_before: Duration,
    /// How the attempt ended
    pub outcome: AttemptOutcome,
}

/// Result of a retried call together with its attempt history
#[derive(Debug)]
pub struct RetryOutcome<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Same value [`RetryPolicy::execute`] would have returned
    pub result: ResilienceResult<T, E>,
    /// One record per invocation, in order
    pub attempts: Vec<AttemptRecord>,
}

impl<T, E> RetryOutcome<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Consume the outcome and return only the result
    pub fn into_result(self) -> ResilienceResult<T, E> {
        self.result
    }

    /// Number of invocations made
    pub fn attempt_count(&self) -> usize {
        self.attempts.len()
    }

    /// Sum of all backoff delays
    pub fn total_delay(&self) -> Duration {
        self.attempts.iter().map(|record| record.delay_before).sum()
    }
}

/// Re-invokes failing operations with exponential backoff
///
/// The operation may have side effects on every attempt; the policy makes no
/// attempt to deduplicate them. Callers wrapping non-idempotent work should
/// use [`RetryPolicy::execute_if`] to stop on failures that must not repeat.
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
///
/// use resilex_common::resilience::{RetryConfig, RetryPolicy};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = RetryConfig::new().max_attempts(4).base_delay(Duration::from_millis(10)).build()?;
/// let policy = RetryPolicy::new(config)?;
///
/// let value = policy.execute(|| async { Ok::<_, std::io::Error>(42) }).await?;
/// assert_eq!(value, 42);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RetryPolicy<C: Clock = SystemClock> {
    config: RetryConfig,
    clock: C,
    observer: Observer,
}

impl RetryPolicy<SystemClock> {
    /// Create a policy backed by the system clock
    pub fn new(config: RetryConfig) -> ResilienceResult<Self> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> RetryPolicy<C> {
    /// Create a policy that waits through `clock`
    pub fn with_clock(config: RetryConfig, clock: C) -> ResilienceResult<Self> {
        config.validate()?;
        Ok(Self { config, clock, observer: Observer::noop() })
    }

    /// Report retries and exhaustion to `observer`
    #[must_use]
    pub fn with_observer(mut self, observer: Observer) -> Self {
        self.observer = observer;
        self
    }

    /// Configuration this policy was built with
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `operation` until it succeeds or attempts run out
    ///
    /// Returns [`ResilienceError::RetriesExhausted`] carrying the last failure
    /// after `max_attempts` failed invocations.
    #[instrument(skip_all, fields(max_attempts = self.config.max_attempts))]
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> ResilienceResult<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        self.run(operation, always_retry::<E>, None, None).await
    }

    /// Like [`RetryPolicy::execute`], stopping with
    /// [`ResilienceError::Cancelled`] once `token` is cancelled
    ///
    /// The token is checked before every attempt and raced against every
    /// backoff wait. An attempt already running is not interrupted.
    #[instrument(skip_all, fields(max_attempts = self.config.max_attempts))]
    pub async fn execute_cancellable<F, Fut, T, E>(
        &self,
        operation: F,
        token: &CancellationToken,
    ) -> ResilienceResult<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        self.run(operation, always_retry::<E>, Some(token), None).await
    }

    /// Retry only failures for which `is_retryable` returns `true`
    ///
    /// Any other failure is returned at once as
    /// [`ResilienceError::OperationFailed`].
    #[instrument(skip_all, fields(max_attempts = self.config.max_attempts))]
    pub async fn execute_if<F, Fut, T, E, P>(
        &self,
        operation: F,
        is_retryable: P,
    ) -> ResilienceResult<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
        P: Fn(&E) -> bool,
    {
        self.run(operation, is_retryable, None, None).await
    }

    /// Run `operation` and return the result with one record per attempt
    pub async fn execute_with_report<F, Fut, T, E>(&self, operation: F) -> RetryOutcome<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let mut attempts = Vec::with_capacity(self.config.max_attempts as usize);
        let result = self.run(operation, always_retry::<E>, None, Some(&mut attempts)).await;
        RetryOutcome { result, attempts }
    }

    async fn run<F, Fut, T, E, P>(
        &self,
        mut operation: F,
        is_retryable: P,
        cancel: Option<&CancellationToken>,
        mut report: Option<&mut Vec<AttemptRecord>>,
    ) -> ResilienceResult<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
        P: Fn(&E) -> bool,
    {
        let mut attempt = 1u32;
        let mut delay_before = Duration::ZERO;

        loop {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                debug!(attempt, "Retry cancelled before attempt");
                return Err(ResilienceError::Cancelled);
            }

            let error = match operation().await {
                Ok(value) => {
                    if let Some(report) = report.as_deref_mut() {
                        report.push(AttemptRecord {
                            attempt,
                            delay_before,
                            outcome: AttemptOutcome::Succeeded,
                        });
                    }
                    if attempt > 1 {
                        debug!(attempt, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            if let Some(report) = report.as_deref_mut() {
                report.push(AttemptRecord {
                    attempt,
                    delay_before,
                    outcome: AttemptOutcome::Failed { message: error.to_string() },
                });
            }

            if !is_retryable(&error) {
                debug!(attempt, error = %error, "Non-retryable failure");
                return Err(ResilienceError::OperationFailed { source: error });
            }

            if attempt >= self.config.max_attempts {
                warn!(attempts = attempt, error = %error, "Retry attempts exhausted");
                self.observer.emit(
                    EventKind::RetriesExhausted,
                    &format!("{attempt} attempts failed, last error: {error}"),
                );
                self.observer.count(counters::RETRIES_EXHAUSTED_TOTAL);
                return Err(ResilienceError::RetriesExhausted { attempts: attempt, source: error });
            }

            let delay = self.config.delay_for(attempt);
            let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
            debug!(attempt, delay_ms, error = %error, "Attempt failed, retrying");
            self.observer.emit(
                EventKind::RetryAttempted,
                &format!("attempt {attempt} failed, retrying in {delay:?}"),
            );
            self.observer.count(counters::RETRIES_TOTAL);

            match cancel {
                Some(token) => {
                    tokio::select! {
                        biased;
                        () = token.cancelled() => {
                            debug!(attempt, "Retry cancelled during backoff");
                            return Err(ResilienceError::Cancelled);
                        }
                        () = self.clock.sleep(delay) => {}
                    }
                }
                None => self.clock.sleep(delay).await,
            }

            attempt += 1;
            delay_before = delay;
        }
    }
}

fn always_retry<E>(_: &E) -> bool {
    true
}

/// Retry `operation` on the system clock with `max_attempts` and
/// `base_delay`
///
/// Shorthand for building a [`RetryPolicy`] for a single call.
pub async fn retry<F, Fut, T, E>(
    max_attempts: u32,
    base_delay: Duration,
    operation: F,
) -> ResilienceResult<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    let config = RetryConfig { max_attempts, base_delay, max_delay: None };
    let policy = RetryPolicy::new(config).map_err(|err| err.lift())?;
    policy.execute(operation).await
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::observability::InMemoryMetrics;
    use crate::testing::RecordingSink;
    use crate::time::MockClock;

    #[derive(Debug, thiserror::Error)]
    #[error("transient failure #{0}")]
    struct TestError(u32);

    fn policy(max_attempts: u32, clock: MockClock) -> RetryPolicy<MockClock> {
        let config = RetryConfig::new()
            .max_attempts(max_attempts)
            .base_delay(Duration::from_millis(100))
            .build()
            .expect("valid config");
        RetryPolicy::with_clock(config, clock).expect("valid policy")
    }

    #[test]
    fn test_delay_schedule_doubles() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_for(1), Duration::from_millis(100));
        assert_eq!(config.delay_for(2), Duration::from_millis(200));
        assert_eq!(config.delay_for(3), Duration::from_millis(400));
        assert_eq!(config.delay_for(64), Duration::MAX);
    }

    #[test]
    fn test_delay_respects_cap() {
        let config = RetryConfig::new()
            .base_delay(Duration::from_millis(100))
            .max_delay(Duration::from_millis(250))
            .build()
            .expect("valid config");
        assert_eq!(config.delay_for(2), Duration::from_millis(200));
        assert_eq!(config.delay_for(3), Duration::from_millis(250));
        assert_eq!(config.delay_for(40), Duration::from_millis(250));
    }

    /// Validates that invalid parameters are rejected at construction.
    ///
    /// Assertions:
    /// - `max_attempts == 0` yields `InvalidConfig`.
    /// - A cap below the base delay yields `InvalidConfig`.
    #[test]
    fn test_invalid_config_rejected() {
        let zero = RetryConfig::new().max_attempts(0).build();
        assert!(matches!(zero, Err(ResilienceError::InvalidConfig { .. })));

        let bad_cap = RetryConfig::new()
            .base_delay(Duration::from_secs(1))
            .max_delay(Duration::from_millis(10))
            .build();
        assert!(matches!(bad_cap, Err(ResilienceError::InvalidConfig { .. })));

        let direct = RetryConfig { max_attempts: 0, ..RetryConfig::default() };
        assert!(RetryPolicy::new(direct).is_err());
    }

    #[test]
    fn test_config_from_json() {
        let config: RetryConfig =
            serde_json::from_str(r#"{"max_attempts":5,"base_delay":50}"#).expect("valid JSON");
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.base_delay, Duration::from_millis(50));
        assert_eq!(config.max_delay, None);
    }

    #[tokio::test]
    async fn test_first_success_has_no_delay() {
        let clock = MockClock::new();
        let policy = policy(3, clock.clone());

        let value = policy.execute(|| async { Ok::<_, TestError>("done") }).await;
        assert_eq!(value.expect("success"), "done");
        assert!(clock.sleeps().is_empty());
    }

    /// Validates the exponential backoff schedule and exhaustion count.
    ///
    /// Assertions:
    /// - The operation runs exactly `max_attempts` times.
    /// - The recorded sleeps are 100ms, 200ms, 400ms.
    /// - The error carries the last failure.
    #[tokio::test]
    async fn test_exhaustion_after_exact_attempts_with_backoff() {
        let clock = MockClock::new();
        let policy = policy(4, clock.clone());
        let calls = Arc::new(AtomicU32::new(0));

        let calls_clone = Arc::clone(&calls);
        let result: ResilienceResult<(), TestError> = policy
            .execute(move || {
                let calls = Arc::clone(&calls_clone);
                async move { Err(TestError(calls.fetch_add(1, Ordering::SeqCst) + 1)) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_millis(100), Duration::from_millis(200), Duration::from_millis(400)]
        );
        match result {
            Err(ResilienceError::RetriesExhausted { attempts, source }) => {
                assert_eq!(attempts, 4);
                assert_eq!(source.0, 4);
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
    }

    /// A delay whose millisecond count exceeds `u64` is reported as saturated,
    /// not wrapped.
    #[tokio::test]
    async fn test_delay_beyond_u64_millis_is_reported_saturated() {
        let clock = MockClock::new();
        let config = RetryConfig::new()
            .max_attempts(2)
            .base_delay(Duration::MAX)
            .build()
            .expect("valid config");
        let policy = RetryPolicy::with_clock(config, clock.clone()).expect("valid policy");
        assert!(Duration::MAX.as_millis() > u128::from(u64::MAX));

        let outcome = policy
            .execute_with_report(|| async { Err::<(), _>(TestError(1)) })
            .await;

        assert_eq!(clock.sleeps(), vec![Duration::MAX]);
        assert_eq!(outcome.attempt_count(), 2);
        assert_eq!(outcome.total_delay(), Duration::MAX);
        assert!(matches!(
            outcome.into_result(),
            Err(ResilienceError::RetriesExhausted { attempts: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_success_after_transient_failures() {
        let clock = MockClock::new();
        let policy = policy(5, clock.clone());
        let calls = AtomicU32::new(0);

        let result = policy
            .execute(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        Err(TestError(n))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result.expect("third attempt succeeds"), 3);
        assert_eq!(clock.sleeps().len(), 2);
        assert_eq!(clock.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_non_retryable_failure_surfaces_immediately() {
        let clock = MockClock::new();
        let policy = policy(5, clock.clone());
        let calls = AtomicU32::new(0);

        let result: ResilienceResult<(), TestError> = policy
            .execute_if(
                || {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    async move { Err(TestError(n)) }
                },
                |err| err.0 < 2,
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(matches!(result, Err(ResilienceError::OperationFailed { source }) if source.0 == 2));
    }

    #[tokio::test]
    async fn test_cancellation_stops_retrying() {
        let clock = MockClock::new();
        let policy = policy(10, clock.clone());
        let token = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let result: ResilienceResult<(), TestError> = policy
            .execute_cancellable(
                || {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    if n == 2 {
                        token.cancel();
                    }
                    async move { Err(TestError(n)) }
                },
                &token,
            )
            .await;

        assert!(matches!(result, Err(ResilienceError::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(100)]);
    }

    /// Validates that cancelling during a pending backoff wait ends the wait
    /// early instead of sleeping it out.
    ///
    /// # Test Steps
    /// 1. Fail the first attempt with a 10s base delay on the system clock
    /// 2. Cancel the token 1s into the wait
    /// 3. Verify `Cancelled`, a single invocation and well under 10s elapsed
    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_pending_backoff() {
        let config = RetryConfig::new()
            .max_attempts(3)
            .base_delay(Duration::from_secs(10))
            .build()
            .expect("valid config");
        let policy = RetryPolicy::new(config).expect("valid policy");
        let token = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let canceller = {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(1)).await;
                token.cancel();
            })
        };

        let started = tokio::time::Instant::now();
        let result: ResilienceResult<(), TestError> = policy
            .execute_cancellable(
                || {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    async move { Err(TestError(n)) }
                },
                &token,
            )
            .await;
        let elapsed = started.elapsed();
        canceller.await.expect("canceller task");

        assert!(matches!(result, Err(ResilienceError::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(elapsed < Duration::from_secs(10), "backoff was slept out: {elapsed:?}");
    }

    #[tokio::test]
    async fn test_cancelled_before_first_attempt() {
        let policy = policy(3, MockClock::new());
        let token = CancellationToken::new();
        token.cancel();

        let result = policy.execute_cancellable(|| async { Ok::<_, TestError>(1) }, &token).await;
        assert!(matches!(result, Err(ResilienceError::Cancelled)));
    }

    #[tokio::test]
    async fn test_report_records_every_attempt() {
        let policy = policy(3, MockClock::new());
        let calls = AtomicU32::new(0);

        let outcome = policy
            .execute_with_report(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n == 1 {
                        Err(TestError(n))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(outcome.attempt_count(), 2);
        assert_eq!(outcome.total_delay(), Duration::from_millis(100));
        assert_eq!(
            outcome.attempts[0].outcome,
            AttemptOutcome::Failed { message: "transient failure #1".to_string() }
        );
        assert_eq!(outcome.attempts[1].delay_before, Duration::from_millis(100));
        assert_eq!(outcome.into_result().expect("second attempt succeeds"), 2);
    }

    #[tokio::test]
    async fn test_events_and_counters() {
        let sink = Arc::new(RecordingSink::new());
        let metrics = Arc::new(InMemoryMetrics::new());
        let policy = policy(3, MockClock::new())
            .with_observer(Observer::noop().with_sink(sink.clone()).with_metrics(metrics.clone()));

        let _ = policy.execute(|| async { Err::<(), _>(TestError(0)) }).await;

        assert_eq!(sink.count(EventKind::RetryAttempted), 2);
        assert_eq!(sink.count(EventKind::RetriesExhausted), 1);
        assert_eq!(metrics.get(counters::RETRIES_TOTAL), 2);
        assert_eq!(metrics.get(counters::RETRIES_EXHAUSTED_TOTAL), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_free_function_uses_system_clock() {
        let calls = AtomicU32::new(0);
        let result = retry(2, Duration::from_millis(5), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(TestError(n))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.expect("second attempt succeeds"), 1);

        let invalid = retry(0, Duration::ZERO, || async { Ok::<_, TestError>(()) }).await;
        assert!(matches!(invalid, Err(ResilienceError::InvalidConfig { .. })));
    }
}
