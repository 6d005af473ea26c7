//! Pool, breaker and retry composed into one call path
//!
//! [`ResilientExecutor::execute`] runs an operation as follows:
//!
//! 1. hold a [`ResourcePool`] slot for the whole call (released on drop, so
//!    an abandoned call never leaks a slot);
//! 2. ask the [`CircuitBreaker`] for admission;
//! 3. run the [`RetryPolicy`] loop inside that single breaker call.
//!
//! A retry sequence that ends in `RetriesExhausted` therefore counts as one
//! breaker failure, and an open breaker fails fast without consuming retry
//! attempts.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use super::retry::{RetryConfig, RetryPolicy};
use crate::error::{ResilienceError, ResilienceResult};
use crate::observability::Observer;
use crate::sync::{PoolConfig, PooledSlot, ResourcePool, WaitLimit};
use crate::time::{Clock, SystemClock};
use crate::utils::serde::option_duration_millis;

/// Configuration of a [`ResilientExecutor`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Slot pool sizing
    #[serde(default)]
    pub pool: PoolConfig,
    /// Backoff schedule applied inside each breaker call
    #[serde(default)]
    pub retry: RetryConfig,
    /// Breaker thresholds
    #[serde(default)]
    pub breaker: CircuitBreakerConfig,
    /// Longest wait for a pool slot; `None` waits indefinitely
    #[serde(default, with = "option_duration_millis")]
    pub acquire_timeout: Option<Duration>,
}

impl ExecutorConfig {
    /// Validate the pool, retry and breaker sections
    pub fn validate(&self) -> ResilienceResult<()> {
        self.pool.validate()?;
        self.retry.validate()?;
        self.breaker.validate()?;
        Ok(())
    }
}

/// Runs operations under a concurrency limit, a circuit breaker and a retry
/// policy
///
/// # Examples
///
/// ```rust
/// use resilex_common::resilience::{ExecutorConfig, ResilientExecutor};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let executor = ResilientExecutor::new(&ExecutorConfig::default())?;
/// let answer = executor.execute(|| async { Ok::<_, std::io::Error>(42) }).await?;
/// assert_eq!(answer, 42);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ResilientExecutor<C: Clock + Clone = SystemClock> {
    pool: ResourcePool,
    breaker: CircuitBreaker<C>,
    retry: RetryPolicy<C>,
    acquire_timeout: Option<Duration>,
}

impl ResilientExecutor<SystemClock> {
    /// Build an executor on the system clock
    pub fn new(config: &ExecutorConfig) -> ResilienceResult<Self> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock + Clone> ResilientExecutor<C> {
    /// Build an executor whose breaker and retry policy share `clock`
    pub fn with_clock(config: &ExecutorConfig, clock: C) -> ResilienceResult<Self> {
        Self::with_clock_and_observer(config, clock, Observer::noop())
    }

    /// Build an executor whose components all report to `observer`
    pub fn with_clock_and_observer(
        config: &ExecutorConfig,
        clock: C,
        observer: Observer,
    ) -> ResilienceResult<Self> {
        config.validate()?;

        let pool = ResourcePool::from_config(&config.pool, observer.clone())?;
        let breaker = CircuitBreaker::with_clock_and_observer(
            config.breaker.clone(),
            clock.clone(),
            observer.clone(),
        )?;
        let retry = RetryPolicy::with_clock(config.retry.clone(), clock)?.with_observer(observer);

        Ok(Self { pool, breaker, retry, acquire_timeout: config.acquire_timeout })
    }

    /// Run `operation` with the configured acquire timeout
    #[instrument(skip_all)]
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> ResilienceResult<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let limit = match self.acquire_timeout {
            Some(timeout) => WaitLimit::timeout(timeout),
            None => WaitLimit::unbounded(),
        };
        self.execute_within(operation, &limit).await
    }

    /// Run `operation`, bounding the wait for a pool slot by `limit`
    pub async fn execute_within<F, Fut, T, E>(
        &self,
        operation: F,
        limit: &WaitLimit,
    ) -> ResilienceResult<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let slot = self.acquire_slot(limit).await?;
        debug!(slot = slot.index(), "Executing operation");

        let result = self
            .breaker
            .call(|| self.retry.execute(operation))
            .await
            .map_err(|err| err.flatten());

        drop(slot);
        result
    }

    async fn acquire_slot<E>(&self, limit: &WaitLimit) -> ResilienceResult<PooledSlot, E>
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        if limit.is_unbounded() {
            return Ok(self.pool.acquire_guard().await);
        }
        self.pool.acquire_guard_within(limit).await.map_err(|err| err.lift())
    }

    /// Pool bounding concurrent calls
    pub fn pool(&self) -> &ResourcePool {
        &self.pool
    }

    /// Breaker guarding every call
    pub fn breaker(&self) -> &CircuitBreaker<C> {
        &self.breaker
    }

    /// Retry policy run inside each breaker call
    pub fn retry_policy(&self) -> &RetryPolicy<C> {
        &self.retry
    }
}
