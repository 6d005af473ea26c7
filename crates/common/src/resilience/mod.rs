//! Resilience patterns for fault tolerance
//!
//! - **Retry** ([`RetryPolicy`]): re-invokes failing operations with
//!   exponential backoff
//! - **Circuit Breaker** ([`CircuitBreaker`]): fails fast while a dependency
//!   keeps failing and probes it with a single trial call after a cooldown
//! - **Executor** ([`ResilientExecutor`]): a pool slot, a breaker call and a
//!   retry loop composed into one call path
//! - **Worker pool** ([`WorkerPool`]): a fixed set of Tokio tasks running
//!   submitted operations through an executor
//!
//! All of them are generic over the error type of the wrapped operation and
//! over a [`Clock`](crate::time::Clock), so timing behaviour can be tested
//! with [`MockClock`](crate::time::MockClock).

pub mod circuit_breaker;
pub mod executor;
pub mod retry;
pub mod worker;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerConfigBuilder, CircuitBreakerSnapshot,
    CircuitState,
};
pub use executor::{ExecutorConfig, ResilientExecutor};
pub use retry::{
    retry, AttemptOutcome, AttemptRecord, RetryConfig, RetryConfigBuilder, RetryOutcome,
    RetryPolicy,
};
pub use worker::{TaskHandle, WorkerPool, WorkerPoolStats};
