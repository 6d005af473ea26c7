//! Concurrency and fault-tolerance primitives for resilex.
//!
//! # Modules
//!
//! - [`sync`]: `ResourcePool` (indexed slots) and `WorkQueue` (bounded FIFO),
//!   plus the `WaitLimit` bound for their blocking calls
//! - [`resilience`]: `RetryPolicy`, `CircuitBreaker`, the composed
//!   `ResilientExecutor` and the `WorkerPool`
//! - [`time`]: the `Clock` abstraction with a deterministic `MockClock`
//! - [`observability`]: event sink and metrics hooks
//! - [`error`]: the shared `ResilienceError` taxonomy
//!
//! Every component is an ordinary value; there are no global instances.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod error;
pub mod observability;
pub mod resilience;
pub mod sync;
pub mod testing;
pub mod time;
pub mod utils;

pub use error::{ErrorClassification, ErrorSeverity, ResilienceError, ResilienceResult};
pub use observability::{EventKind, EventSink, MetricsRecorder, Observer};
pub use resilience::{
    retry, CircuitBreaker, CircuitBreakerConfig, CircuitState, ExecutorConfig, ResilientExecutor,
    RetryConfig, RetryPolicy, TaskHandle, WorkerPool,
};
pub use sync::{PoolConfig, PooledSlot, QueueConfig, ResourcePool, WaitLimit, WorkQueue};
pub use time::{Clock, MockClock, SystemClock};
pub use utils::serde::{duration_millis, option_duration_millis};
