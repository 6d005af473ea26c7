//! Bounded FIFO work queue
//!
//! [`WorkQueue`] is a fixed-capacity channel between any number of producers
//! and consumers. `put` suspends while the queue is full, `take` suspends
//! while it is empty, and every item is delivered to exactly one consumer in
//! the order producers enqueued it.
//!
//! **Semantics of `close()`**
//! - Closing stops new puts (blocking or not) and wakes every waiter.
//! - Consumers keep draining buffered items, then receive
//!   [`ResilienceError::QueueClosed`](crate::error::ResilienceError::QueueClosed).
//! - Idempotent.

mod core;
mod errors;
pub mod metrics;
mod types;

pub use self::core::WorkQueue;
pub use self::errors::TryPutError;
pub use self::metrics::QueueStats;
pub use self::types::QueueConfig;
