//! Blocking coordination primitives
//!
//! ## Submodules
//!
//! - **`pool`**: [`ResourcePool`], a fixed set of indexed slots handed out
//!   to at most one holder at a time
//! - **`queue`**: [`WorkQueue`], a bounded FIFO with close-and-drain
//!   shutdown
//! - **`wait`**: [`WaitLimit`], the timeout/cancellation bound accepted by
//!   every `*_within` method
//!
//! Both primitives are async-first. The `*_blocking` variants park the calling
//! OS thread and are meant for code running outside a Tokio runtime.

pub mod pool;
pub mod queue;
pub mod wait;

pub use pool::{PoolConfig, PoolSnapshot, PooledSlot, ResourcePool};
pub use queue::{QueueConfig, QueueStats, TryPutError, WorkQueue};
pub use wait::WaitLimit;
