//! Bounded pool of interchangeable resource slots
//!
//! A [`ResourcePool`] manages `capacity` slots identified by index. Callers
//! acquire an index, use whatever resource they associate with it, and
//! release it again. When every slot is held, `acquire` suspends the caller
//! until a slot is released.
//!
//! Invariants, checked under the pool mutex:
//! - `held_count <= capacity`
//! - an index is handed out only while it is free, so two concurrent holders
//!   never share an index
//! - releasing an index that is not held is rejected with
//!   [`ResilienceError::InvalidRelease`] and leaves the table untouched, so a
//!   double release can never free a slot twice
//!
//! Waiters are woken one per release with no ordering guarantee: a caller
//! arriving through [`ResourcePool::try_acquire`] may take a freed slot ahead
//! of a task that has been waiting longer.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::{debug, warn};

use super::wait::WaitLimit;
use crate::error::{ResilienceError, ResilienceResult};
use crate::observability::{counters, EventKind, Observer};

/// Configuration for a [`ResourcePool`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Number of slots
    pub capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { capacity: 8 }
    }
}

impl PoolConfig {
    /// Reject a zero capacity
    pub fn validate(&self) -> ResilienceResult<()> {
        if self.capacity == 0 {
            return Err(ResilienceError::invalid_config("pool capacity must be greater than 0"));
        }
        Ok(())
    }
}

/// Point-in-time view of pool occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSnapshot {
    /// Total number of slots
    pub capacity: usize,
    /// Slots currently held
    pub held: usize,
    /// Callers suspended in `acquire`
    pub waiting: usize,
}

impl PoolSnapshot {
    /// Held slots as a fraction of capacity (0.0 to 1.0)
    pub fn utilization(&self) -> f64 {
        self.held as f64 / self.capacity as f64
    }

    /// `true` when every slot is held
    pub fn is_exhausted(&self) -> bool {
        self.held >= self.capacity
    }
}

struct SlotTable {
    held: Vec<bool>,
    held_count: usize,
}

impl SlotTable {
    fn claim(&mut self) -> Option<usize> {
        let index = self.held.iter().position(|held| !held)?;
        self.held[index] = true;
        self.held_count += 1;
        Some(index)
    }

    fn free(&mut self, index: usize) -> bool {
        match self.held.get_mut(index) {
            Some(held) if *held => {
                *held = false;
                self.held_count -= 1;
                true
            }
            _ => false,
        }
    }
}

struct PoolShared {
    capacity: usize,
    slots: Mutex<SlotTable>,
    slot_freed: Notify,
    waiting: AtomicUsize,
    observer: Observer,
}

/// Tracks the number of suspended acquirers, including ones that get
/// cancelled mid-wait
struct WaitingGuard<'a>(&'a AtomicUsize);

impl<'a> WaitingGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(counter)
    }
}

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Fixed-capacity pool of slot indices
///
/// Cloning is cheap and yields another handle to the same pool.
///
/// # Examples
///
/// ```rust
/// use resilex_common::sync::ResourcePool;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = ResourcePool::new(2)?;
///
/// let a = pool.acquire().await;
/// let b = pool.acquire().await;
/// assert_ne!(a, b);
/// assert!(pool.try_acquire().is_none());
///
/// pool.release(a)?;
/// assert_eq!(pool.try_acquire(), Some(a));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ResourcePool {
    shared: Arc<PoolShared>,
}

impl ResourcePool {
    /// Create a pool with `capacity` slots
    pub fn new(capacity: usize) -> ResilienceResult<Self> {
        Self::with_observer(capacity, Observer::noop())
    }

    /// Create a pool reporting to `observer`
    pub fn with_observer(capacity: usize, observer: Observer) -> ResilienceResult<Self> {
        Self::from_config(&PoolConfig { capacity }, observer)
    }

    /// Create a pool from validated configuration
    pub fn from_config(config: &PoolConfig, observer: Observer) -> ResilienceResult<Self> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(PoolShared {
                capacity: config.capacity,
                slots: Mutex::new(SlotTable { held: vec![false; config.capacity], held_count: 0 }),
                slot_freed: Notify::new(),
                waiting: AtomicUsize::new(0),
                observer,
            }),
        })
    }

    /// Take a free slot without waiting
    pub fn try_acquire(&self) -> Option<usize> {
        let index = self.shared.slots.lock().claim()?;
        debug!(slot = index, "Pool slot acquired");
        self.shared.observer.emit(EventKind::SlotAcquired, &format!("slot {index}"));
        self.shared.observer.count(counters::POOL_ACQUIRED_TOTAL);
        Some(index)
    }

    /// Wait for a free slot and return its index
    ///
    /// Never fails; without a limit it waits indefinitely. Dropping the
    /// returned future before completion acquires nothing.
    pub async fn acquire(&self) -> usize {
        if let Some(index) = self.try_acquire() {
            return index;
        }

        let _waiting = WaitingGuard::enter(&self.shared.waiting);
        loop {
            let notified = self.shared.slot_freed.notified();
            tokio::pin!(notified);
            // Register before re-checking so a release between the check and
            // the await still wakes us.
            notified.as_mut().enable();

            if let Some(index) = self.try_acquire() {
                return index;
            }
            notified.await;
        }
    }

    /// Wait for a free slot within `limit`
    pub async fn acquire_within(&self, limit: &WaitLimit) -> ResilienceResult<usize> {
        limit.run(self.acquire()).await
    }

    /// Wait for a free slot for at most `timeout`
    pub async fn acquire_timeout(&self, timeout: Duration) -> ResilienceResult<usize> {
        self.acquire_within(&WaitLimit::timeout(timeout)).await
    }

    /// Block the current OS thread until a slot is free
    ///
    /// Must not be called from inside an async task.
    pub fn acquire_blocking(&self) -> usize {
        futures::executor::block_on(self.acquire())
    }

    /// Acquire a slot wrapped in a guard that releases it on drop
    pub async fn acquire_guard(&self) -> PooledSlot {
        let index = self.acquire().await;
        PooledSlot { pool: self.clone(), index: Some(index) }
    }

    /// Acquire a guarded slot within `limit`
    pub async fn acquire_guard_within(&self, limit: &WaitLimit) -> ResilienceResult<PooledSlot> {
        let index = self.acquire_within(limit).await?;
        Ok(PooledSlot { pool: self.clone(), index: Some(index) })
    }

    /// Return slot `index` to the pool and wake one waiter
    ///
    /// Releasing an index that is out of range or not currently held returns
    /// [`ResilienceError::InvalidRelease`] and changes nothing.
    pub fn release(&self, index: usize) -> ResilienceResult<()> {
        let freed = self.shared.slots.lock().free(index);

        if !freed {
            warn!(slot = index, "Attempted to release a slot that is not held");
            self.shared.observer.emit(EventKind::InvalidRelease, &format!("slot {index}"));
            self.shared.observer.count(counters::POOL_INVALID_RELEASE_TOTAL);
            return Err(ResilienceError::InvalidRelease { index });
        }

        self.shared.slot_freed.notify_one();
        debug!(slot = index, "Pool slot released");
        self.shared.observer.emit(EventKind::SlotReleased, &format!("slot {index}"));
        Ok(())
    }

    /// Number of slots
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Number of slots currently held
    pub fn held(&self) -> usize {
        self.shared.slots.lock().held_count
    }

    /// Number of free slots
    pub fn available(&self) -> usize {
        self.capacity() - self.held()
    }

    /// Whether slot `index` is currently held
    pub fn is_held(&self, index: usize) -> bool {
        self.shared.slots.lock().held.get(index).copied().unwrap_or(false)
    }

    /// Occupancy snapshot; fields are read independently
    pub fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            capacity: self.shared.capacity,
            held: self.held(),
            waiting: self.shared.waiting.load(Ordering::Acquire),
        }
    }
}

impl fmt::Debug for ResourcePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.snapshot();
        f.debug_struct("ResourcePool")
            .field("capacity", &snapshot.capacity)
            .field("held", &snapshot.held)
            .field("waiting", &snapshot.waiting)
            .finish()
    }
}

/// RAII handle for an acquired slot
///
/// Releases the slot when dropped unless [`PooledSlot::release`] was called.
#[derive(Debug)]
pub struct PooledSlot {
    pool: ResourcePool,
    index: Option<usize>,
}

impl PooledSlot {
    /// Index of the held slot
    pub fn index(&self) -> usize {
        self.index.unwrap_or_default()
    }

    /// Release the slot now and surface any error
    pub fn release(mut self) -> ResilienceResult<()> {
        match self.index.take() {
            Some(index) => self.pool.release(index),
            None => Ok(()),
        }
    }
}

impl Drop for PooledSlot {
    fn drop(&mut self) {
        if let Some(index) = self.index.take() {
            if let Err(err) = self.pool.release(index) {
                warn!(slot = index, error = %err, "Pooled slot was released behind its guard");
            }
        }
    }
}
