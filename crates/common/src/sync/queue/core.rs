use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, warn};

use super::errors::TryPutError;
use super::metrics::{QueueCounters, QueueStats};
use super::types::QueueConfig;
use crate::error::{ResilienceError, ResilienceResult};
use crate::observability::{counters, EventKind, Observer};
use crate::sync::wait::WaitLimit;

struct Inner<T> {
    items: VecDeque<T>,
    capacity: usize,
    closed: bool,
}

struct Shared<T> {
    inner: Mutex<Inner<T>>,
    not_empty: Notify,
    not_full: Notify,
    counters: QueueCounters,
    observer: Observer,
}

/// Bounded multi-producer, multi-consumer FIFO queue
///
/// Cloning yields another handle to the same queue. All operations take
/// `&self`; ordering across producers is the order in which they acquire the
/// queue lock.
///
/// # Examples
///
/// ```rust
/// use resilex_common::sync::WorkQueue;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let queue = WorkQueue::new(2)?;
/// queue.put("a").await?;
/// queue.put("b").await?;
/// queue.close();
///
/// assert_eq!(queue.take().await?, "a");
/// assert_eq!(queue.take().await?, "b");
/// assert!(queue.take().await.is_err());
/// # Ok(())
/// # }
/// ```
pub struct WorkQueue<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for WorkQueue<T> {
    fn clone(&self) -> Self {
        Self { shared: Arc::clone(&self.shared) }
    }
}

impl<T> WorkQueue<T> {
    /// Create a queue holding at most `capacity` items
    pub fn new(capacity: usize) -> ResilienceResult<Self> {
        Self::with_observer(capacity, Observer::noop())
    }

    /// Create a queue reporting to `observer`
    pub fn with_observer(capacity: usize, observer: Observer) -> ResilienceResult<Self> {
        Self::from_config(&QueueConfig { capacity }, observer)
    }

    /// Create a queue from validated configuration
    pub fn from_config(config: &QueueConfig, observer: Observer) -> ResilienceResult<Self> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    items: VecDeque::with_capacity(config.capacity),
                    capacity: config.capacity,
                    closed: false,
                }),
                not_empty: Notify::new(),
                not_full: Notify::new(),
                counters: QueueCounters::default(),
                observer,
            }),
        })
    }

    // ------------------------------------------------------------------
    // Producers
    // ------------------------------------------------------------------

    /// Append `item` if there is room, handing it back otherwise
    pub fn try_put(&self, item: T) -> Result<(), TryPutError<T>> {
        {
            let mut inner = self.shared.inner.lock();
            if inner.closed {
                return Err(TryPutError::Closed(item));
            }
            if inner.items.len() >= inner.capacity {
                return Err(TryPutError::Full(item));
            }
            inner.items.push_back(item);
        }

        self.shared.counters.record_produced();
        self.shared.not_empty.notify_one();
        Ok(())
    }

    /// Append `item`, suspending while the queue is full
    ///
    /// Fails with [`ResilienceError::QueueClosed`] if the queue is closed
    /// before the item fits; the item is dropped in that case.
    pub async fn put(&self, item: T) -> ResilienceResult<()> {
        let mut item = item;
        loop {
            let notified = self.shared.not_full.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.try_put(item) {
                Ok(()) => return Ok(()),
                Err(TryPutError::Closed(_)) => {
                    self.record_drop("queue closed");
                    return Err(ResilienceError::QueueClosed);
                }
                Err(TryPutError::Full(rejected)) => item = rejected,
            }
            notified.await;
        }
    }

    /// Append `item` within `limit`; the item is dropped if the limit trips
    pub async fn put_within(&self, item: T, limit: &WaitLimit) -> ResilienceResult<()> {
        match limit.run(self.put(item)).await {
            Ok(result) => result,
            Err(err) => {
                self.record_drop("wait limit reached");
                Err(err)
            }
        }
    }

    /// Append `item`, waiting at most `timeout` for room
    pub async fn put_timeout(&self, item: T, timeout: Duration) -> ResilienceResult<()> {
        self.put_within(item, &WaitLimit::timeout(timeout)).await
    }

    /// Block the current OS thread until `item` is queued
    ///
    /// Must not be called from inside an async task.
    pub fn put_blocking(&self, item: T) -> ResilienceResult<()> {
        futures::executor::block_on(self.put(item))
    }

    // ------------------------------------------------------------------
    // Consumers
    // ------------------------------------------------------------------

    /// Remove the head item if one is buffered
    ///
    /// Returns `Ok(None)` when the queue is open and empty, and
    /// [`ResilienceError::QueueClosed`] when it is closed and drained.
    pub fn try_take(&self) -> ResilienceResult<Option<T>> {
        let item = {
            let mut inner = self.shared.inner.lock();
            match inner.items.pop_front() {
                Some(item) => item,
                None if inner.closed => return Err(ResilienceError::QueueClosed),
                None => return Ok(None),
            }
        };

        self.shared.counters.record_consumed();
        self.shared.not_full.notify_one();
        Ok(Some(item))
    }

    /// Remove the head item, suspending while the queue is empty
    pub async fn take(&self) -> ResilienceResult<T> {
        loop {
            let notified = self.shared.not_empty.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(item) = self.try_take()? {
                return Ok(item);
            }
            notified.await;
        }
    }

    /// Remove the head item within `limit`
    pub async fn take_within(&self, limit: &WaitLimit) -> ResilienceResult<T> {
        limit.run(self.take()).await?
    }

    /// Remove the head item, waiting at most `timeout`
    pub async fn take_timeout(&self, timeout: Duration) -> ResilienceResult<T> {
        self.take_within(&WaitLimit::timeout(timeout)).await
    }

    /// Block the current OS thread until an item is available
    ///
    /// Must not be called from inside an async task.
    pub fn take_blocking(&self) -> ResilienceResult<T> {
        futures::executor::block_on(self.take())
    }

    // ------------------------------------------------------------------
    // Lifecycle and inspection
    // ------------------------------------------------------------------

    /// Stop accepting items and wake every waiter
    pub fn close(&self) {
        let remaining = {
            let mut inner = self.shared.inner.lock();
            if inner.closed {
                return;
            }
            inner.closed = true;
            inner.items.len()
        };

        self.shared.not_empty.notify_waiters();
        self.shared.not_full.notify_waiters();
        debug!(remaining, "Work queue closed");
        self.shared
            .observer
            .emit(EventKind::QueueClosed, &format!("{remaining} items left to drain"));
    }

    /// Whether [`WorkQueue::close`] has been called
    pub fn is_closed(&self) -> bool {
        self.shared.inner.lock().closed
    }

    /// Number of buffered items
    pub fn len(&self) -> usize {
        self.shared.inner.lock().items.len()
    }

    /// `true` when nothing is buffered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of buffered items
    pub fn capacity(&self) -> usize {
        self.shared.inner.lock().capacity
    }

    /// Occupancy and throughput snapshot
    pub fn stats(&self) -> QueueStats {
        let (len, capacity, closed) = {
            let inner = self.shared.inner.lock();
            (inner.items.len(), inner.capacity, inner.closed)
        };
        let (produced, consumed, dropped) = self.shared.counters.load();
        QueueStats { capacity, len, produced, consumed, dropped, closed }
    }

    fn record_drop(&self, reason: &str) {
        warn!(reason, "Work item dropped");
        self.shared.counters.record_dropped();
        self.shared.observer.emit(EventKind::ItemDropped, reason);
        self.shared.observer.count(counters::QUEUE_ITEMS_DROPPED_TOTAL);
    }
}

impl<T> fmt::Debug for WorkQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = self.stats();
        f.debug_struct("WorkQueue")
            .field("len", &stats.len)
            .field("capacity", &stats.capacity)
            .field("closed", &stats.closed)
            .finish()
    }
}
