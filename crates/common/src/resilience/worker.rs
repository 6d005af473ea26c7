//! Fixed-size worker pool fed by a [`WorkQueue`]
//!
//! Producers [`submit`](WorkerPool::submit) operations; each becomes a job on
//! a bounded queue (so submitters are throttled when workers fall behind).
//! Workers take jobs in FIFO order and run them through a shared
//! [`ResilientExecutor`]. Each submission yields a [`TaskHandle`], a future
//! resolving to the operation's result, which composes with the usual
//! `futures` combinators.
//!
//! A job that panics is counted as failed and its handle resolves to
//! [`ResilienceError::Cancelled`]; the worker that ran it keeps going.

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::executor::ResilientExecutor;
use crate::error::{ResilienceError, ResilienceResult};
use crate::observability::Observer;
use crate::sync::WorkQueue;
use crate::time::{Clock, SystemClock};

type Job = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// Pending result of a submitted operation
///
/// Resolves to [`ResilienceError::Cancelled`] if the job was discarded
/// without running.
#[must_use = "a TaskHandle does nothing unless awaited"]
pub struct TaskHandle<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    rx: oneshot::Receiver<ResilienceResult<T, E>>,
}

impl<T, E> Future for TaskHandle<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    type Output = ResilienceResult<T, E>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(ResilienceError::Cancelled)),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T, E> fmt::Debug for TaskHandle<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle").finish_non_exhaustive()
    }
}

/// Submission and completion counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkerPoolStats {
    /// Worker tasks started
    pub workers: usize,
    /// Jobs accepted by the queue
    pub submitted: u64,
    /// Jobs whose operation returned `Ok`
    pub completed: u64,
    /// Jobs whose operation ended in an error
    pub failed: u64,
    /// Jobs waiting in the queue
    pub queued: usize,
}

impl WorkerPoolStats {
    /// Jobs accepted but not finished
    pub fn pending(&self) -> u64 {
        self.submitted.saturating_sub(self.completed + self.failed)
    }
}

impl fmt::Display for WorkerPoolStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "workers={} submitted={} completed={} failed={} queued={}",
            self.workers, self.submitted, self.completed, self.failed, self.queued
        )
    }
}

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

/// Runs submitted operations on a fixed number of Tokio tasks
///
/// Dropping the pool closes its queue; workers finish the buffered jobs and
/// exit. Use [`WorkerPool::shutdown`] to also wait for them.
pub struct WorkerPool<C: Clock + Clone = SystemClock> {
    executor: Arc<ResilientExecutor<C>>,
    queue: WorkQueue<Job>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    worker_count: usize,
    counters: Arc<Counters>,
}

impl<C: Clock + Clone> WorkerPool<C> {
    /// Spawn `workers` tasks on the current Tokio runtime
    ///
    /// Jobs are buffered in a queue holding at most `queue_capacity` entries.
    pub fn start(
        executor: ResilientExecutor<C>,
        workers: usize,
        queue_capacity: usize,
    ) -> ResilienceResult<Self> {
        Self::start_with_observer(executor, workers, queue_capacity, Observer::noop())
    }

    /// Like [`WorkerPool::start`], reporting queue events to `observer`
    pub fn start_with_observer(
        executor: ResilientExecutor<C>,
        workers: usize,
        queue_capacity: usize,
        observer: Observer,
    ) -> ResilienceResult<Self> {
        if workers == 0 {
            return Err(ResilienceError::invalid_config("workers must be greater than 0"));
        }
        let queue: WorkQueue<Job> = WorkQueue::with_observer(queue_capacity, observer)?;
        let counters = Arc::new(Counters::default());

        let handles = (0..workers)
            .map(|id| tokio::spawn(worker_loop(id, queue.clone(), Arc::clone(&counters))))
            .collect::<Vec<_>>();
        info!(workers, queue_capacity, "Worker pool started");

        Ok(Self {
            executor: Arc::new(executor),
            queue,
            workers: Mutex::new(handles),
            worker_count: workers,
            counters,
        })
    }

    /// Queue `operation`, suspending while the queue is full
    ///
    /// Fails with [`ResilienceError::QueueClosed`] after
    /// [`WorkerPool::shutdown`].
    pub async fn submit<F, Fut, T, E>(&self, operation: F) -> ResilienceResult<TaskHandle<T, E>, E>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        let (job, handle) = self.job(operation);
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        if let Err(err) = self.queue.put(job).await {
            self.counters.submitted.fetch_sub(1, Ordering::Relaxed);
            return Err(err.lift());
        }
        Ok(handle)
    }

    /// Queue `operation` only if there is room right now
    ///
    /// A full queue is reported as a zero-length
    /// [`ResilienceError::Timeout`]; a closed one as
    /// [`ResilienceError::QueueClosed`].
    pub fn try_submit<F, Fut, T, E>(&self, operation: F) -> ResilienceResult<TaskHandle<T, E>, E>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        let (job, handle) = self.job(operation);
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        if let Err(err) = self.queue.try_put(job) {
            self.counters.submitted.fetch_sub(1, Ordering::Relaxed);
            debug!(closed = err.is_closed(), "Job rejected");
            return Err(ResilienceError::from(err).lift());
        }
        Ok(handle)
    }

    fn job<F, Fut, T, E>(&self, operation: F) -> (Job, TaskHandle<T, E>)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let executor = Arc::clone(&self.executor);
        let counters = Arc::clone(&self.counters);

        let job: Job = Box::new(move || {
            Box::pin(async move {
                let result = executor.execute(operation).await;
                let counter = if result.is_ok() { &counters.completed } else { &counters.failed };
                counter.fetch_add(1, Ordering::Relaxed);
                // The submitter may have dropped its handle.
                let _ = tx.send(result);
            })
        });
        (job, TaskHandle { rx })
    }

    /// Stop accepting work, let workers drain the queue and wait for them
    pub async fn shutdown(&self) -> WorkerPoolStats {
        self.queue.close();
        let handles = std::mem::take(&mut *self.workers.lock());
        for handle in handles {
            if let Err(err) = handle.await {
                warn!(error = %err, "Worker task ended abnormally");
            }
        }
        let stats = self.stats();
        info!(%stats, "Worker pool shut down");
        stats
    }

    /// Current counters
    pub fn stats(&self) -> WorkerPoolStats {
        WorkerPoolStats {
            workers: self.worker_count,
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            queued: self.queue.len(),
        }
    }

    /// Executor shared by all workers
    pub fn executor(&self) -> &ResilientExecutor<C> {
        &self.executor
    }

    /// `true` once the queue has been closed
    pub fn is_shut_down(&self) -> bool {
        self.queue.is_closed()
    }
}

impl<C: Clock + Clone> Drop for WorkerPool<C> {
    fn drop(&mut self) {
        self.queue.close();
    }
}

impl<C: Clock + Clone> fmt::Debug for WorkerPool<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool").field("stats", &self.stats()).finish()
    }
}

async fn worker_loop(id: usize, queue: WorkQueue<Job>, counters: Arc<Counters>) {
    debug!(worker = id, "Worker started");
    while let Ok(job) = queue.take().await {
        if AssertUnwindSafe(job()).catch_unwind().await.is_err() {
            warn!(worker = id, "Job panicked");
            counters.failed.fetch_add(1, Ordering::Relaxed);
        }
    }
    debug!(worker = id, "Worker stopped");
}
