//! Clock trait with real and mock implementations

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

/// Source of monotonic time and delays
///
/// Production code uses [`SystemClock`]; tests use [`MockClock`], whose
/// `sleep` advances virtual time immediately.
#[async_trait]
pub trait Clock: Send + Sync + 'static {
    /// Current monotonic instant
    fn now(&self) -> Instant;

    /// Suspend the calling task for `duration`
    async fn sleep(&self, duration: Duration);
}

/// Real clock backed by [`Instant::now`] and `tokio::time::sleep`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[async_trait]
impl<T: Clock> Clock for Arc<T> {
    fn now(&self) -> Instant {
        (**self).now()
    }

    async fn sleep(&self, duration: Duration) {
        (**self).sleep(duration).await;
    }
}

#[derive(Debug, Default)]
struct MockState {
    elapsed: Duration,
    sleeps: Vec<Duration>,
}

/// Deterministic clock for tests
///
/// Cloning shares the underlying state, so a clone handed to a component and
/// the copy kept by the test observe the same virtual time. `sleep` returns
/// immediately after advancing the clock by the requested amount and
/// recording it, which makes backoff schedules directly observable.
#[derive(Debug, Clone)]
pub struct MockClock {
    start: Instant,
    state: Arc<Mutex<MockState>>,
}

impl MockClock {
    /// Create a mock clock anchored at the current instant
    pub fn new() -> Self {
        Self { start: Instant::now(), state: Arc::new(Mutex::new(MockState::default())) }
    }

    /// Advance virtual time without recording a sleep
    pub fn advance(&self, duration: Duration) {
        self.state.lock().elapsed += duration;
    }

    /// Advance virtual time by `millis` milliseconds
    pub fn advance_millis(&self, millis: u64) {
        self.advance(Duration::from_millis(millis));
    }

    /// Total virtual time elapsed since creation
    pub fn elapsed(&self) -> Duration {
        self.state.lock().elapsed
    }

    /// Every delay passed to [`Clock::sleep`], in call order
    pub fn sleeps(&self) -> Vec<Duration> {
        self.state.lock().sleeps.clone()
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.start + self.state.lock().elapsed
    }

    async fn sleep(&self, duration: Duration) {
        let mut state = self.state.lock();
        state.elapsed += duration;
        state.sleeps.push(duration);
    }
}
