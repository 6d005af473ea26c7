//! Circuit breaker
//!
//! A breaker stops calling a failing dependency for a cooldown period and then
//! probes it with a single trial call.
//!
//! ```text
//!            failures >= threshold
//!   Closed ──────────────────────────▶ Open
//!     ▲                                 │  now - opened_at > cooldown
//!     │ trial succeeds                  ▼  (on the next call)
//!     └──────────────────────────── HalfOpen ──▶ Open (trial fails)
//! ```
//!
//! Every admission decision and every state transition happens under one
//! mutex. Operations never run while it is held; the result of a call is
//! applied afterwards through the permit it was admitted with. Every
//! transition starts a new generation; outcomes of calls admitted in an
//! earlier generation (for example a slow call that started while Closed and
//! finishes after the breaker opened and recovered) are ignored.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::error::{ResilienceError, ResilienceResult};
use crate::observability::{counters, EventKind, Observer};
use crate::time::{Clock, SystemClock};
use crate::utils::serde::duration_millis;

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CircuitState {
    /// Calls pass through; failures are counted
    Closed,
    /// Calls are rejected until the cooldown elapses
    Open,
    /// One trial call decides between Closed and Open
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,
    /// Time the circuit stays open before a trial call is admitted
    #[serde(with = "duration_millis")]
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self { failure_threshold: 5, cooldown: Duration::from_secs(60) }
    }
}

impl CircuitBreakerConfig {
    /// Create a new configuration with validation
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }

    /// Create a configuration builder (alias for `new()`)
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> ResilienceResult<()> {
        if self.failure_threshold == 0 {
            return Err(ResilienceError::invalid_config(
                "failure_threshold must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// Builder for CircuitBreakerConfig
#[derive(Debug, Default)]
pub struct CircuitBreakerConfigBuilder {
    config: CircuitBreakerConfig,
}

impl CircuitBreakerConfigBuilder {
    /// Start from [`CircuitBreakerConfig::default`]
    pub fn new() -> Self {
        Self::default()
    }

    /// Consecutive failures that open the circuit
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    /// Open period before a trial call is admitted
    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.config.cooldown = cooldown;
        self
    }

    /// Validate and return the configuration
    pub fn build(self) -> ResilienceResult<CircuitBreakerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Point-in-time view of a breaker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerSnapshot {
    /// State at the time of the snapshot
    pub state: CircuitState,
    /// Failures counted in the current Closed period
    pub consecutive_failures: u32,
    /// Configured threshold
    pub failure_threshold: u32,
    /// When the circuit last opened, if it is not Closed
    pub opened_at: Option<Instant>,
    /// Calls admitted (normal and trial)
    pub total_calls: u64,
    /// Calls rejected with `CircuitOpen`
    pub rejected_calls: u64,
}

#[derive(Debug)]
struct BreakerCore {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
    /// Bumped on every state transition
    generation: u64,
}

impl BreakerCore {
    fn transition(&mut self, state: CircuitState) {
        self.state = state;
        self.generation = self.generation.wrapping_add(1);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PermitKind {
    Normal,
    Trial,
}

struct Shared<C> {
    config: CircuitBreakerConfig,
    core: Mutex<BreakerCore>,
    clock: C,
    observer: Observer,
    total_calls: AtomicU64,
    rejected_calls: AtomicU64,
}

/// Generic circuit breaker implementation
///
/// Cloning yields another handle to the same breaker. State can only change
/// through calls; there is no way to force a transition from outside.
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
///
/// use resilex_common::resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = CircuitBreakerConfig::new()
///     .failure_threshold(3)
///     .cooldown(Duration::from_secs(30))
///     .build()?;
/// let breaker = CircuitBreaker::new(config)?;
///
/// let value = breaker.call(|| async { Ok::<_, std::io::Error>("pong") }).await?;
/// assert_eq!(value, "pong");
/// assert_eq!(breaker.state(), CircuitState::Closed);
/// # Ok(())
/// # }
/// ```
pub struct CircuitBreaker<C: Clock = SystemClock> {
    shared: Arc<Shared<C>>,
}

impl<C: Clock> Clone for CircuitBreaker<C> {
    fn clone(&self) -> Self {
        Self { shared: Arc::clone(&self.shared) }
    }
}

impl<C: Clock> fmt::Debug for CircuitBreaker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.shared.core.lock();
        f.debug_struct("CircuitBreaker")
            .field("config", &self.shared.config)
            .field("state", &core.state)
            .field("consecutive_failures", &core.consecutive_failures)
            .finish()
    }
}

impl CircuitBreaker<SystemClock> {
    /// Create a circuit breaker backed by the system clock
    pub fn new(config: CircuitBreakerConfig) -> ResilienceResult<Self> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> CircuitBreaker<C> {
    /// Create a new circuit breaker with a custom clock (useful for testing)
    pub fn with_clock(config: CircuitBreakerConfig, clock: C) -> ResilienceResult<Self> {
        Self::with_clock_and_observer(config, clock, Observer::noop())
    }

    /// Create a breaker reporting transitions and rejections to `observer`
    pub fn with_clock_and_observer(
        config: CircuitBreakerConfig,
        clock: C,
        observer: Observer,
    ) -> ResilienceResult<Self> {
        config.validate()?;

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                core: Mutex::new(BreakerCore {
                    state: CircuitState::Closed,
                    consecutive_failures: 0,
                    opened_at: None,
                    trial_in_flight: false,
                    generation: 0,
                }),
                clock,
                observer,
                total_calls: AtomicU64::new(0),
                rejected_calls: AtomicU64::new(0),
            }),
        })
    }

    /// Configuration this breaker was built with
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.shared.config
    }

    /// Execute an operation with circuit breaker protection
    ///
    /// Fails with [`ResilienceError::CircuitOpen`] without invoking
    /// `operation` when the breaker is open, or half-open with a trial
    /// already running. A failure of the operation is returned as
    /// [`ResilienceError::OperationFailed`].
    ///
    /// Dropping the returned future while a trial call is in flight gives up
    /// the trial: the breaker stays half-open and admits the next caller.
    #[instrument(skip_all, fields(state = %self.state()))]
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> ResilienceResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let permit = self.admit().ok_or(ResilienceError::CircuitOpen)?;

        match operation().await {
            Ok(value) => {
                permit.succeed();
                Ok(value)
            }
            Err(error) => {
                debug!(error = %error, "Circuit breaker: operation failed");
                permit.fail();
                Err(ResilienceError::OperationFailed { source: error })
            }
        }
    }

    /// Execute a synchronous operation with circuit breaker protection
    #[instrument(skip_all, fields(state = %self.state()))]
    pub fn call_sync<F, T, E>(&self, operation: F) -> ResilienceResult<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let permit = self.admit().ok_or(ResilienceError::CircuitOpen)?;

        match operation() {
            Ok(value) => {
                permit.succeed();
                Ok(value)
            }
            Err(error) => {
                debug!(error = %error, "Circuit breaker: operation failed");
                permit.fail();
                Err(ResilienceError::OperationFailed { source: error })
            }
        }
    }

    /// Current state
    ///
    /// An open breaker whose cooldown has elapsed still reports `Open` until
    /// the next call moves it to `HalfOpen`.
    pub fn state(&self) -> CircuitState {
        self.shared.core.lock().state
    }

    /// Consecutive failures counted while Closed
    pub fn failure_count(&self) -> u32 {
        self.shared.core.lock().consecutive_failures
    }

    /// State, counters and configuration in one view
    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let (state, consecutive_failures, opened_at) = {
            let core = self.shared.core.lock();
            (core.state, core.consecutive_failures, core.opened_at)
        };
        CircuitBreakerSnapshot {
            state,
            consecutive_failures,
            failure_threshold: self.shared.config.failure_threshold,
            opened_at,
            total_calls: self.shared.total_calls.load(Ordering::Acquire),
            rejected_calls: self.shared.rejected_calls.load(Ordering::Acquire),
        }
    }

    /// Decide whether a call may run, moving Open to HalfOpen when the
    /// cooldown has elapsed
    fn admit(&self) -> Option<CallPermit<'_, C>> {
        let now = self.shared.clock.now();
        let mut half_opened = false;

        let admitted = {
            let mut core = self.shared.core.lock();
            let kind = match core.state {
                CircuitState::Closed => Some(PermitKind::Normal),
                CircuitState::Open => {
                    let opened_at = core.opened_at.unwrap_or(now);
                    if now.saturating_duration_since(opened_at) > self.shared.config.cooldown {
                        core.transition(CircuitState::HalfOpen);
                        core.trial_in_flight = true;
                        half_opened = true;
                        Some(PermitKind::Trial)
                    } else {
                        None
                    }
                }
                CircuitState::HalfOpen if core.trial_in_flight => None,
                CircuitState::HalfOpen => {
                    core.trial_in_flight = true;
                    Some(PermitKind::Trial)
                }
            };
            kind.map(|kind| (kind, core.generation))
        };

        if half_opened {
            debug!("Circuit breaker half-open, admitting trial call");
            self.shared.observer.emit(EventKind::CircuitHalfOpened, "cooldown elapsed");
        }

        match admitted {
            Some((kind, generation)) => {
                self.shared.total_calls.fetch_add(1, Ordering::Relaxed);
                Some(CallPermit { breaker: &self.shared, kind, generation, settled: false })
            }
            None => {
                self.shared.rejected_calls.fetch_add(1, Ordering::Relaxed);
                debug!("Circuit breaker rejecting call");
                self.shared.observer.emit(EventKind::CallRejected, "circuit open");
                self.shared.observer.count(counters::CIRCUIT_REJECTED_TOTAL);
                None
            }
        }
    }
}

/// Admission ticket for one call; applies the call's outcome exactly once
struct CallPermit<'a, C> {
    breaker: &'a Shared<C>,
    kind: PermitKind,
    /// Breaker generation at admission
    generation: u64,
    settled: bool,
}

impl<C: Clock> CallPermit<'_, C> {
    fn succeed(mut self) {
        self.settled = true;
        let closed = {
            let mut core = self.breaker.core.lock();
            if core.generation != self.generation {
                debug!(kind = ?self.kind, "Ignoring success from an earlier breaker generation");
                return;
            }
            match (self.kind, core.state) {
                (PermitKind::Normal, CircuitState::Closed) => {
                    core.consecutive_failures = 0;
                    false
                }
                (PermitKind::Trial, CircuitState::HalfOpen) => {
                    core.transition(CircuitState::Closed);
                    core.consecutive_failures = 0;
                    core.opened_at = None;
                    core.trial_in_flight = false;
                    true
                }
                _ => false,
            }
        };

        if closed {
            info!("Circuit breaker closed after successful trial call");
            self.breaker.observer.emit(EventKind::CircuitClosed, "trial call succeeded");
        }
    }

    fn fail(mut self) {
        self.settled = true;
        let now = self.breaker.clock.now();
        let threshold = self.breaker.config.failure_threshold;

        let opened = {
            let mut core = self.breaker.core.lock();
            if core.generation != self.generation {
                debug!(kind = ?self.kind, "Ignoring failure from an earlier breaker generation");
                return;
            }
            match (self.kind, core.state) {
                (PermitKind::Normal, CircuitState::Closed) => {
                    core.consecutive_failures = core.consecutive_failures.saturating_add(1);
                    if core.consecutive_failures >= threshold {
                        core.transition(CircuitState::Open);
                        core.opened_at = Some(now);
                        Some(core.consecutive_failures)
                    } else {
                        None
                    }
                }
                (PermitKind::Trial, CircuitState::HalfOpen) => {
                    core.transition(CircuitState::Open);
                    core.opened_at = Some(now);
                    core.trial_in_flight = false;
                    Some(core.consecutive_failures)
                }
                _ => None,
            }
        };

        if let Some(failures) = opened {
            let detail = match self.kind {
                PermitKind::Normal => format!("{failures} consecutive failures"),
                PermitKind::Trial => "trial call failed".to_string(),
            };
            warn!(failures, kind = ?self.kind, "Circuit breaker opened");
            self.breaker.observer.emit(EventKind::CircuitOpened, &detail);
            self.breaker.observer.count(counters::CIRCUIT_OPEN_TOTAL);
        }
    }
}

impl<C> Drop for CallPermit<'_, C> {
    fn drop(&mut self) {
        if self.settled || self.kind != PermitKind::Trial {
            return;
        }
        let mut core = self.breaker.core.lock();
        if core.generation != self.generation {
            return;
        }
        if core.state == CircuitState::HalfOpen {
            core.trial_in_flight = false;
        }
        drop(core);
        debug!("Trial call abandoned, circuit stays half-open");
    }
}
