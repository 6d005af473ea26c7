//! Error taxonomy shared by every resilex primitive
//!
//! All four primitives (pool, queue, retry, circuit breaker) and the composed
//! executor report failures through a single enum, [`ResilienceError`]. It is
//! generic over the error type `E` of the wrapped operation so that the
//! original failure survives as a `#[source]` and can be inspected by callers
//! through [`std::error::Error::source`].
//!
//! Primitives that never run user operations (the pool and the queue) use the
//! default `E = Infallible`.
//!
//! | Variant | Raised by | Recoverable |
//! |---------|-----------|-------------|
//! | `InvalidConfig` | constructors and `validate()` | no, fix the parameters |
//! | `Timeout` / `Cancelled` | any bounded wait | yes, caller decides |
//! | `RetriesExhausted` | `RetryPolicy` | propagated with the last failure |
//! | `CircuitOpen` | `CircuitBreaker` | try again later |
//! | `InvalidRelease` | `ResourcePool::release` | programmer error |
//! | `QueueClosed` | `WorkQueue` | no more items will flow |
//! | `OperationFailed` | breaker pass-through, non-retryable failures | depends on `E` |
//!
//! Internal conditions (lock contention, counter arithmetic) never surface:
//! the table above is the complete external error surface.

use std::convert::Infallible;
use std::time::Duration;

use thiserror::Error;

/// Errors produced by resilex primitives
#[derive(Debug, Error)]
pub enum ResilienceError<E = Infallible>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// A construction-time parameter was rejected
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// A bounded wait expired before the operation could proceed
    #[error("Operation timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// A bounded wait was cancelled through its cancellation token
    #[error("Operation cancelled")]
    Cancelled,

    /// Every retry attempt failed; `source` is the last failure
    #[error("All {attempts} retry attempts exhausted")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: E,
    },

    /// The circuit breaker is rejecting calls
    #[error("Circuit breaker is open, rejecting calls")]
    CircuitOpen,

    /// A slot was released that is not currently held
    #[error("Slot {index} is not held and cannot be released")]
    InvalidRelease { index: usize },

    /// The queue no longer accepts items, or is closed and drained
    #[error("Work queue is closed")]
    QueueClosed,

    /// The wrapped operation failed and the failure was passed through
    #[error("Operation failed")]
    OperationFailed {
        #[source]
        source: E,
    },
}

/// Result alias for resilex operations
pub type ResilienceResult<T, E = Infallible> = Result<T, ResilienceError<E>>;

/// Severity levels used when logging or alerting on errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Expected condition, nothing to act on
    Info,
    /// Degraded but operational
    Warning,
    /// Needs attention
    Error,
    /// Invariant or configuration broken
    Critical,
}

/// Classification of errors by retryability and severity
pub trait ErrorClassification {
    /// Whether retrying the same call later may succeed
    fn is_retryable(&self) -> bool;

    /// Severity for logging and alerting
    fn severity(&self) -> ErrorSeverity;
}

impl<E> ResilienceError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Shorthand for building an [`ResilienceError::InvalidConfig`]
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig { message: message.into() }
    }

    /// `true` for "try again later" conditions that say nothing about the
    /// wrapped operation itself
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Cancelled | Self::CircuitOpen)
    }

    /// Borrow the underlying operation failure, if this error carries one
    pub fn operation_error(&self) -> Option<&E> {
        match self {
            Self::RetriesExhausted { source, .. } | Self::OperationFailed { source } => {
                Some(source)
            }
            _ => None,
        }
    }

    /// Consume the error and return the underlying operation failure, if any
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            Self::RetriesExhausted { source, .. } | Self::OperationFailed { source } => {
                Some(source)
            }
            _ => None,
        }
    }

    /// Re-type an error that carries no operation failure
    ///
    /// Used to lift pool and queue errors (`E = Infallible`) into the error
    /// type of a wrapped operation. Variants carrying a source are mapped
    /// through `f`.
    pub fn map_source<F, E2>(self, f: F) -> ResilienceError<E2>
    where
        F: FnOnce(E) -> E2,
        E2: std::error::Error + Send + Sync + 'static,
    {
        match self {
            Self::InvalidConfig { message } => ResilienceError::InvalidConfig { message },
            Self::Timeout { timeout } => ResilienceError::Timeout { timeout },
            Self::Cancelled => ResilienceError::Cancelled,
            Self::RetriesExhausted { attempts, source } => {
                ResilienceError::RetriesExhausted { attempts, source: f(source) }
            }
            Self::CircuitOpen => ResilienceError::CircuitOpen,
            Self::InvalidRelease { index } => ResilienceError::InvalidRelease { index },
            Self::QueueClosed => ResilienceError::QueueClosed,
            Self::OperationFailed { source } => {
                ResilienceError::OperationFailed { source: f(source) }
            }
        }
    }
}

impl ResilienceError<Infallible> {
    /// Lift an error without an operation failure into any error type
    pub fn lift<E>(self) -> ResilienceError<E>
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.map_source(|never| match never {})
    }
}

impl<E> ResilienceError<ResilienceError<E>>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Collapse the error of one resilience layer wrapped in another
    ///
    /// `OperationFailed` unwraps to the inner error. `RetriesExhausted` keeps
    /// its attempt count when the inner error is itself an operation failure
    /// and yields the inner error otherwise. Every other variant is carried
    /// over unchanged.
    pub fn flatten(self) -> ResilienceError<E> {
        match self {
            Self::OperationFailed { source } => source,
            Self::RetriesExhausted { attempts, source } => match source {
                ResilienceError::OperationFailed { source } => {
                    ResilienceError::RetriesExhausted { attempts, source }
                }
                other => other,
            },
            Self::InvalidConfig { message } => ResilienceError::InvalidConfig { message },
            Self::Timeout { timeout } => ResilienceError::Timeout { timeout },
            Self::Cancelled => ResilienceError::Cancelled,
            Self::CircuitOpen => ResilienceError::CircuitOpen,
            Self::InvalidRelease { index } => ResilienceError::InvalidRelease { index },
            Self::QueueClosed => ResilienceError::QueueClosed,
        }
    }
}

impl<E> ErrorClassification for ResilienceError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::CircuitOpen | Self::OperationFailed { .. })
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Cancelled => ErrorSeverity::Info,
            Self::Timeout { .. } | Self::CircuitOpen | Self::QueueClosed => ErrorSeverity::Warning,
            Self::RetriesExhausted { .. } | Self::OperationFailed { .. } => ErrorSeverity::Error,
            Self::InvalidConfig { .. } | Self::InvalidRelease { .. } => ErrorSeverity::Critical,
        }
    }
}
