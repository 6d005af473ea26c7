use std::fmt;

use crate::error::ResilienceError;

/// Error returned by [`WorkQueue::try_put`](super::WorkQueue::try_put) when
/// the item cannot be queued immediately
///
/// The rejected item is handed back to the caller.
#[derive(Debug, PartialEq, Eq)]
pub enum TryPutError<T> {
    /// The queue was at capacity
    Full(T),
    /// The queue has been closed
    Closed(T),
}

impl<T> TryPutError<T> {
    /// Recover the rejected item
    #[must_use]
    pub fn into_inner(self) -> T {
        match self {
            TryPutError::Full(item) | TryPutError::Closed(item) => item,
        }
    }

    /// `true` when the rejection was caused by a closed queue
    pub fn is_closed(&self) -> bool {
        matches!(self, TryPutError::Closed(_))
    }
}

impl<T> fmt::Display for TryPutError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TryPutError::Full(_) => f.write_str("work queue is full"),
            TryPutError::Closed(_) => f.write_str("work queue is closed"),
        }
    }
}

impl<T: fmt::Debug> std::error::Error for TryPutError<T> {}

impl<T> From<TryPutError<T>> for ResilienceError {
    /// `Full` has no blocking-path counterpart; it maps to a zero-length
    /// timeout, which is what a non-blocking put amounts to.
    fn from(err: TryPutError<T>) -> Self {
        match err {
            TryPutError::Full(_) => ResilienceError::Timeout { timeout: std::time::Duration::ZERO },
            TryPutError::Closed(_) => ResilienceError::QueueClosed,
        }
    }
}
