//! Bounded waiting for blocking operations
//!
//! [`WaitLimit`] carries an optional timeout and an optional cancellation
//! token. Every blocking primitive (`acquire`, `put`, `take`) has a variant
//! accepting one. Expiry drops the in-flight wait future, so the primitives'
//! wait futures must only commit state in the same poll that returns `Ready`.

use std::future::{pending, Future};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::ResilienceError;

/// Optional deadline and cancellation signal for a blocking call
#[derive(Debug, Clone, Default)]
pub struct WaitLimit {
    timeout: Option<Duration>,
    cancel: Option<CancellationToken>,
}

impl WaitLimit {
    /// No limit; waits indefinitely
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Give up after `timeout`
    pub fn timeout(timeout: Duration) -> Self {
        Self { timeout: Some(timeout), cancel: None }
    }

    /// Give up when `token` is cancelled
    pub fn cancel(token: CancellationToken) -> Self {
        Self { timeout: None, cancel: Some(token) }
    }

    /// Add (or replace) the timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Add (or replace) the cancellation token
    #[must_use]
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Configured timeout, if any
    pub fn timeout_duration(&self) -> Option<Duration> {
        self.timeout
    }

    /// `true` when neither a timeout nor a token is set
    pub fn is_unbounded(&self) -> bool {
        self.timeout.is_none() && self.cancel.is_none()
    }

    /// Drive `fut` until it completes or the limit trips
    ///
    /// Cancellation wins over a simultaneously ready `fut`; a ready `fut` wins
    /// over a simultaneously expired timeout.
    pub(crate) async fn run<F>(&self, fut: F) -> Result<F::Output, ResilienceError>
    where
        F: Future,
    {
        let cancelled = async {
            match &self.cancel {
                Some(token) => token.cancelled().await,
                None => pending::<()>().await,
            }
        };
        let expired = async {
            match self.timeout {
                Some(timeout) => {
                    tokio::time::sleep(timeout).await;
                    timeout
                }
                None => pending::<Duration>().await,
            }
        };

        tokio::select! {
            biased;
            () = cancelled => Err(ResilienceError::Cancelled),
            output = fut => Ok(output),
            timeout = expired => Err(ResilienceError::Timeout { timeout }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unbounded_passes_output_through() {
        let limit = WaitLimit::unbounded();
        assert!(limit.is_unbounded());
        let value = limit.run(async { 7 }).await.expect("ready future");
        assert_eq!(value, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_trips_on_pending_future() {
        let limit = WaitLimit::timeout(Duration::from_millis(40));
        let result = limit.run(pending::<()>()).await;
        assert!(matches!(result, Err(ResilienceError::Timeout { timeout }) if timeout == Duration::from_millis(40)));
    }

    #[tokio::test]
    async fn test_cancelled_token_wins() {
        let token = CancellationToken::new();
        token.cancel();
        let limit = WaitLimit::cancel(token).with_timeout(Duration::from_secs(60));

        let result = limit.run(async { 1 }).await;
        assert!(matches!(result, Err(ResilienceError::Cancelled)));
    }

    #[tokio::test]
    async fn test_cancel_from_another_task() {
        let token = CancellationToken::new();
        let limit = WaitLimit::cancel(token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            token.cancel();
        });

        let result = limit.run(pending::<()>()).await;
        assert!(matches!(result, Err(ResilienceError::Cancelled)));
        canceller.await.expect("canceller task");
    }
}
