//! The retry loop.

use crate::core::{Error, ErrorPredicate, ResilienceError, RetryHook};
use crate::retry::config::RetryConfig;

use futures::TryFutureExt;
use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Re-invokes a failed operation with backoff between attempts.
///
/// The policy is stateless across calls: every `execute` runs its own
/// attempt loop, so one instance can be shared freely.
#[derive(Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
    retry_if: Option<ErrorPredicate>,
    on_retry: Option<RetryHook>,
}

impl RetryPolicy {
    /// Creates a retry policy from the given configuration.
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            retry_if: None,
            on_retry: None,
        }
    }

    /// Sets the predicate deciding which errors are worth another attempt.
    ///
    /// By default every error is retried.
    pub fn with_retry_if<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&(dyn StdError + 'static)) -> bool + Send + Sync + 'static,
    {
        self.retry_if = Some(Arc::new(predicate));
        self
    }

    /// Sets a callback invoked with `(attempt, error, delay)` before each
    /// backoff sleep.
    pub fn on_retry<H>(mut self, hook: H) -> Self
    where
        H: Fn(u32, &(dyn StdError + 'static), Duration) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(hook));
        self
    }

    /// Returns a reference to the configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Runs `op` until it succeeds, returns a non-retryable error, or the
    /// attempts run out.
    ///
    /// Only the final attempt's error is returned. Cancelling `token` during
    /// a backoff sleep ends the loop with [`ResilienceError::Cancelled`].
    pub async fn execute<T, E, F, Fut>(&self, token: &CancellationToken, op: F) -> Result<T, Error<E>>
    where
        F: FnMut(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: StdError + 'static,
    {
        let mut op = op;
        self.run(token, |token| op(token).map_err(Error::Operation))
            .await
    }

    pub(crate) async fn run<T, E, F, Fut>(&self, token: &CancellationToken, mut op: F) -> Result<T, Error<E>>
    where
        F: FnMut(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, Error<E>>>,
        E: StdError + 'static,
    {
        if self.config.max_attempts == 0 {
            return Err(ResilienceError::MaxRetriesExceeded.into());
        }

        let mut attempt = 1;
        loop {
            let err = match op(token.clone()).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !self.is_retryable(&err) || !self.config.should_retry(attempt) {
                return Err(err);
            }

            let delay = self.config.delay_for_attempt(attempt);
            if let Some(hook) = &self.on_retry {
                hook(attempt, &err, delay);
            }
            tracing::debug!(
                attempt = attempt,
                max_attempts = self.config.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Retrying operation"
            );

            tokio::select! {
                biased;
                _ = token.cancelled() => return Err(ResilienceError::Cancelled.into()),
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }

    fn is_retryable(&self, err: &(dyn StdError + 'static)) -> bool {
        match &self.retry_if {
            Some(predicate) => predicate(err),
            None => true,
        }
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("config", &self.config)
            .field("retry_if", &self.retry_if.is_some())
            .field("on_retry", &self.on_retry.is_some())
            .finish()
    }
}
