//! The composed execution pipeline.

use crate::bulkhead::{Bulkhead, BulkheadMetrics};
use crate::circuit_breaker::{BreakerMetrics, CircuitBreaker};
use crate::core::Error;
use crate::rate_limiter::{RateLimiter, RateLimiterMetrics};
use crate::retry::RetryPolicy;
use crate::timeout::{self, Timeout};

use futures::future::Either;
use futures::TryFutureExt;
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Builder for creating an [`Executor`].
#[derive(Debug, Clone, Default)]
pub struct ExecutorBuilder {
    rate_limiter: Option<Arc<RateLimiter>>,
    bulkhead: Option<Arc<Bulkhead>>,
    circuit_breaker: Option<Arc<CircuitBreaker>>,
    retry: Option<Arc<RetryPolicy>>,
    timeout: Option<Timeout>,
}

impl ExecutorBuilder {
    /// Creates a builder with no layers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the rate limiter. Accepts an owned limiter or a shared `Arc`.
    pub fn with_rate_limiter(mut self, limiter: impl Into<Arc<RateLimiter>>) -> Self {
        self.rate_limiter = Some(limiter.into());
        self
    }

    /// Sets the bulkhead.
    pub fn with_bulkhead(mut self, bulkhead: impl Into<Arc<Bulkhead>>) -> Self {
        self.bulkhead = Some(bulkhead.into());
        self
    }

    /// Sets the circuit breaker.
    pub fn with_circuit_breaker(mut self, breaker: impl Into<Arc<CircuitBreaker>>) -> Self {
        self.circuit_breaker = Some(breaker.into());
        self
    }

    /// Sets the retry policy.
    pub fn with_retry(mut self, retry: impl Into<Arc<RetryPolicy>>) -> Self {
        self.retry = Some(retry.into());
        self
    }

    /// Sets the timeout.
    pub fn with_timeout(mut self, timeout: Timeout) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Builds the executor.
    pub fn build(self) -> Executor {
        Executor {
            rate_limiter: self.rate_limiter,
            bulkhead: self.bulkhead,
            circuit_breaker: self.circuit_breaker,
            retry: self.retry,
            timeout: self.timeout,
        }
    }
}

/// Snapshot of every configured component's metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutorMetrics {
    /// Rate limiter metrics, if configured.
    pub rate_limiter: Option<RateLimiterMetrics>,
    /// Bulkhead metrics, if configured.
    pub bulkhead: Option<BulkheadMetrics>,
    /// Circuit breaker metrics, if configured.
    pub circuit_breaker: Option<BreakerMetrics>,
}

/// Composes the protective layers around a unit of work.
///
/// The order is fixed, outermost first:
///
/// ```text
/// RateLimiter -> Bulkhead -> CircuitBreaker -> Retry -> Timeout -> op
/// ```
///
/// Any layer may be absent. A rejection at one layer stops every layer
/// inside it, and the operation, from running. The executor itself holds no
/// state; components are shared through `Arc` and may also be used directly
/// or by other executors.
#[derive(Debug, Clone, Default)]
pub struct Executor {
    rate_limiter: Option<Arc<RateLimiter>>,
    bulkhead: Option<Arc<Bulkhead>>,
    circuit_breaker: Option<Arc<CircuitBreaker>>,
    retry: Option<Arc<RetryPolicy>>,
    timeout: Option<Timeout>,
}

impl Executor {
    /// Creates a new builder.
    pub fn builder() -> ExecutorBuilder {
        ExecutorBuilder::new()
    }

    /// Runs `op` through every configured layer.
    ///
    /// `op` may be invoked several times when a retry policy is configured.
    /// Each invocation receives the token for that attempt: a child token
    /// bounded by the timeout when one is configured, otherwise `token`.
    pub async fn execute<T, E, F, Fut>(&self, token: &CancellationToken, op: F) -> Result<T, Error<E>>
    where
        F: FnMut(CancellationToken) -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: StdError + Send + Sync + 'static,
    {
        let limit = self.timeout.map(|t| t.duration());
        let mut op = op;
        let mut attempt = move |token: CancellationToken| match limit {
            Some(duration) => {
                let deadline = token.child_token();
                let fut = op(deadline.clone()).map_err(Error::Operation);
                Either::Left(timeout::race(duration, token, deadline, fut))
            }
            None => Either::Right(op(token).map_err(Error::Operation)),
        };

        let retried = async {
            match &self.retry {
                Some(retry) => retry.run(token, &mut attempt).await,
                None => attempt(token.clone()).await,
            }
        };

        let guarded = async {
            match &self.circuit_breaker {
                Some(breaker) => breaker.guard(retried).await,
                None => retried.await,
            }
        };

        let isolated = async {
            match &self.bulkhead {
                Some(bulkhead) => bulkhead.guard(token, guarded).await,
                None => guarded.await,
            }
        };

        match &self.rate_limiter {
            Some(limiter) => limiter.guard(token, isolated).await,
            None => isolated.await,
        }
    }

    /// Returns the rate limiter, if configured.
    pub fn rate_limiter(&self) -> Option<&Arc<RateLimiter>> {
        self.rate_limiter.as_ref()
    }

    /// Returns the bulkhead, if configured.
    pub fn bulkhead(&self) -> Option<&Arc<Bulkhead>> {
        self.bulkhead.as_ref()
    }

    /// Returns the circuit breaker, if configured.
    pub fn circuit_breaker(&self) -> Option<&Arc<CircuitBreaker>> {
        self.circuit_breaker.as_ref()
    }

    /// Returns the retry policy, if configured.
    pub fn retry(&self) -> Option<&Arc<RetryPolicy>> {
        self.retry.as_ref()
    }

    /// Returns the timeout, if configured.
    pub fn timeout(&self) -> Option<Timeout> {
        self.timeout
    }

    /// Returns a snapshot of every configured component's metrics.
    pub fn metrics(&self) -> ExecutorMetrics {
        ExecutorMetrics {
            rate_limiter: self.rate_limiter.as_ref().map(|l| l.metrics()),
            bulkhead: self.bulkhead.as_ref().map(|b| b.metrics()),
            circuit_breaker: self.circuit_breaker.as_ref().map(|c| c.metrics()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bulkhead::BulkheadConfig;
    use crate::circuit_breaker::CircuitBreakerConfig;
    use crate::core::ResilienceError;
    use crate::rate_limiter::RateLimiterConfig;
    use crate::retry::RetryConfig;
    use std::io;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn counting_failure(
        calls: &Arc<AtomicU32>,
    ) -> impl FnMut(CancellationToken) -> futures::future::Ready<Result<(), io::Error>> + Send {
        let calls = Arc::clone(calls);
        move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            futures::future::ready(Err(io::Error::other("upstream down")))
        }
    }

    fn fast_retry(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(
            RetryConfig::new()
                .with_max_attempts(attempts)
                .with_initial_delay(Duration::from_millis(10))
                .with_jitter(false),
        )
    }

    #[tokio::test]
    async fn test_no_layers_is_passthrough() {
        let executor = Executor::builder().build();
        let token = CancellationToken::new();

        let ok: Result<&str, Error<io::Error>> =
            executor.execute(&token, |_| async { Ok("value") }).await;
        assert_eq!(ok.unwrap(), "value");

        let calls = Arc::new(AtomicU32::new(0));
        let err = executor
            .execute(&token, counting_failure(&calls))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "upstream down");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limiter_rejects_before_breaker() {
        let executor = Executor::builder()
            .with_rate_limiter(RateLimiter::new(
                RateLimiterConfig::new().with_rate(1.0).with_burst(1),
            ))
            .with_circuit_breaker(CircuitBreaker::new(
                CircuitBreakerConfig::new().with_failure_threshold(2),
            ))
            .build();
        let token = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));

        let first = executor.execute(&token, counting_failure(&calls)).await;
        assert!(first.unwrap_err().operation().is_some());

        let second = executor.execute(&token, counting_failure(&calls)).await;
        assert!(second.unwrap_err().is_rate_limited());

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let breaker = executor.metrics().circuit_breaker.unwrap();
        assert_eq!(breaker.total_requests, 1);
        assert_eq!(breaker.failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_runs_inside_breaker() {
        let executor = Executor::builder()
            .with_circuit_breaker(CircuitBreaker::new(
                CircuitBreakerConfig::new().with_failure_threshold(1),
            ))
            .with_retry(fast_retry(3))
            .build();
        let token = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));

        let first = executor.execute(&token, counting_failure(&calls)).await;
        assert!(first.unwrap_err().operation().is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let second = executor.execute(&token, counting_failure(&calls)).await;
        assert!(second.unwrap_err().is_circuit_open());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_applies_per_attempt() {
        let executor = Executor::builder()
            .with_retry(fast_retry(2))
            .with_timeout(Timeout::new(Duration::from_millis(10)))
            .build();
        let token = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));

        let result: Result<(), Error<io::Error>> = executor
            .execute(&token, {
                let calls = Arc::clone(&calls);
                move |_| {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n == 0 {
                            tokio::time::sleep(Duration::from_millis(100)).await;
                        }
                        Ok(())
                    }
                }
            })
            .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_error_surfaces_after_retries() {
        let executor = Executor::builder()
            .with_retry(fast_retry(2))
            .with_timeout(Timeout::new(Duration::from_millis(10)))
            .build();

        let result: Result<(), Error<io::Error>> = executor
            .execute(&CancellationToken::new(), |_| async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok(())
            })
            .await;

        assert_eq!(result.unwrap_err().kind(), Some(ResilienceError::Timeout));
    }

    #[tokio::test]
    async fn test_full_bulkhead_stops_inner_layers() {
        let bulkhead = Arc::new(Bulkhead::new(BulkheadConfig::new().with_max_concurrent(1)));
        let executor = Executor::builder()
            .with_bulkhead(Arc::clone(&bulkhead))
            .with_circuit_breaker(CircuitBreaker::with_defaults())
            .build();
        let token = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));

        let _held = bulkhead.acquire(&token).await.unwrap();
        let result = executor.execute(&token, counting_failure(&calls)).await;

        assert!(result.unwrap_err().is_bulkhead_full());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(executor.metrics().circuit_breaker.unwrap().total_requests, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_calls_respect_bulkhead() {
        let executor = Arc::new(
            Executor::builder()
                .with_bulkhead(Bulkhead::new(
                    BulkheadConfig::new()
                        .with_max_concurrent(2)
                        .with_max_wait(Duration::from_secs(1)),
                ))
                .with_circuit_breaker(CircuitBreaker::with_defaults())
                .build(),
        );

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let executor = Arc::clone(&executor);
                tokio::spawn(async move {
                    executor
                        .execute(&CancellationToken::new(), move |_| async move {
                            tokio::time::sleep(Duration::from_millis(10)).await;
                            Ok::<_, io::Error>(i)
                        })
                        .await
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let metrics = executor.metrics();
        let bulkhead = metrics.bulkhead.unwrap();
        assert_eq!(bulkhead.max_active, 2);
        assert_eq!(bulkhead.active, 0);
        assert_eq!(bulkhead.rejected, 0);
        assert_eq!(metrics.circuit_breaker.unwrap().total_requests, 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_during_retry_backoff() {
        let executor = Executor::builder()
            .with_retry(RetryPolicy::new(
                RetryConfig::new()
                    .with_initial_delay(Duration::from_secs(10))
                    .with_jitter(false),
            ))
            .build();
        let token = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let result = executor.execute(&token, counting_failure(&calls)).await;
        assert!(result.unwrap_err().is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
