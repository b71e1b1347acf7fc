//! Token bucket rate limiter.

use crate::core::{Error, ResilienceError};
use crate::rate_limiter::config::RateLimiterConfig;

use futures::TryFutureExt;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Absorbs float rounding between a computed wait and the refill it buys.
const TOKEN_EPSILON: f64 = 1e-9;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Point-in-time view of a rate limiter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimiterMetrics {
    /// Tokens currently available.
    pub tokens: f64,
    /// Configured refill rate in tokens per second.
    pub rate: f64,
    /// Configured bucket capacity.
    pub burst: u32,
    /// Calls admitted since creation.
    pub admitted: u64,
    /// Calls refused since creation.
    pub rejected: u64,
}

/// A token-bucket admission gate.
///
/// Tokens accrue continuously at `rate` per second up to `burst`. The refill
/// is applied lazily on every access; there is no background timer.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    bucket: Mutex<Bucket>,
    admitted: AtomicU64,
    rejected: AtomicU64,
}

impl RateLimiter {
    /// Creates a rate limiter with a full bucket.
    pub fn new(config: RateLimiterConfig) -> Self {
        let bucket = Bucket {
            tokens: f64::from(config.burst),
            last_refill: Instant::now(),
        };
        Self {
            config,
            bucket: Mutex::new(bucket),
            admitted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// Creates a rate limiter with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(RateLimiterConfig::default())
    }

    /// Returns a reference to the configuration.
    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    /// Takes one token if available.
    pub fn allow(&self) -> bool {
        self.allow_n(1)
    }

    /// Takes `n` tokens if that many are available; takes nothing otherwise.
    pub fn allow_n(&self, n: u32) -> bool {
        let granted = {
            let mut bucket = self.refilled();
            take(&mut bucket, f64::from(n))
        };
        self.record(granted);
        granted
    }

    /// Waits for one token.
    pub async fn wait(&self, token: &CancellationToken) -> Result<(), ResilienceError> {
        self.wait_n(token, 1).await
    }

    /// Waits for `n` tokens, blocking at most `max_wait`.
    ///
    /// Admission is re-checked once after the wait; a bucket that still falls
    /// short fails with [`ResilienceError::RateLimitExceeded`]. Requests for
    /// more than `burst` tokens can never succeed and fail immediately.
    pub async fn wait_n(&self, token: &CancellationToken, n: u32) -> Result<(), ResilienceError> {
        if n > self.config.burst {
            self.record(false);
            return Err(ResilienceError::RateLimitExceeded);
        }

        let needed = f64::from(n);
        let shortfall = {
            let mut bucket = self.refilled();
            if take(&mut bucket, needed) {
                drop(bucket);
                self.record(true);
                return Ok(());
            }
            needed - bucket.tokens
        };

        let delay = self.wait_for(shortfall);
        tracing::debug!(
            tokens = n,
            delay_ms = delay.as_millis() as u64,
            "Waiting for rate limiter tokens"
        );

        tokio::select! {
            biased;
            _ = token.cancelled() => return Err(ResilienceError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }

        if self.allow_n(n) {
            Ok(())
        } else {
            tracing::debug!(tokens = n, "Rate limit exceeded after waiting");
            Err(ResilienceError::RateLimitExceeded)
        }
    }

    /// Runs `op` once the limiter admits the call.
    pub async fn execute<T, E, F, Fut>(&self, token: &CancellationToken, op: F) -> Result<T, Error<E>>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let child = token.clone();
        self.guard(token, async move { op(child).map_err(Error::Operation).await })
            .await
    }

    pub(crate) async fn guard<T, E, Fut>(&self, token: &CancellationToken, fut: Fut) -> Result<T, Error<E>>
    where
        Fut: Future<Output = Result<T, Error<E>>>,
    {
        if self.config.wait {
            self.wait(token).await?;
        } else if !self.allow() {
            tracing::debug!("Rate limit exceeded, call rejected");
            return Err(ResilienceError::RateLimitExceeded.into());
        }
        fut.await
    }

    /// Returns the tokens currently available.
    pub fn tokens(&self) -> f64 {
        self.refilled().tokens
    }

    /// Refills the bucket to capacity.
    pub fn reset(&self) {
        let mut bucket = self.lock();
        bucket.tokens = f64::from(self.config.burst);
        bucket.last_refill = Instant::now();
    }

    /// Returns a snapshot of the limiter's state.
    pub fn metrics(&self) -> RateLimiterMetrics {
        RateLimiterMetrics {
            tokens: self.tokens(),
            rate: self.config.rate,
            burst: self.config.burst,
            admitted: self.admitted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Bucket> {
        self.bucket
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Locks the bucket after adding the tokens accrued since the last access.
    fn refilled(&self) -> MutexGuard<'_, Bucket> {
        let mut bucket = self.lock();
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(bucket.last_refill).as_secs_f64();
        let burst = f64::from(self.config.burst);
        bucket.tokens = (bucket.tokens + elapsed * self.config.rate.max(0.0)).min(burst);
        bucket.last_refill = now;
        bucket
    }

    fn wait_for(&self, shortfall: f64) -> Duration {
        let max_wait = self.config.max_wait;
        if self.config.rate <= 0.0 {
            return max_wait;
        }
        Duration::try_from_secs_f64(shortfall / self.config.rate)
            .unwrap_or(max_wait)
            .min(max_wait)
    }

    fn record(&self, granted: bool) {
        if granted {
            self.admitted.fetch_add(1, Ordering::Relaxed);
        } else {
            self.rejected.fetch_add(1, Ordering::Relaxed);
        }
    }
}

fn take(bucket: &mut Bucket, needed: f64) -> bool {
    if bucket.tokens + TOKEN_EPSILON >= needed {
        bucket.tokens = (bucket.tokens - needed).max(0.0);
        true
    } else {
        false
    }
}
