//! Counting-semaphore bulkhead.

use crate::core::{ConfigError, Error, ResilienceError};

use futures::TryFutureExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio_util::sync::CancellationToken;

/// Configuration for a bulkhead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkheadConfig {
    /// Maximum number of operations in flight at once.
    pub max_concurrent: usize,

    /// How long to wait for a free slot; zero fails fast.
    #[serde(with = "crate::core::serde_millis")]
    pub max_wait: Duration,
}

impl Default for BulkheadConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 10,
            max_wait: Duration::ZERO,
        }
    }
}

impl BulkheadConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the capacity.
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max;
        self
    }

    /// Sets the maximum wait for a slot.
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Checks that the bulkhead has at least one slot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent == 0 {
            return Err(ConfigError::invalid(
                "bulkhead",
                "max_concurrent must be at least 1",
            ));
        }
        if self.max_concurrent > Semaphore::MAX_PERMITS {
            return Err(ConfigError::invalid(
                "bulkhead",
                format!("max_concurrent must not exceed {}", Semaphore::MAX_PERMITS),
            ));
        }
        Ok(())
    }
}

/// Point-in-time view of a bulkhead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkheadMetrics {
    /// Slots currently held.
    pub active: usize,
    /// Highest number of slots ever held at once.
    pub max_active: usize,
    /// Slots currently free.
    pub available: usize,
    /// Configured capacity.
    pub capacity: usize,
    /// Acquisitions that failed for lack of a slot.
    pub rejected: u64,
}

#[derive(Debug, Default)]
struct Stats {
    active: usize,
    max_active: usize,
    rejected: u64,
}

/// Limits how many operations run concurrently.
///
/// Slots come from a semaphore; a separate lock only guards the counters
/// reported by [`metrics`](Bulkhead::metrics).
pub struct Bulkhead {
    config: BulkheadConfig,
    semaphore: Semaphore,
    stats: Mutex<Stats>,
}

impl Bulkhead {
    /// Creates a bulkhead. The capacity is clamped to `1..=Semaphore::MAX_PERMITS`.
    pub fn new(config: BulkheadConfig) -> Self {
        let config = BulkheadConfig {
            max_concurrent: config.max_concurrent.clamp(1, Semaphore::MAX_PERMITS),
            ..config
        };
        Self {
            semaphore: Semaphore::new(config.max_concurrent),
            config,
            stats: Mutex::new(Stats::default()),
        }
    }

    /// Creates a bulkhead with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(BulkheadConfig::default())
    }

    /// Returns a reference to the configuration.
    pub fn config(&self) -> &BulkheadConfig {
        &self.config
    }

    /// Claims a slot.
    ///
    /// Fails with [`ResilienceError::BulkheadFull`] when no slot frees up
    /// within `max_wait`, or with [`ResilienceError::Cancelled`] if `token`
    /// is cancelled while waiting.
    pub async fn acquire(&self, token: &CancellationToken) -> Result<BulkheadPermit<'_>, ResilienceError> {
        let permit = match self.semaphore.try_acquire() {
            Ok(permit) => permit,
            Err(_) if self.config.max_wait.is_zero() => return Err(self.reject()),
            Err(_) => self.wait_for_slot(token).await?,
        };

        {
            let mut stats = self.stats();
            stats.active += 1;
            stats.max_active = stats.max_active.max(stats.active);
        }

        Ok(BulkheadPermit {
            bulkhead: self,
            _permit: permit,
        })
    }

    /// Runs `op` while holding a slot.
    ///
    /// The slot is returned on every exit path, including a panic in `op`.
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
        let _permit = self.acquire(token).await?;
        fut.await
    }

    /// Returns a snapshot of the bulkhead's counters.
    pub fn metrics(&self) -> BulkheadMetrics {
        let stats = self.stats();
        BulkheadMetrics {
            active: stats.active,
            max_active: stats.max_active,
            available: self.semaphore.available_permits(),
            capacity: self.config.max_concurrent,
            rejected: stats.rejected,
        }
    }

    async fn wait_for_slot(&self, token: &CancellationToken) -> Result<SemaphorePermit<'_>, ResilienceError> {
        tracing::debug!(
            max_wait_ms = self.config.max_wait.as_millis() as u64,
            "Bulkhead full, waiting for a slot"
        );

        tokio::select! {
            biased;
            _ = token.cancelled() => Err(ResilienceError::Cancelled),
            acquired = tokio::time::timeout(self.config.max_wait, self.semaphore.acquire()) => {
                match acquired {
                    Ok(Ok(permit)) => Ok(permit),
                    _ => Err(self.reject()),
                }
            }
        }
    }

    fn reject(&self) -> ResilienceError {
        self.stats().rejected += 1;
        tracing::debug!(
            capacity = self.config.max_concurrent,
            "Bulkhead full, call rejected"
        );
        ResilienceError::BulkheadFull
    }

    fn stats(&self) -> MutexGuard<'_, Stats> {
        self.stats
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for Bulkhead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bulkhead")
            .field("config", &self.config)
            .field("available", &self.semaphore.available_permits())
            .finish()
    }
}

/// A held bulkhead slot. Dropping it returns the slot.
#[must_use = "the slot is released as soon as the permit is dropped"]
pub struct BulkheadPermit<'a> {
    bulkhead: &'a Bulkhead,
    _permit: SemaphorePermit<'a>,
}

impl BulkheadPermit<'_> {
    /// Returns the slot to the bulkhead.
    pub fn release(self) {}
}

impl Drop for BulkheadPermit<'_> {
    fn drop(&mut self) {
        let mut stats = self.bulkhead.stats();
        stats.active = stats.active.saturating_sub(1);
    }
}

impl fmt::Debug for BulkheadPermit<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BulkheadPermit").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::Arc;

    fn bulkhead(capacity: usize) -> Bulkhead {
        Bulkhead::new(BulkheadConfig::new().with_max_concurrent(capacity))
    }

    #[tokio::test]
    async fn test_capacity_and_release() {
        let bulkhead = bulkhead(2);
        let token = CancellationToken::new();

        let first = bulkhead.acquire(&token).await.unwrap();
        let _second = bulkhead.acquire(&token).await.unwrap();
        assert_eq!(
            bulkhead.acquire(&token).await.unwrap_err(),
            ResilienceError::BulkheadFull
        );

        first.release();
        let _third = bulkhead.acquire(&token).await.unwrap();

        let metrics = bulkhead.metrics();
        assert_eq!(metrics.active, 2);
        assert_eq!(metrics.max_active, 2);
        assert_eq!(metrics.available, 0);
        assert_eq!(metrics.capacity, 2);
        assert_eq!(metrics.rejected, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_released_slot() {
        let bulkhead = Bulkhead::new(
            BulkheadConfig::new()
                .with_max_concurrent(1)
                .with_max_wait(Duration::from_millis(50)),
        );
        let token = CancellationToken::new();
        let held = bulkhead.acquire(&token).await.unwrap();

        let (_, acquired) = tokio::join!(
            async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                held.release();
            },
            bulkhead.acquire(&token)
        );

        assert!(acquired.is_ok());
        assert_eq!(bulkhead.metrics().rejected, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_expires() {
        let bulkhead = Bulkhead::new(
            BulkheadConfig::new()
                .with_max_concurrent(1)
                .with_max_wait(Duration::from_millis(50)),
        );
        let token = CancellationToken::new();
        let _held = bulkhead.acquire(&token).await.unwrap();

        let err = bulkhead.acquire(&token).await.unwrap_err();
        assert_eq!(err, ResilienceError::BulkheadFull);
        assert_eq!(bulkhead.metrics().rejected, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_cancelled() {
        let bulkhead = Bulkhead::new(
            BulkheadConfig::new()
                .with_max_concurrent(1)
                .with_max_wait(Duration::from_secs(5)),
        );
        let token = CancellationToken::new();
        let _held = bulkhead.acquire(&token).await.unwrap();

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let err = bulkhead.acquire(&token).await.unwrap_err();
        assert_eq!(err, ResilienceError::Cancelled);
    }

    #[tokio::test]
    async fn test_execute_releases_on_error() {
        let bulkhead = bulkhead(1);
        let token = CancellationToken::new();

        let result: Result<(), _> = bulkhead
            .execute(&token, |_| async { Err(io::Error::other("boom")) })
            .await;
        assert!(result.unwrap_err().operation().is_some());

        let metrics = bulkhead.metrics();
        assert_eq!(metrics.active, 0);
        assert_eq!(metrics.available, 1);
    }

    #[tokio::test]
    async fn test_execute_releases_on_panic() {
        let bulkhead = Arc::new(bulkhead(1));

        let task = {
            let bulkhead = Arc::clone(&bulkhead);
            tokio::spawn(async move {
                bulkhead
                    .execute(&CancellationToken::new(), |_| async {
                        if true {
                            panic!("operation panicked");
                        }
                        Ok::<(), io::Error>(())
                    })
                    .await
            })
        };

        assert!(task.await.unwrap_err().is_panic());
        let metrics = bulkhead.metrics();
        assert_eq!(metrics.active, 0);
        assert_eq!(metrics.available, 1);
    }

    #[test]
    fn test_zero_capacity_raised_to_one() {
        let bulkhead = bulkhead(0);
        assert_eq!(bulkhead.metrics().capacity, 1);
        assert!(BulkheadConfig::new().with_max_concurrent(0).validate().is_err());
    }

    #[test]
    fn test_oversized_capacity_clamped_and_rejected() {
        let config = BulkheadConfig::new().with_max_concurrent(usize::MAX);
        assert!(config.validate().is_err());

        let bulkhead = Bulkhead::new(config);
        assert_eq!(bulkhead.metrics().capacity, Semaphore::MAX_PERMITS);
        assert!(BulkheadConfig::new()
            .with_max_concurrent(Semaphore::MAX_PERMITS)
            .validate()
            .is_ok());
    }
}
