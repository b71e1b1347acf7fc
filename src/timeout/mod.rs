//! Deadline enforcement.
//!
//! [`Timeout`] runs the operation on its own task and races it against a
//! deadline. The operation receives a child of the caller's token that is
//! cancelled when the deadline fires, so cooperative operations stop early.
//!
//! An operation that ignores its token keeps running on its task after
//! `execute` has returned [`ResilienceError::Timeout`]; only its result is
//! discarded.

use crate::core::{ConfigError, Error, ResilienceError};

use futures::TryFutureExt;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Configuration for a timeout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Time allowed for the operation.
    #[serde(with = "crate::core::serde_millis")]
    pub duration: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(30),
        }
    }
}

impl TimeoutConfig {
    /// Checks that the deadline is in the future.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.duration.is_zero() {
            return Err(ConfigError::invalid("timeout", "duration must be non-zero"));
        }
        Ok(())
    }
}

/// Races an operation against a fixed deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeout {
    duration: Duration,
}

impl Timeout {
    /// Creates a timeout with the given duration.
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }

    /// Creates a timeout from its configuration.
    pub fn from_config(config: &TimeoutConfig) -> Self {
        Self::new(config.duration)
    }

    /// Returns the configured duration.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Runs `op` with a deadline.
    ///
    /// Returns the operation's result if it finishes first,
    /// [`ResilienceError::Timeout`] if the deadline fires first, and
    /// [`ResilienceError::Cancelled`] if the caller cancels `token`.
    pub async fn execute<T, E, F, Fut>(&self, token: &CancellationToken, op: F) -> Result<T, Error<E>>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let deadline = token.child_token();
        let fut = op(deadline.clone()).map_err(Error::Operation);
        race(self.duration, token.clone(), deadline, fut).await
    }
}

impl Default for Timeout {
    fn default() -> Self {
        Self::from_config(&TimeoutConfig::default())
    }
}

/// Spawns `fut` and waits for it, the caller's cancellation, or the deadline.
///
/// `deadline` must be a child of `token`; it is cancelled on every exit.
pub(crate) async fn race<T, E, Fut>(
    duration: Duration,
    token: CancellationToken,
    deadline: CancellationToken,
    fut: Fut,
) -> Result<T, Error<E>>
where
    Fut: Future<Output = Result<T, Error<E>>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    let _deadline = deadline.drop_guard();
    let mut task = tokio::spawn(fut);

    tokio::select! {
        biased;
        _ = token.cancelled() => Err(ResilienceError::Cancelled.into()),
        joined = &mut task => match joined {
            Ok(result) => result,
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(_) => Err(ResilienceError::Cancelled.into()),
        },
        _ = tokio::time::sleep(duration) => {
            tracing::debug!(
                timeout_ms = duration.as_millis() as u64,
                "Operation deadline elapsed"
            );
            Err(ResilienceError::Timeout.into())
        }
    }
}
