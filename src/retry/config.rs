//! Retry configuration and backoff calculation.

use crate::core::ConfigError;

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Fraction of the capped delay that jitter may add on top.
const JITTER_FRACTION: f64 = 0.25;

/// How the delay between attempts grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    /// `initial_delay * multiplier^(attempt - 1)`.
    #[default]
    Exponential,
    /// `initial_delay * attempt`.
    Linear,
    /// `initial_delay` every time.
    Constant,
}

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total number of tries, including the first.
    pub max_attempts: u32,

    /// Base delay before the first retry.
    #[serde(with = "crate::core::serde_millis")]
    pub initial_delay: Duration,

    /// Upper bound on the computed delay, applied before jitter.
    #[serde(with = "crate::core::serde_millis")]
    pub max_delay: Duration,

    /// Growth factor for exponential backoff.
    pub multiplier: f64,

    /// Shape of the backoff curve.
    pub backoff: Backoff,

    /// Whether to add up to 25% random delay on top of the computed delay.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            backoff: Backoff::Exponential,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Creates a new retry configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Disables retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Sets the maximum number of attempts.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier.max(1.0);
        self
    }

    /// Sets the backoff shape.
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay after the given failed attempt (1-indexed), capped at
    /// `max_delay` and without jitter.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let initial = self.initial_delay.as_secs_f64();
        let secs = match self.backoff {
            Backoff::Constant => initial,
            Backoff::Linear => initial * f64::from(attempt),
            Backoff::Exponential => {
                let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
                initial * self.multiplier.powi(exponent)
            }
        };

        // `min` also absorbs overflow to infinity.
        let capped = secs.min(self.max_delay.as_secs_f64()).max(0.0);
        Duration::try_from_secs_f64(capped)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Delay to wait after the given failed attempt (1-indexed), with jitter
    /// applied when enabled.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.base_delay(attempt);
        if self.jitter {
            let extra = delay.as_secs_f64() * fastrand::f64() * JITTER_FRACTION;
            delay.saturating_add(Duration::try_from_secs_f64(extra).unwrap_or(Duration::ZERO))
        } else {
            delay
        }
    }

    /// Returns whether another attempt may follow the given one.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Checks that the configuration describes a usable backoff.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(ConfigError::invalid(
                "retry",
                format!("multiplier must be a finite value >= 1.0, got {}", self.multiplier),
            ));
        }
        if self.max_delay < self.initial_delay {
            return Err(ConfigError::invalid(
                "retry",
                "max_delay must not be shorter than initial_delay",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.initial_delay, Duration::from_millis(100));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert_eq!(config.backoff, Backoff::Exponential);
        assert!(config.jitter);
    }

    #[test]
    fn test_no_retry() {
        let config = RetryConfig::no_retry();
        assert_eq!(config.max_attempts, 1);
        assert!(!config.should_retry(1));
    }

    #[test]
    fn test_exponential_delay() {
        let config = RetryConfig::new()
            .with_initial_delay(Duration::from_millis(100))
            .with_multiplier(2.0)
            .with_jitter(false);

        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(400));
    }

    #[test]
    fn test_linear_and_constant_delay() {
        let linear = RetryConfig::new()
            .with_backoff(Backoff::Linear)
            .with_jitter(false);
        assert_eq!(linear.delay_for_attempt(3), Duration::from_millis(300));

        let constant = RetryConfig::new()
            .with_backoff(Backoff::Constant)
            .with_jitter(false);
        assert_eq!(constant.delay_for_attempt(5), Duration::from_millis(100));
    }

    #[test]
    fn test_delay_capped() {
        let config = RetryConfig::new()
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5))
            .with_multiplier(10.0)
            .with_jitter(false);

        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(5));
        assert_eq!(config.delay_for_attempt(u32::MAX), Duration::from_secs(5));
    }

    #[test]
    fn test_unbounded_max_delay_saturates() {
        let config = RetryConfig::new()
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::MAX);
        assert!(config.validate().is_ok());

        assert_eq!(config.base_delay(200), Duration::MAX);
        assert_eq!(config.delay_for_attempt(200), Duration::MAX);
        assert!(config.delay_for_attempt(1) >= Duration::from_secs(1));
    }

    #[test]
    fn test_jitter_stays_within_quarter() {
        let config = RetryConfig::new().with_initial_delay(Duration::from_millis(400));
        for _ in 0..100 {
            let delay = config.delay_for_attempt(1);
            assert!(delay >= Duration::from_millis(400));
            assert!(delay <= Duration::from_millis(500));
        }
    }

    #[test]
    fn test_should_retry() {
        let config = RetryConfig::new().with_max_attempts(3);
        assert!(config.should_retry(1));
        assert!(config.should_retry(2));
        assert!(!config.should_retry(3));
    }

    #[test]
    fn test_validate() {
        assert!(RetryConfig::default().validate().is_ok());

        let config = RetryConfig {
            multiplier: 0.5,
            ..RetryConfig::default()
        };
        assert!(config.validate().is_err());

        let config = RetryConfig::new()
            .with_initial_delay(Duration::from_secs(5))
            .with_max_delay(Duration::from_secs(1));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_backoff() {
        let config: RetryConfig =
            serde_json::from_str(r#"{"backoff": "linear", "initial_delay": 250}"#).unwrap();
        assert_eq!(config.backoff, Backoff::Linear);
        assert_eq!(config.initial_delay, Duration::from_millis(250));
        assert_eq!(config.max_attempts, 3);
    }
}
