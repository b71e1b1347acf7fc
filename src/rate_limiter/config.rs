//! Rate limiter configuration.

use crate::core::ConfigError;

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a token-bucket rate limiter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimiterConfig {
    /// Steady-state refill rate in tokens per second.
    pub rate: f64,

    /// Bucket capacity: the most calls admitted in an instant.
    pub burst: u32,

    /// Block for a token instead of failing fast.
    pub wait: bool,

    /// Longest a caller will block for tokens.
    #[serde(with = "crate::core::serde_millis")]
    pub max_wait: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            rate: 100.0,
            burst: 10,
            wait: false,
            max_wait: Duration::from_secs(1),
        }
    }
}

impl RateLimiterConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the refill rate in tokens per second.
    pub fn with_rate(mut self, rate: f64) -> Self {
        self.rate = rate;
        self
    }

    /// Sets the bucket capacity.
    pub fn with_burst(mut self, burst: u32) -> Self {
        self.burst = burst;
        self
    }

    /// Enables or disables waiting for tokens.
    pub fn with_wait(mut self, wait: bool) -> Self {
        self.wait = wait;
        self
    }

    /// Sets the maximum wait.
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Checks that the bucket can ever admit a call.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.rate.is_finite() || self.rate <= 0.0 {
            return Err(ConfigError::invalid(
                "rate_limiter",
                format!("rate must be a positive, finite number, got {}", self.rate),
            ));
        }
        if self.burst == 0 {
            return Err(ConfigError::invalid(
                "rate_limiter",
                "burst must be at least 1",
            ));
        }
        Ok(())
    }
}
