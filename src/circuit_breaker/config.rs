//! Circuit breaker configuration.

use crate::core::ConfigError;

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a circuit breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,

    /// Consecutive half-open successes that close the circuit.
    pub success_threshold: u32,

    /// How long the circuit stays open before probing.
    #[serde(with = "crate::core::serde_millis")]
    pub cooldown: Duration,

    /// Maximum number of concurrent probes in the half-open state.
    pub max_half_open_probes: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 1,
            cooldown: Duration::from_secs(30),
            max_half_open_probes: 1,
        }
    }
}

impl CircuitBreakerConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the failure threshold.
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Sets the success threshold.
    pub fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }

    /// Sets the cooldown.
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Sets the maximum number of concurrent half-open probes.
    pub fn with_max_half_open_probes(mut self, max: u32) -> Self {
        self.max_half_open_probes = max;
        self
    }

    /// Creates a configuration that trips early and recovers cautiously.
    ///
    /// This configuration:
    /// - Opens after 3 failures
    /// - Stays open for 60 seconds
    /// - Requires 2 successful probes to close
    pub fn strict() -> Self {
        Self {
            failure_threshold: 3,
            success_threshold: 2,
            cooldown: Duration::from_secs(60),
            max_half_open_probes: 1,
        }
    }

    /// Creates a configuration that tolerates more failures and probes sooner.
    ///
    /// This configuration:
    /// - Opens after 10 failures
    /// - Stays open for 10 seconds
    /// - Allows 3 concurrent probes
    pub fn high_availability() -> Self {
        Self {
            failure_threshold: 10,
            success_threshold: 1,
            cooldown: Duration::from_secs(10),
            max_half_open_probes: 3,
        }
    }

    /// Checks that the configuration can drive a working breaker.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::invalid(
                "circuit_breaker",
                "failure_threshold must be at least 1",
            ));
        }
        if self.success_threshold == 0 {
            return Err(ConfigError::invalid(
                "circuit_breaker",
                "success_threshold must be at least 1",
            ));
        }
        if self.max_half_open_probes == 0 {
            return Err(ConfigError::invalid(
                "circuit_breaker",
                "max_half_open_probes must be at least 1",
            ));
        }
        Ok(())
    }
}
