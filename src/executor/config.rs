//! Aggregate configuration for an [`Executor`].

use crate::bulkhead::{Bulkhead, BulkheadConfig};
use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::core::ConfigError;
use crate::executor::{Executor, ExecutorBuilder};
use crate::rate_limiter::{RateLimiter, RateLimiterConfig};
use crate::retry::{RetryConfig, RetryPolicy};
use crate::timeout::{Timeout, TimeoutConfig};

use serde::{Deserialize, Serialize};

/// Configuration for every layer of an executor.
///
/// Absent sections leave the corresponding layer out. Durations are
/// expressed in milliseconds:
///
/// ```json
/// {
///   "rate_limiter": { "rate": 50.0, "burst": 5 },
///   "circuit_breaker": { "failure_threshold": 3, "cooldown": 10000 },
///   "retry": { "max_attempts": 4 },
///   "timeout": { "duration": 2000 }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Rate limiter section.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limiter: Option<RateLimiterConfig>,

    /// Bulkhead section.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bulkhead: Option<BulkheadConfig>,

    /// Circuit breaker section.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub circuit_breaker: Option<CircuitBreakerConfig>,

    /// Retry section.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,

    /// Timeout section.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<TimeoutConfig>,
}

impl ResilienceConfig {
    /// Parses a configuration from JSON and validates it.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes the configuration to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Validates every present section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(config) = &self.rate_limiter {
            config.validate()?;
        }
        if let Some(config) = &self.bulkhead {
            config.validate()?;
        }
        if let Some(config) = &self.circuit_breaker {
            config.validate()?;
        }
        if let Some(config) = &self.retry {
            config.validate()?;
        }
        if let Some(config) = &self.timeout {
            config.validate()?;
        }
        Ok(())
    }

    /// Returns a builder preloaded with the configured layers.
    ///
    /// Hooks can be attached to components before they are handed to the
    /// builder; use this when the plain configuration is enough.
    pub fn builder(&self) -> Result<ExecutorBuilder, ConfigError> {
        self.validate()?;

        let mut builder = Executor::builder();
        if let Some(config) = &self.rate_limiter {
            builder = builder.with_rate_limiter(RateLimiter::new(config.clone()));
        }
        if let Some(config) = &self.bulkhead {
            builder = builder.with_bulkhead(Bulkhead::new(config.clone()));
        }
        if let Some(config) = &self.circuit_breaker {
            builder = builder.with_circuit_breaker(CircuitBreaker::new(config.clone()));
        }
        if let Some(config) = &self.retry {
            builder = builder.with_retry(RetryPolicy::new(config.clone()));
        }
        if let Some(config) = &self.timeout {
            builder = builder.with_timeout(Timeout::from_config(config));
        }
        Ok(builder)
    }

    /// Validates the configuration and builds an executor from it.
    pub fn build_executor(&self) -> Result<Executor, ConfigError> {
        Ok(self.builder()?.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_from_json_partial_sections() {
        let config = ResilienceConfig::from_json(
            r#"{
                "circuit_breaker": { "failure_threshold": 3, "cooldown": 10000 },
                "timeout": { "duration": 2000 }
            }"#,
        )
        .unwrap();

        let breaker = config.circuit_breaker.as_ref().unwrap();
        assert_eq!(breaker.failure_threshold, 3);
        assert_eq!(breaker.cooldown, Duration::from_secs(10));
        assert_eq!(breaker.max_half_open_probes, 1);
        assert_eq!(config.timeout.unwrap().duration, Duration::from_secs(2));
        assert!(config.retry.is_none());
        assert!(config.rate_limiter.is_none());
    }

    #[test]
    fn test_build_executor_includes_configured_layers() {
        let config = ResilienceConfig {
            rate_limiter: Some(RateLimiterConfig::new().with_burst(2)),
            retry: Some(RetryConfig::no_retry()),
            ..Default::default()
        };

        let executor = config.build_executor().unwrap();
        assert!(executor.rate_limiter().is_some());
        assert!(executor.retry().is_some());
        assert!(executor.bulkhead().is_none());
        assert!(executor.circuit_breaker().is_none());
        assert!(executor.timeout().is_none());
    }

    #[test]
    fn test_invalid_section_rejected() {
        let err = ResilienceConfig::from_json(r#"{ "bulkhead": { "max_concurrent": 0 } }"#)
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                component: "bulkhead",
                ..
            }
        ));

        let err = ResilienceConfig::from_json(
            r#"{ "bulkhead": { "max_concurrent": 18446744073709551615 } }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));

        let err = ResilienceConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_json_round_trip_skips_absent_sections() {
        let config = ResilienceConfig {
            timeout: Some(TimeoutConfig {
                duration: Duration::from_millis(1500),
            }),
            ..Default::default()
        };

        let json = config.to_json().unwrap();
        assert!(json.contains("1500"));
        assert!(!json.contains("retry"));
        assert_eq!(ResilienceConfig::from_json(&json).unwrap(), config);
    }
}
