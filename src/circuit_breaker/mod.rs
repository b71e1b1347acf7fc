//! Circuit breaker for failing dependencies.
//!
//! The breaker stops traffic to a dependency after consecutive failures and
//! periodically lets a probe through to detect recovery.
//!
//! ## States
//!
//! - **Closed**: Normal operation; calls pass through and failures are counted.
//! - **Open**: Calls are rejected with `CircuitOpen` until the cooldown elapses.
//! - **Half-Open**: A limited number of probes decide whether to close again.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bulwark::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
//! use std::time::Duration;
//!
//! let config = CircuitBreakerConfig::default()
//!     .with_failure_threshold(5)
//!     .with_cooldown(Duration::from_secs(30));
//!
//! let breaker = CircuitBreaker::new(config).with_name("payments");
//! ```

mod breaker;
mod config;
mod state;

pub use breaker::CircuitBreaker;
pub use config::CircuitBreakerConfig;
pub use state::{BreakerMetrics, CircuitState};
