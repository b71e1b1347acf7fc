//! # Bulwark
//!
//! Client-side resilience primitives for async Rust: circuit breaking,
//! retries with backoff, token-bucket rate limiting, concurrency bulkheads
//! and deadlines, plus an executor that composes them.
//!
//! ## Overview
//!
//! Each component guards a unit of work supplied by the caller. A unit of
//! work is a closure that receives a [`CancellationToken`] and returns a
//! future resolving to `Result<T, E>`. Every call returns
//! `Result<T, Error<E>>`, where [`Error`] is either one of the library's
//! own [`ResilienceError`] signals or the operation's error, unchanged.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use bulwark::prelude::*;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let executor = Executor::builder()
//!         .with_rate_limiter(RateLimiter::new(RateLimiterConfig::new().with_rate(20.0)))
//!         .with_circuit_breaker(CircuitBreaker::with_defaults().with_name("inventory"))
//!         .with_retry(RetryPolicy::new(RetryConfig::new().with_max_attempts(3)))
//!         .with_timeout(Timeout::new(Duration::from_secs(2)))
//!         .build();
//!
//!     let token = CancellationToken::new();
//!     let body = executor
//!         .execute(&token, |token| async move { fetch_inventory(token).await })
//!         .await?;
//!
//!     println!("{body}");
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **Core**: Error types, hook signatures and serde helpers
//! - **Circuit Breaker**: Stops calling a dependency that keeps failing
//! - **Retry**: Re-runs failed attempts with backoff and jitter
//! - **Rate Limiter**: Token bucket admission
//! - **Bulkhead**: Caps concurrent calls
//! - **Timeout**: Bounds each attempt with a deadline
//! - **Executor**: Composes the above in a fixed order

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod bulkhead;
pub mod circuit_breaker;
pub mod core;
pub mod executor;
pub mod rate_limiter;
pub mod retry;
pub mod timeout;

pub use tokio_util::sync::CancellationToken;

// Re-export commonly used types at the crate root
pub use crate::core::{
    find_source, ConfigError, Error, ErrorPredicate, ResilienceError, RetryHook, StateChangeHook,
};

pub use crate::bulkhead::{Bulkhead, BulkheadConfig, BulkheadMetrics, BulkheadPermit};
pub use crate::circuit_breaker::{
    BreakerMetrics, CircuitBreaker, CircuitBreakerConfig, CircuitState,
};
pub use crate::executor::{Executor, ExecutorBuilder, ExecutorMetrics, ResilienceConfig};
pub use crate::rate_limiter::{RateLimiter, RateLimiterConfig, RateLimiterMetrics};
pub use crate::retry::{Backoff, RetryConfig, RetryPolicy};
pub use crate::timeout::{Timeout, TimeoutConfig};

/// Prelude module for convenient imports.
///
/// ```rust
/// use bulwark::prelude::*;
/// ```
pub mod prelude {
    pub use crate::bulkhead::{Bulkhead, BulkheadConfig};
    pub use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
    pub use crate::core::{Error, ResilienceError};
    pub use crate::executor::{Executor, ResilienceConfig};
    pub use crate::rate_limiter::{RateLimiter, RateLimiterConfig};
    pub use crate::retry::{Backoff, RetryConfig, RetryPolicy};
    pub use crate::timeout::Timeout;
    pub use tokio_util::sync::CancellationToken;
}
