//! Bounded retry with configurable backoff.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bulwark::retry::{Backoff, RetryConfig, RetryPolicy};
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::new(
//!     RetryConfig::default()
//!         .with_max_attempts(4)
//!         .with_backoff(Backoff::Linear)
//!         .with_initial_delay(Duration::from_millis(50)),
//! );
//! ```

mod config;
mod policy;

pub use config::{Backoff, RetryConfig};
pub use policy::RetryPolicy;
