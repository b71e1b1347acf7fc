//! Token-bucket rate limiting.
//!
//! The bucket holds up to `burst` tokens and refills continuously at `rate`
//! tokens per second. Each admitted call spends one token. Callers choose
//! between failing fast with [`RateLimiter::allow`] and blocking for up to
//! `max_wait` with [`RateLimiter::wait`].
//!
//! ```rust,ignore
//! use bulwark::rate_limiter::{RateLimiter, RateLimiterConfig};
//!
//! let limiter = RateLimiter::new(RateLimiterConfig::new().with_rate(50.0).with_burst(5));
//! if limiter.allow() {
//!     // send the request
//! }
//! ```

mod bucket;
mod config;

pub use bucket::{RateLimiter, RateLimiterMetrics};
pub use config::RateLimiterConfig;
