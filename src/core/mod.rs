//! Core types shared by every component.
//!
//! - [`error`] - Sentinel failures, the `execute` error wrapper, config errors
//! - [`hooks`] - Predicate and callback types attached to components
//! - [`serde_millis`] - Millisecond encoding for configured durations

pub mod error;
pub mod hooks;
pub mod serde_millis;

pub use error::{find_source, ConfigError, Error, ResilienceError};
pub use hooks::{ErrorPredicate, RetryHook, StateChangeHook};
