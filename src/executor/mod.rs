//! Composition of the protective layers.
//!
//! An [`Executor`] wraps a unit of work in every configured component, in a
//! fixed order: rate limiter, bulkhead, circuit breaker, retry, timeout.
//! Executors can be assembled by hand with [`ExecutorBuilder`] or from a
//! serialized [`ResilienceConfig`].

mod config;
#[allow(clippy::module_inception)]
mod executor;

pub use config::ResilienceConfig;
pub use executor::{Executor, ExecutorBuilder, ExecutorMetrics};
