//! Caller-supplied hooks shared by the components.

use crate::circuit_breaker::CircuitState;

use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

/// Classifies an error returned through a protective layer.
///
/// The argument is the [`Error`](crate::Error) seen by the layer, erased to a
/// trait object; use [`find_source`](crate::find_source) to inspect it.
pub type ErrorPredicate = Arc<dyn Fn(&(dyn StdError + 'static)) -> bool + Send + Sync>;

/// Invoked with `(from, to)` on every circuit state transition.
pub type StateChangeHook = Arc<dyn Fn(CircuitState, CircuitState) + Send + Sync>;

/// Invoked with `(attempt, error, delay)` before sleeping ahead of a retry.
pub type RetryHook = Arc<dyn Fn(u32, &(dyn StdError + 'static), Duration) + Send + Sync>;
