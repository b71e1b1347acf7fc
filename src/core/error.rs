//! Error types for the bulwark library.
//!
//! Every protective layer reports its own failures as a [`ResilienceError`]
//! sentinel, while the operation's own error travels through untouched inside
//! [`Error::Operation`]. Callers branch on kind, never on message text.

use std::error::Error as StdError;
use thiserror::Error;

/// Sentinel failures raised by the protective layers themselves.
///
/// These are plain, comparable values: test them with `==` or `matches!`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum ResilienceError {
    /// The circuit breaker rejected the call without invoking the operation.
    ///
    /// Also returned when the half-open probe budget is exhausted.
    #[error("circuit breaker is open")]
    CircuitOpen,

    /// The retry policy gave up without a final operation error to report.
    #[error("maximum retry attempts exceeded")]
    MaxRetriesExceeded,

    /// The rate limiter had no token for the call.
    #[error("rate limit exceeded")]
    RateLimitExceeded,

    /// The bulkhead had no free slot for the call.
    #[error("bulkhead is full")]
    BulkheadFull,

    /// The operation did not finish before its deadline.
    #[error("operation timed out")]
    Timeout,

    /// The caller cancelled the call.
    #[error("operation was cancelled")]
    Cancelled,
}

impl ResilienceError {
    /// Returns `true` if the call was turned away before the operation ran.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::CircuitOpen | Self::RateLimitExceeded | Self::BulkheadFull
        )
    }

    /// Returns a stable, lowercase name for logs and metrics labels.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CircuitOpen => "circuit_open",
            Self::MaxRetriesExceeded => "max_retries_exceeded",
            Self::RateLimitExceeded => "rate_limit_exceeded",
            Self::BulkheadFull => "bulkhead_full",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
        }
    }
}

/// The error returned by every `execute` call.
///
/// `E` is the error type of the wrapped operation.
#[derive(Debug, Error)]
pub enum Error<E> {
    /// A protective layer failed the call.
    #[error("{0}")]
    Resilience(#[source] ResilienceError),

    /// The operation ran and returned this error.
    #[error("{0}")]
    Operation(#[source] E),
}

impl<E> Error<E> {
    /// Returns the sentinel if a protective layer produced this error.
    pub fn kind(&self) -> Option<ResilienceError> {
        match self {
            Self::Resilience(kind) => Some(*kind),
            Self::Operation(_) => None,
        }
    }

    /// Returns the operation's own error, if that is what this is.
    pub fn operation(&self) -> Option<&E> {
        match self {
            Self::Operation(err) => Some(err),
            Self::Resilience(_) => None,
        }
    }

    /// Consumes the error and returns the operation's error, if any.
    pub fn into_operation(self) -> Option<E> {
        match self {
            Self::Operation(err) => Some(err),
            Self::Resilience(_) => None,
        }
    }

    /// Returns `true` for [`ResilienceError::CircuitOpen`].
    pub fn is_circuit_open(&self) -> bool {
        self.kind() == Some(ResilienceError::CircuitOpen)
    }

    /// Returns `true` for [`ResilienceError::RateLimitExceeded`].
    pub fn is_rate_limited(&self) -> bool {
        self.kind() == Some(ResilienceError::RateLimitExceeded)
    }

    /// Returns `true` for [`ResilienceError::BulkheadFull`].
    pub fn is_bulkhead_full(&self) -> bool {
        self.kind() == Some(ResilienceError::BulkheadFull)
    }

    /// Returns `true` for [`ResilienceError::Timeout`].
    pub fn is_timeout(&self) -> bool {
        self.kind() == Some(ResilienceError::Timeout)
    }

    /// Returns `true` for [`ResilienceError::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        self.kind() == Some(ResilienceError::Cancelled)
    }
}

impl<E> From<ResilienceError> for Error<E> {
    fn from(kind: ResilienceError) -> Self {
        Self::Resilience(kind)
    }
}

impl<E> PartialEq<ResilienceError> for Error<E> {
    fn eq(&self, other: &ResilienceError) -> bool {
        self.kind() == Some(*other)
    }
}

/// Finds the first error of type `X` in `err` or its source chain.
///
/// Failure and retry predicates receive errors as trait objects; this is
/// how they recover either a [`ResilienceError`] or the operation's concrete
/// error type.
///
/// ```rust
/// use bulwark::{find_source, Error, ResilienceError};
///
/// let err: Error<std::io::Error> = ResilienceError::Timeout.into();
/// assert_eq!(
///     find_source::<ResilienceError>(&err),
///     Some(&ResilienceError::Timeout)
/// );
/// ```
pub fn find_source<'a, X>(err: &'a (dyn StdError + 'static)) -> Option<&'a X>
where
    X: StdError + 'static,
{
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(found) = e.downcast_ref::<X>() {
            return Some(found);
        }
        current = e.source();
    }
    None
}

/// Error type for configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration document could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// A configured value is out of range.
    #[error("invalid {component} configuration: {message}")]
    Invalid {
        /// Component the value belongs to.
        component: &'static str,
        /// Description of the problem.
        message: String,
    },
}

impl ConfigError {
    /// Creates an `Invalid` error.
    pub fn invalid(component: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            component,
            message: message.into(),
        }
    }
}
