//! Circuit breaker state and metrics snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The current state of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls pass through; failures are counted.
    #[default]
    Closed,
    /// Calls are rejected immediately.
    Open,
    /// A bounded number of probe calls test whether the fault has cleared.
    HalfOpen,
}

impl CircuitState {
    /// Returns `true` if the circuit is closed.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Returns `true` if the circuit is open.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Returns `true` if the circuit is half-open.
    pub fn is_half_open(&self) -> bool {
        matches!(self, Self::HalfOpen)
    }

    /// Returns the name of the state.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Point-in-time view of a circuit breaker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BreakerMetrics {
    /// Effective state at the time of the snapshot.
    pub state: CircuitState,
    /// Consecutive failures with no intervening success.
    pub failures: u32,
    /// Consecutive successes with no intervening failure.
    pub successes: u32,
    /// Wall-clock time of the most recent failure.
    pub last_failure: Option<DateTime<Utc>>,
    /// Calls presented to the breaker, admitted or not.
    pub total_requests: u64,
    /// Calls rejected without running the operation.
    pub rejected_requests: u64,
    /// Number of transitions into `Open`.
    pub times_opened: u64,
    /// Number of transitions into `Closed` from another state.
    pub times_closed: u64,
}

impl BreakerMetrics {
    /// Returns the fraction of presented calls that were rejected.
    pub fn rejection_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        self.rejected_requests as f64 / self.total_requests as f64
    }
}
