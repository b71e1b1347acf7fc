//! Circuit breaker implementation.

use crate::circuit_breaker::config::CircuitBreakerConfig;
use crate::circuit_breaker::state::{BreakerMetrics, CircuitState};
use crate::core::{Error, ErrorPredicate, ResilienceError, StateChangeHook};

use chrono::{DateTime, Utc};
use futures::TryFutureExt;
use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

type Transition = Option<(CircuitState, CircuitState)>;

/// Mutable breaker state, always accessed under the breaker's lock.
#[derive(Debug, Default)]
struct Core {
    state: CircuitState,
    failures: u32,
    successes: u32,
    last_failure: Option<Instant>,
    last_failure_at: Option<DateTime<Utc>>,
    half_open_probes: u32,
    /// Bumped on every transition so stale probe releases can be ignored.
    generation: u64,
    total_requests: u64,
    rejected_requests: u64,
    times_opened: u64,
    times_closed: u64,
}

impl Core {
    fn transition(&mut self, to: CircuitState) -> Transition {
        let from = self.state;
        if from == to {
            return None;
        }

        self.state = to;
        self.generation += 1;
        self.half_open_probes = 0;
        match to {
            CircuitState::Open => self.times_opened += 1,
            CircuitState::HalfOpen => self.successes = 0,
            CircuitState::Closed => {
                self.failures = 0;
                self.successes = 0;
                self.times_closed += 1;
            }
        }
        Some((from, to))
    }

    /// Moves `Open` to `HalfOpen` once the cooldown has elapsed.
    fn refresh(&mut self, config: &CircuitBreakerConfig, now: Instant) -> Transition {
        if self.state != CircuitState::Open {
            return None;
        }
        let cooled = self
            .last_failure
            .map_or(true, |at| now.saturating_duration_since(at) >= config.cooldown);
        if cooled {
            self.transition(CircuitState::HalfOpen)
        } else {
            None
        }
    }

    fn record_failure(&mut self, config: &CircuitBreakerConfig) -> Transition {
        self.failures = self.failures.saturating_add(1);
        self.successes = 0;
        self.last_failure = Some(Instant::now());
        self.last_failure_at = Some(Utc::now());

        match self.state {
            CircuitState::Closed if self.failures >= config.failure_threshold => {
                self.transition(CircuitState::Open)
            }
            CircuitState::HalfOpen => self.transition(CircuitState::Open),
            _ => None,
        }
    }

    fn record_success(&mut self, config: &CircuitBreakerConfig) -> Transition {
        match self.state {
            CircuitState::Closed => {
                self.failures = 0;
                self.successes = self.successes.saturating_add(1);
                None
            }
            CircuitState::HalfOpen => {
                self.successes = self.successes.saturating_add(1);
                if self.successes >= config.success_threshold {
                    self.transition(CircuitState::Closed)
                } else {
                    None
                }
            }
            // A call admitted before another probe reopened the circuit.
            CircuitState::Open => None,
        }
    }
}

/// Tracks consecutive failures of an operation class and rejects calls once
/// the failure threshold is crossed.
///
/// # States
///
/// - **Closed**: Normal operation. Calls pass through, failures are counted.
/// - **Open**: The operation is failing. Calls are rejected immediately.
/// - **Half-Open**: Probing. A limited number of calls are allowed through
///   to test if the operation has recovered.
///
/// The move from `Open` to `HalfOpen` is computed lazily whenever the state
/// is read; there is no background timer.
///
/// # Example
///
/// ```rust,ignore
/// use bulwark::{CircuitBreaker, CircuitBreakerConfig, CancellationToken};
///
/// let breaker = CircuitBreaker::new(CircuitBreakerConfig::default().with_failure_threshold(3));
/// let token = CancellationToken::new();
/// let body = breaker.execute(&token, |_| async { fetch().await }).await?;
/// ```
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    core: Mutex<Core>,
    failure_predicate: Option<ErrorPredicate>,
    on_state_change: Option<StateChangeHook>,
}

impl CircuitBreaker {
    /// Creates a new circuit breaker with the given configuration.
    ///
    /// Zero thresholds and a zero probe cap are raised to one.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        let config = CircuitBreakerConfig {
            failure_threshold: config.failure_threshold.max(1),
            success_threshold: config.success_threshold.max(1),
            max_half_open_probes: config.max_half_open_probes.max(1),
            ..config
        };
        Self {
            name: "circuit_breaker".to_string(),
            config,
            core: Mutex::new(Core::default()),
            failure_predicate: None,
            on_state_change: None,
        }
    }

    /// Creates a new circuit breaker with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }

    /// Sets the name used in log events.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the predicate deciding which errors count as failures.
    ///
    /// Errors the predicate rejects are treated as successes. By default
    /// every error is a failure.
    pub fn with_failure_predicate<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&(dyn StdError + 'static)) -> bool + Send + Sync + 'static,
    {
        self.failure_predicate = Some(Arc::new(predicate));
        self
    }

    /// Sets a callback invoked with `(from, to)` on every state transition.
    ///
    /// The callback runs after the breaker's lock is released.
    pub fn on_state_change<H>(mut self, hook: H) -> Self
    where
        H: Fn(CircuitState, CircuitState) + Send + Sync + 'static,
    {
        self.on_state_change = Some(Arc::new(hook));
        self
    }

    /// Returns the name used in log events.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns a reference to the configuration.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Returns the effective state, moving to half-open if the cooldown has
    /// elapsed.
    pub fn state(&self) -> CircuitState {
        let (state, transition) = {
            let mut core = self.lock();
            let transition = core.refresh(&self.config, Instant::now());
            (core.state, transition)
        };
        self.notify(transition);
        state
    }

    /// Returns a snapshot of the breaker's counters.
    pub fn metrics(&self) -> BreakerMetrics {
        let (metrics, transition) = {
            let mut core = self.lock();
            let transition = core.refresh(&self.config, Instant::now());
            let metrics = BreakerMetrics {
                state: core.state,
                failures: core.failures,
                successes: core.successes,
                last_failure: core.last_failure_at,
                total_requests: core.total_requests,
                rejected_requests: core.rejected_requests,
                times_opened: core.times_opened,
                times_closed: core.times_closed,
            };
            (metrics, transition)
        };
        self.notify(transition);
        metrics
    }

    /// Forces the circuit closed and clears the consecutive counters.
    pub fn reset(&self) {
        let transition = {
            let mut core = self.lock();
            let transition = core.transition(CircuitState::Closed);
            core.failures = 0;
            core.successes = 0;
            core.half_open_probes = 0;
            transition
        };
        self.notify(transition);
    }

    /// Forces the circuit open, starting a fresh cooldown.
    pub fn force_open(&self) {
        let transition = {
            let mut core = self.lock();
            core.last_failure = Some(Instant::now());
            core.last_failure_at = Some(Utc::now());
            core.transition(CircuitState::Open)
        };
        self.notify(transition);
    }

    /// Runs `op` if the circuit admits the call.
    ///
    /// Rejected calls fail with [`ResilienceError::CircuitOpen`] and never
    /// invoke `op`. The operation's result is returned unchanged.
    pub async fn execute<T, E, F, Fut>(&self, token: &CancellationToken, op: F) -> Result<T, Error<E>>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: StdError + 'static,
    {
        let token = token.clone();
        self.guard(async move { op(token).map_err(Error::Operation).await })
            .await
    }

    /// Admits `fut` through the breaker and records its outcome.
    pub(crate) async fn guard<T, E, Fut>(&self, fut: Fut) -> Result<T, Error<E>>
    where
        Fut: Future<Output = Result<T, Error<E>>>,
        E: StdError + 'static,
    {
        let permit = self.admit()?;
        let result = fut.await;
        let failed = match &result {
            Ok(_) => false,
            Err(err) => self.is_failure(err),
        };
        permit.settle(failed);
        result
    }

    fn admit(&self) -> Result<Permit<'_>, ResilienceError> {
        let (admitted, transition) = {
            let mut core = self.lock();
            let transition = core.refresh(&self.config, Instant::now());
            core.total_requests += 1;

            let admitted = match core.state {
                CircuitState::Closed => Ok(None),
                CircuitState::HalfOpen
                    if core.half_open_probes < self.config.max_half_open_probes =>
                {
                    core.half_open_probes += 1;
                    Ok(Some(core.generation))
                }
                CircuitState::Open | CircuitState::HalfOpen => {
                    core.rejected_requests += 1;
                    Err(ResilienceError::CircuitOpen)
                }
            };
            (admitted, transition)
        };
        self.notify(transition);

        match admitted {
            Ok(probe) => Ok(Permit {
                breaker: self,
                probe,
                settled: false,
            }),
            Err(err) => {
                tracing::debug!(breaker = %self.name, "Circuit open, call rejected");
                Err(err)
            }
        }
    }

    fn is_failure(&self, err: &(dyn StdError + 'static)) -> bool {
        match &self.failure_predicate {
            Some(predicate) => predicate(err),
            None => true,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Core> {
        self.core
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn notify(&self, transition: Transition) {
        let Some((from, to)) = transition else {
            return;
        };

        if to.is_open() {
            tracing::warn!(breaker = %self.name, from = %from, to = %to, "Circuit state changed");
        } else {
            tracing::info!(breaker = %self.name, from = %from, to = %to, "Circuit state changed");
        }

        if let Some(hook) = &self.on_state_change {
            hook(from, to);
        }
    }
}

/// An admitted call. Dropping it unsettled hands a half-open probe slot back.
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    /// Generation the probe was admitted in, if this call is a probe.
    probe: Option<u64>,
    settled: bool,
}

impl Permit<'_> {
    fn settle(mut self, failed: bool) {
        self.settled = true;
        let transition = {
            let mut core = self.breaker.lock();
            release_probe(&mut core, self.probe);
            if failed {
                core.record_failure(&self.breaker.config)
            } else {
                core.record_success(&self.breaker.config)
            }
        };
        self.breaker.notify(transition);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            let mut core = self.breaker.lock();
            release_probe(&mut core, self.probe);
        }
    }
}

fn release_probe(core: &mut Core, probe: Option<u64>) {
    if probe == Some(core.generation) {
        core.half_open_probes = core.half_open_probes.saturating_sub(1);
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.lock().state)
            .field("config", &self.config)
            .field("failure_predicate", &self.failure_predicate.is_some())
            .field("on_state_change", &self.on_state_change.is_some())
            .finish()
    }
}
