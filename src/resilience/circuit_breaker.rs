//! Circuit breaker for the bank dependency.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: dependency assumed down, calls fail fast
//! - Half-Open: one trial call tests whether the dependency recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= failure_threshold
//! Open → Half-Open: reset_timeout elapsed since opened_at (checked lazily)
//! Half-Open → Closed: trial call succeeds
//! Half-Open → Open: trial call fails (timer restarts)
//! ```
//!
//! Admission and outcome bookkeeping each take the lock once; the wrapped
//! operation runs with no lock held. Every transition bumps a generation
//! counter and outcomes from an older generation are ignored, so a slow call
//! admitted before the circuit opened cannot close it again.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Error returned by [`CircuitBreaker::execute`].
#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    /// The circuit is open; the operation was not attempted.
    #[error("circuit breaker is open")]
    Open { retry_after: Duration },

    /// The operation ran and failed.
    #[error("{0}")]
    Inner(E),
}

/// Point-in-time view of a breaker, for operators.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub failure_threshold: u32,
    pub reset_timeout_secs: u64,
    /// Milliseconds until a trial call is allowed, while open.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

#[derive(Debug)]
struct BreakerState {
    /// `HalfOpen` is only stored while the trial call is in flight; an open
    /// circuit whose timeout elapsed is still stored as `Open`.
    state: CircuitState,
    failure_count: u32,
    opened_at: Option<Instant>,
    generation: u64,
}

/// Consecutive-failure circuit breaker, shared across request handlers.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    reset_timeout: Duration,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, failure_threshold: u32, reset_timeout: Duration) -> Self {
        let breaker = Self {
            name: name.into(),
            failure_threshold: failure_threshold.max(1),
            reset_timeout,
            state: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                opened_at: None,
                generation: 0,
            }),
        };
        metrics::record_circuit_state(&breaker.name, CircuitState::Closed);
        breaker
    }

    pub fn from_config(name: impl Into<String>, config: &CircuitBreakerConfig) -> Self {
        Self::new(name, config.failure_threshold, config.reset_timeout())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run `operation` through the breaker.
    ///
    /// Fails immediately with [`CircuitBreakerError::Open`] while the circuit
    /// is open. Any `Err` from the operation counts as a failure.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let permit = self.acquire::<E>()?;

        match operation().await {
            Ok(value) => {
                permit.succeed();
                Ok(value)
            }
            Err(e) => {
                permit.fail();
                Err(CircuitBreakerError::Inner(e))
            }
        }
    }

    /// The logical state: an open circuit whose timeout has elapsed reads as half-open.
    pub fn state(&self) -> CircuitState {
        let state = self.lock();
        self.logical_state(&state, Instant::now())
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let state = self.lock();
        let now = Instant::now();
        let logical = self.logical_state(&state, now);
        let retry_after_ms = match (logical, state.opened_at) {
            (CircuitState::Open, Some(opened_at)) => Some(
                self.reset_timeout
                    .saturating_sub(now.duration_since(opened_at))
                    .as_millis() as u64,
            ),
            _ => None,
        };

        CircuitSnapshot {
            name: self.name.clone(),
            state: logical,
            failure_count: state.failure_count,
            failure_threshold: self.failure_threshold,
            reset_timeout_secs: self.reset_timeout.as_secs(),
            retry_after_ms,
        }
    }

    /// Force the circuit closed and forget past failures.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.state = CircuitState::Closed;
        state.failure_count = 0;
        state.opened_at = None;
        state.generation += 1;
        info!(breaker = %self.name, "Circuit breaker manually reset to closed");
        metrics::record_circuit_state(&self.name, CircuitState::Closed);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerState> {
        self.state.lock().expect("circuit breaker mutex poisoned")
    }

    fn logical_state(&self, state: &BreakerState, now: Instant) -> CircuitState {
        match (state.state, state.opened_at) {
            (CircuitState::Open, Some(opened_at))
                if now.duration_since(opened_at) >= self.reset_timeout =>
            {
                CircuitState::HalfOpen
            }
            (s, _) => s,
        }
    }

    fn acquire<E>(&self) -> Result<Permit<'_>, CircuitBreakerError<E>> {
        let mut state = self.lock();
        let now = Instant::now();

        match state.state {
            CircuitState::Closed => Ok(Permit::new(self, state.generation, false)),
            CircuitState::Open => {
                let elapsed = state
                    .opened_at
                    .map(|t| now.duration_since(t))
                    .unwrap_or(self.reset_timeout);

                if elapsed >= self.reset_timeout {
                    state.state = CircuitState::HalfOpen;
                    state.generation += 1;
                    info!(breaker = %self.name, "Circuit breaker half-open, admitting trial call");
                    metrics::record_circuit_state(&self.name, CircuitState::HalfOpen);
                    Ok(Permit::new(self, state.generation, true))
                } else {
                    let retry_after = self.reset_timeout - elapsed;
                    debug!(breaker = %self.name, retry_after_ms = retry_after.as_millis() as u64, "Circuit open, failing fast");
                    metrics::record_circuit_rejection(&self.name);
                    Err(CircuitBreakerError::Open { retry_after })
                }
            }
            CircuitState::HalfOpen => {
                debug!(breaker = %self.name, "Trial call in flight, failing fast");
                metrics::record_circuit_rejection(&self.name);
                Err(CircuitBreakerError::Open {
                    retry_after: Duration::ZERO,
                })
            }
        }
    }

    fn on_success(&self, generation: u64, trial: bool) {
        let mut state = self.lock();
        if state.generation != generation {
            return;
        }

        if trial && state.state == CircuitState::HalfOpen {
            state.state = CircuitState::Closed;
            state.failure_count = 0;
            state.opened_at = None;
            state.generation += 1;
            info!(breaker = %self.name, "Trial call succeeded, circuit closed");
            metrics::record_circuit_state(&self.name, CircuitState::Closed);
        } else if state.state == CircuitState::Closed {
            state.failure_count = 0;
        }
    }

    fn on_failure(&self, generation: u64, trial: bool) {
        let mut state = self.lock();
        if state.generation != generation {
            return;
        }

        match state.state {
            CircuitState::Closed => {
                state.failure_count = state.failure_count.saturating_add(1);
                if state.failure_count >= self.failure_threshold {
                    self.trip(&mut state);
                } else {
                    debug!(
                        breaker = %self.name,
                        failure_count = state.failure_count,
                        threshold = self.failure_threshold,
                        "Call failed"
                    );
                }
            }
            // The count stays at the value that first tripped the circuit.
            CircuitState::HalfOpen if trial => {
                self.trip(&mut state);
            }
            _ => {}
        }
    }

    fn trip(&self, state: &mut BreakerState) {
        state.state = CircuitState::Open;
        state.opened_at = Some(Instant::now());
        state.generation += 1;
        warn!(
            breaker = %self.name,
            failure_count = state.failure_count,
            reset_timeout_secs = self.reset_timeout.as_secs(),
            "Circuit breaker opened"
        );
        metrics::record_circuit_state(&self.name, CircuitState::Open);
    }
}

/// Admission ticket for one call. Dropping an unsettled trial permit (the
/// caller's future was cancelled) counts as a failed trial.
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    trial: bool,
    settled: bool,
}

impl<'a> Permit<'a> {
    fn new(breaker: &'a CircuitBreaker, generation: u64, trial: bool) -> Self {
        Self {
            breaker,
            generation,
            trial,
            settled: false,
        }
    }

    fn succeed(mut self) {
        self.settled = true;
        self.breaker.on_success(self.generation, self.trial);
    }

    fn fail(mut self) {
        self.settled = true;
        self.breaker.on_failure(self.generation, self.trial);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.settled && self.trial {
            self.breaker.on_failure(self.generation, true);
        }
    }
}
