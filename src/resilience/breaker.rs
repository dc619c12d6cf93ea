//! Circuit breaker around one outbound call shape.

use std::error::Error;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::info;

use crate::clock::Clock;

/// The breaker's externally visible state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls pass through; failures are counted.
    Closed,
    /// Calls are short-circuited without touching the downstream.
    Open,
    /// A bounded number of trial calls probe recovery.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Error type for calls made through the breaker.
#[derive(Debug, PartialEq, Eq)]
pub enum BreakerError<E> {
    /// The breaker is open (or its half-open probe quota is in use);
    /// the wrapped operation was not invoked.
    Open,
    /// The wrapped operation ran and failed.
    Inner(E),
}

impl<E: fmt::Display> fmt::Display for BreakerError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakerError::Open => write!(f, "circuit breaker is open"),
            BreakerError::Inner(e) => write!(f, "{}", e),
        }
    }
}

impl<E: fmt::Display + fmt::Debug> Error for BreakerError<E> {}

struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    probes_in_flight: u32,
    opened_at: Option<Instant>,
    window_started: Instant,
}

/// Guards one kind of outbound call.
///
/// Closed trips to open when consecutive failures exceed
/// `failure_threshold`; open admits nothing until `cooldown` elapses,
/// then half-open lets at most `probe_limit` trial calls through. The
/// probes either close the breaker again (`probe_limit` consecutive
/// successes) or reopen it on the first failure. In closed state the
/// failure counter is reset every `interval` so sporadic,
/// non-consecutive failures never trip it.
pub struct CircuitBreaker {
    clock: Arc<dyn Clock>,
    failure_threshold: u32,
    cooldown: Duration,
    probe_limit: u32,
    interval: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let window_started = clock.now();
        Self {
            clock,
            failure_threshold: 3,
            cooldown: Duration::from_secs(5),
            probe_limit: 5,
            interval: Duration::from_secs(60),
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                probes_in_flight: 0,
                opened_at: None,
                window_started,
            }),
        }
    }

    /// Consecutive failures beyond this count trip the breaker.
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// How long the breaker stays open before probing.
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Trial calls allowed while half-open.
    pub fn with_probe_limit(mut self, limit: u32) -> Self {
        self.probe_limit = limit.max(1);
        self
    }

    /// Closed-state counter reset period.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// The current state, accounting for an elapsed cool-down.
    pub fn state(&self) -> CircuitState {
        let mut inner = self.lock();
        self.refresh(&mut inner);
        inner.state
    }

    /// Run `op` through the breaker.
    ///
    /// When the breaker is open the operation is not invoked and
    /// [`BreakerError::Open`] comes back immediately.
    pub fn call<T, E, F>(&self, op: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        self.before_call()?;
        match op() {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(err) => {
                self.on_failure();
                Err(BreakerError::Inner(err))
            }
        }
    }

    fn before_call<E>(&self) -> Result<(), BreakerError<E>> {
        let mut inner = self.lock();
        self.refresh(&mut inner);

        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => Err(BreakerError::Open),
            CircuitState::HalfOpen => {
                if inner.probes_in_flight >= self.probe_limit {
                    Err(BreakerError::Open)
                } else {
                    inner.probes_in_flight += 1;
                    Ok(())
                }
            }
        }
    }

    fn on_success(&self) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                inner.probes_in_flight = inner.probes_in_flight.saturating_sub(1);
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.probe_limit {
                    self.transition(&mut inner, CircuitState::Closed);
                }
            }
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures > self.failure_threshold {
                    self.transition(&mut inner, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                self.transition(&mut inner, CircuitState::Open);
            }
            CircuitState::Open => {}
        }
    }

    /// Apply the time-driven transitions: open to half-open after the
    /// cool-down, and the closed-state rolling counter reset.
    fn refresh(&self, inner: &mut BreakerInner) {
        let now = self.clock.now();
        match inner.state {
            CircuitState::Open => {
                let expired = inner
                    .opened_at
                    .map(|at| now.duration_since(at) >= self.cooldown)
                    .unwrap_or(false);
                if expired {
                    self.transition(inner, CircuitState::HalfOpen);
                }
            }
            CircuitState::Closed => {
                if now.duration_since(inner.window_started) >= self.interval {
                    inner.consecutive_failures = 0;
                    inner.window_started = now;
                }
            }
            CircuitState::HalfOpen => {}
        }
    }

    fn transition(&self, inner: &mut BreakerInner, to: CircuitState) {
        if inner.state == to {
            return;
        }
        info!(from = %inner.state, to = %to, "circuit breaker state change");
        inner.state = to;
        inner.consecutive_failures = 0;
        inner.consecutive_successes = 0;
        inner.probes_in_flight = 0;
        inner.window_started = self.clock.now();
        inner.opened_at = match to {
            CircuitState::Open => Some(self.clock.now()),
            _ => None,
        };
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        // Counters stay structurally valid even after a poisoning panic
        // elsewhere; keep serving.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn breaker_with_clock() -> (Arc<ManualClock>, CircuitBreaker) {
        let clock = Arc::new(ManualClock::new());
        let breaker = CircuitBreaker::new(clock.clone());
        (clock, breaker)
    }

    fn fail(breaker: &CircuitBreaker) -> Result<(), BreakerError<&'static str>> {
        breaker.call(|| Err("boom"))
    }

    fn succeed(breaker: &CircuitBreaker) -> Result<(), BreakerError<&'static str>> {
        breaker.call(|| Ok(()))
    }

    #[test]
    fn stays_closed_below_the_threshold() {
        let (_clock, breaker) = breaker_with_clock();
        for _ in 0..3 {
            let _ = fail(&breaker);
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn trips_after_threshold_exceeded_and_short_circuits() {
        let (_clock, breaker) = breaker_with_clock();
        for _ in 0..4 {
            let _ = fail(&breaker);
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        // The wrapped operation must not run while open.
        let mut invoked = false;
        let result: Result<(), _> = breaker.call(|| {
            invoked = true;
            Err("boom")
        });
        assert_eq!(result, Err(BreakerError::Open));
        assert!(!invoked);
    }

    #[test]
    fn success_resets_the_consecutive_count() {
        let (_clock, breaker) = breaker_with_clock();
        for _ in 0..3 {
            let _ = fail(&breaker);
        }
        succeed(&breaker).unwrap();
        for _ in 0..3 {
            let _ = fail(&breaker);
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn cooldown_moves_open_to_half_open() {
        let (clock, breaker) = breaker_with_clock();
        for _ in 0..4 {
            let _ = fail(&breaker);
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        clock.advance(Duration::from_secs(4));
        assert_eq!(breaker.state(), CircuitState::Open);

        clock.advance(Duration::from_secs(2));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn probe_failure_reopens() {
        let (clock, breaker) = breaker_with_clock();
        for _ in 0..4 {
            let _ = fail(&breaker);
        }
        clock.advance(Duration::from_secs(6));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        let _ = fail(&breaker);
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn enough_probe_successes_close_the_breaker() {
        let (clock, breaker) = breaker_with_clock();
        for _ in 0..4 {
            let _ = fail(&breaker);
        }
        clock.advance(Duration::from_secs(6));

        for _ in 0..5 {
            succeed(&breaker).unwrap();
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_bounds_concurrent_probes() {
        let (clock, breaker) = breaker_with_clock();
        let breaker = breaker.with_probe_limit(1);
        for _ in 0..4 {
            let _ = fail(&breaker);
        }
        clock.advance(Duration::from_secs(6));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        // A probe that never completes holds the only slot.
        let result: Result<(), BreakerError<&'static str>> = breaker.call(|| {
            let second: Result<(), BreakerError<&'static str>> = breaker.call(|| Ok(()));
            assert_eq!(second, Err(BreakerError::Open));
            Ok(())
        });
        assert!(result.is_ok());
    }

    #[test]
    fn rolling_interval_forgives_sporadic_failures() {
        let (clock, breaker) = breaker_with_clock();
        for _ in 0..3 {
            let _ = fail(&breaker);
        }
        clock.advance(Duration::from_secs(61));
        for _ in 0..3 {
            let _ = fail(&breaker);
        }
        // Six failures total, never more than three inside one interval.
        assert_eq!(breaker.state(), CircuitState::Closed);
    }
}
