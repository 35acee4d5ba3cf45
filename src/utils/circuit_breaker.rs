//! Circuit breaker guarding the provider against sustained failure.
//!
//! The breaker counts consecutive transient failures across all calls. It has
//! three states:
//!
//! - **Closed**: normal operation, requests pass through
//! - **Open**: the provider keeps failing, requests are refused without a network call
//! - **Half-Open**: the cool-down elapsed; one probe request is let through
//!
//! # Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use openalex_mcp::utils::{CircuitBreaker, CircuitBreakerConfig, CircuitState, TokioClock};
//!
//! let breaker = CircuitBreaker::new(
//!     CircuitBreakerConfig { failure_threshold: 5, open_duration: Duration::from_secs(30) },
//!     Arc::new(TokioClock),
//! );
//!
//! assert_eq!(breaker.state(), CircuitState::Closed);
//! ```

use serde::Deserialize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use super::clock::Clock;
use crate::error::{ApiError, ErrorKind};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation - requests pass through
    Closed,
    /// Failing - requests are rejected
    Open,
    /// Testing recovery - a single probe is allowed
    HalfOpen,
}

/// Circuit breaker configuration
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive transient failures before opening the circuit
    pub failure_threshold: u32,

    /// Time to stay open before letting a probe through
    #[serde(with = "crate::config::duration_secs")]
    pub open_duration: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_duration: Duration::from_secs(30),
        }
    }
}

/// Permission to make one attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permit {
    /// The attempt is the half-open probe; a failure ends the call
    pub probe: bool,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    probe_started: Option<Instant>,
    last_failure: Option<ErrorKind>,
}

/// Thread-safe circuit breaker shared by every call
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
    clock: Arc<dyn Clock>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                probe_started: None,
                last_failure: None,
            }),
            clock,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cooled_down(&self, since: Option<Instant>, now: Instant) -> bool {
        since.is_some_and(|t| now.saturating_duration_since(t) >= self.config.open_duration)
    }

    /// Get the current state
    pub fn state(&self) -> CircuitState {
        let now = self.clock.now();
        let inner = self.lock();
        match inner.state {
            CircuitState::Open if self.cooled_down(inner.opened_at, now) => CircuitState::HalfOpen,
            state => state,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    /// Ask for permission to make an attempt
    ///
    /// While open this fails immediately, as `rate_limited` when the provider's
    /// last answer was a 429 and `server_error` otherwise.
    pub fn try_acquire(&self) -> Result<Permit, ApiError> {
        let now = self.clock.now();
        let mut inner = self.lock();

        match inner.state {
            CircuitState::Closed => Ok(Permit { probe: false }),
            CircuitState::Open | CircuitState::HalfOpen => {
                if !self.cooled_down(inner.opened_at, now) {
                    return Err(self.rejection(&inner, now));
                }
                // A probe that never reported back is abandoned after one cool-down.
                let probe_pending = inner.probe_started.is_some()
                    && !self.cooled_down(inner.probe_started, now);
                if probe_pending {
                    return Err(self.rejection(&inner, now));
                }
                inner.state = CircuitState::HalfOpen;
                inner.probe_started = Some(now);
                tracing::info!("[circuit-breaker] half-open: letting one probe through");
                Ok(Permit { probe: true })
            }
        }
    }

    /// Record an answer from the provider (including 400/404, which prove it is up)
    pub fn record_success(&self) {
        let mut inner = self.lock();
        if inner.state != CircuitState::Closed {
            tracing::info!("[circuit-breaker] circuit closed (recovered)");
        }
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.probe_started = None;
        inner.last_failure = None;
    }

    /// Record a transient failure
    pub fn record_failure(&self, error: &ApiError) {
        let now = self.clock.now();
        let mut inner = self.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        inner.last_failure = Some(error.kind());

        match inner.state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(now);
                inner.probe_started = None;
                tracing::warn!("[circuit-breaker] circuit reopened (probe failed: {})", error);
            }
            CircuitState::Closed if inner.consecutive_failures >= self.config.failure_threshold => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(now);
                tracing::warn!(
                    "[circuit-breaker] circuit opened ({} consecutive failures)",
                    inner.consecutive_failures
                );
            }
            _ => {}
        }
    }

    /// Whether the circuit is currently refusing calls
    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    /// Reset the circuit breaker to closed state
    pub fn reset(&self) {
        self.record_success();
    }

    fn rejection(&self, inner: &BreakerState, now: Instant) -> ApiError {
        let remaining = inner
            .opened_at
            .map(|t| self.config.open_duration.saturating_sub(now.saturating_duration_since(t)))
            .unwrap_or(self.config.open_duration);
        let message = format!(
            "circuit open after {} consecutive provider failures; retry in {}s",
            inner.consecutive_failures,
            remaining.as_secs().max(1)
        );
        match inner.last_failure {
            Some(ErrorKind::RateLimited) => ApiError::RateLimited {
                message,
                status: None,
                retry_after: Some(remaining),
            },
            _ => ApiError::server_error(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::ManualClock;

    fn breaker(threshold: u32) -> (CircuitBreaker, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let breaker = CircuitBreaker::new(
            CircuitBreakerConfig {
                failure_threshold: threshold,
                open_duration: Duration::from_secs(30),
            },
            clock.clone(),
        );
        (breaker, clock)
    }

    #[test]
    fn test_closed_by_default() {
        let (breaker, _) = breaker(5);
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.try_acquire().unwrap(), Permit { probe: false });
    }

    #[test]
    fn test_opens_after_threshold() {
        let (breaker, _) = breaker(3);
        let err = ApiError::server_error("503");

        breaker.record_failure(&err);
        breaker.record_failure(&err);
        assert_eq!(breaker.state(), CircuitState::Closed);

        breaker.record_failure(&err);
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(
            breaker.try_acquire().unwrap_err().kind(),
            ErrorKind::ServerError
        );
    }

    #[test]
    fn test_rejection_reflects_rate_limiting() {
        let (breaker, _) = breaker(1);
        breaker.record_failure(&ApiError::rate_limited("429"));
        let err = breaker.try_acquire().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RateLimited);
        assert!(err.retry_after().is_some());
    }

    #[test]
    fn test_success_resets_count() {
        let (breaker, _) = breaker(3);
        breaker.record_failure(&ApiError::timeout("slow"));
        breaker.record_failure(&ApiError::timeout("slow"));
        assert_eq!(breaker.consecutive_failures(), 2);

        breaker.record_success();
        assert_eq!(breaker.consecutive_failures(), 0);
    }

    #[test]
    fn test_half_open_allows_single_probe() {
        let (breaker, clock) = breaker(1);
        breaker.record_failure(&ApiError::server_error("500"));

        clock.advance(Duration::from_secs(30));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert_eq!(breaker.try_acquire().unwrap(), Permit { probe: true });
        assert!(breaker.try_acquire().is_err());

        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_failed_probe_reopens() {
        let (breaker, clock) = breaker(1);
        breaker.record_failure(&ApiError::server_error("500"));
        clock.advance(Duration::from_secs(31));

        assert!(breaker.try_acquire().unwrap().probe);
        breaker.record_failure(&ApiError::server_error("500"));
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.try_acquire().is_err());
    }
}
