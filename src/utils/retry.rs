//! Retry with exponential backoff for transient provider failures.

use rand::Rng;
use serde::Deserialize;
use std::time::Duration;

use super::circuit_breaker::CircuitBreaker;
use super::clock::Clock;
use crate::error::ApiError;

/// Configuration for retry behavior
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included
    pub max_attempts: u32,
    /// Delay before the second attempt
    #[serde(with = "crate::config::duration_secs")]
    pub initial_delay: Duration,
    /// Cap on any single delay
    #[serde(with = "crate::config::duration_secs")]
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Random extra delay, as a fraction of the computed delay
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

impl RetryConfig {
    /// Delay after the given failed attempt (1-based)
    ///
    /// A `Retry-After` from the provider wins over the computed backoff.
    pub fn delay_for(&self, attempt: u32, error: &ApiError) -> Duration {
        if let Some(retry_after) = error.retry_after() {
            return retry_after.min(self.max_delay);
        }

        let exponent = attempt.saturating_sub(1) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let delay = Duration::from_secs_f64(secs.min(self.max_delay.as_secs_f64()));
        add_jitter(delay, self.jitter)
    }
}

fn add_jitter(delay: Duration, jitter_factor: f64) -> Duration {
    if jitter_factor <= 0.0 {
        return delay;
    }

    let jitter_ms = (delay.as_millis() as f64 * jitter_factor) as u64;
    if jitter_ms == 0 {
        return delay;
    }
    let jitter = rand::thread_rng().gen_range(0..=jitter_ms);
    delay + Duration::from_millis(jitter)
}

/// Run `operation` until it succeeds, fails permanently, or the budget is spent
///
/// Every attempt asks `breaker` first. Permanent errors (`bad_request`,
/// `not_found`) are returned at once; transient ones are retried up to
/// `max_attempts`. The error returned keeps the kind of the last failure.
pub async fn with_retry<T, F, Fut>(
    config: &RetryConfig,
    clock: &dyn Clock,
    breaker: &CircuitBreaker,
    mut operation: F,
) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, ApiError>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        let permit = breaker.try_acquire()?;

        match operation().await {
            Ok(result) => {
                breaker.record_success();
                if attempt > 1 {
                    tracing::info!(
                        "Request succeeded on attempt {} after {} transient failures",
                        attempt,
                        attempt - 1
                    );
                }
                return Ok(result);
            }
            Err(error) if !error.is_transient() => {
                breaker.record_success();
                return Err(error);
            }
            Err(error) => {
                breaker.record_failure(&error);

                if permit.probe {
                    return Err(error.context("provider still failing after cool-down"));
                }
                if attempt >= max_attempts {
                    tracing::warn!("Request failed after {} attempts: {}", attempt, error);
                    return Err(error.context(format!("gave up after {} attempts", attempt)));
                }
                if breaker.is_open() {
                    tracing::warn!("Circuit opened on attempt {}, not retrying: {}", attempt, error);
                    return Err(error.context("circuit opened, not retrying"));
                }

                let delay = config.delay_for(attempt, &error);
                tracing::debug!(
                    "Transient error on attempt {}: {}, retrying in {:?}",
                    attempt,
                    error,
                    delay
                );
                clock.sleep(delay).await;
            }
        }
    }
}
