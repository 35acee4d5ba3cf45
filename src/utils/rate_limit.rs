//! Token-bucket throttle shared by every outbound request.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use super::clock::Clock;

/// Requests per second without a contact address
pub const ANONYMOUS_RATE: f64 = 1.0;

/// Requests per second once a contact address is configured
pub const CONTACT_RATE: f64 = 10.0;

const EPSILON: f64 = 1e-9;

/// Token bucket; callers wait for a token instead of being dropped
///
/// The lock only guards the arithmetic and is released before sleeping.
#[derive(Debug)]
pub struct TokenBucket {
    rate: f64,
    capacity: f64,
    state: Mutex<BucketState>,
    clock: Arc<dyn Clock>,
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Bucket refilling at `rate` tokens per second, holding at most `burst`
    pub fn new(rate: f64, burst: u32, clock: Arc<dyn Clock>) -> Self {
        let capacity = f64::from(burst.max(1));
        let now = clock.now();
        Self {
            rate: rate.max(EPSILON),
            capacity,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: now,
            }),
            clock,
        }
    }

    /// Budget for the configured tier
    pub fn for_tier(has_contact: bool, clock: Arc<dyn Clock>) -> Self {
        let rate = if has_contact {
            CONTACT_RATE
        } else {
            ANONYMOUS_RATE
        };
        Self::new(rate, 1, clock)
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Take a token if one is available, otherwise report how long to wait
    pub fn try_acquire(&self) -> Result<(), Duration> {
        let now = self.clock.now();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.rate).min(self.capacity);
        state.last_refill = now;

        if state.tokens + EPSILON >= 1.0 {
            state.tokens = (state.tokens - 1.0).max(0.0);
            Ok(())
        } else {
            Err(Duration::from_secs_f64((1.0 - state.tokens) / self.rate))
        }
    }

    /// Wait cooperatively until a token is available, then take it
    pub async fn acquire(&self) {
        while let Err(wait) = self.try_acquire() {
            tracing::debug!("rate limiter: waiting {:?} for a token", wait);
            self.clock.sleep(wait).await;
        }
    }
}
