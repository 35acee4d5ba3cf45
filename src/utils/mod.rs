//! Resilience utilities for outbound provider calls.
//!
//! - [`Clock`]: time source, with [`TokioClock`] for production and [`ManualClock`] for tests
//! - [`TokenBucket`]: process-wide request throttle
//! - [`RetryConfig`] / [`with_retry`]: exponential backoff on transient failures
//! - [`CircuitBreaker`]: stops retrying once the provider keeps failing
//!
//! # Retry with Backoff
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use openalex_mcp::error::ApiError;
//! use openalex_mcp::utils::{with_retry, CircuitBreaker, CircuitBreakerConfig, RetryConfig, TokioClock};
//!
//! # async fn fetch_data() -> Result<String, ApiError> { Ok("data".to_string()) }
//! # #[tokio::main]
//! # async fn main() -> Result<(), ApiError> {
//! let clock = Arc::new(TokioClock);
//! let breaker = CircuitBreaker::new(CircuitBreakerConfig::default(), clock.clone());
//! let data = with_retry(&RetryConfig::default(), clock.as_ref(), &breaker, fetch_data).await?;
//! # Ok(())
//! # }
//! ```

mod circuit_breaker;
mod clock;
mod rate_limit;
mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState, Permit};
pub use clock::{Clock, ManualClock, TokioClock};
pub use rate_limit::{TokenBucket, ANONYMOUS_RATE, CONTACT_RATE};
pub use retry::{with_retry, RetryConfig};
