//! Throttled, retrying transport.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use super::{ApiRequest, Transport};
use crate::error::Result;
use crate::utils::{with_retry, CircuitBreaker, Clock, RetryConfig, TokenBucket};

/// Wraps a transport with the shared token bucket, retries and circuit breaker
///
/// Every attempt, retries included, takes a token. The bucket and breaker are
/// shared, so one instance serves the whole process.
#[derive(Debug, Clone)]
pub struct RateLimitedTransport<T> {
    inner: T,
    bucket: Arc<TokenBucket>,
    breaker: Arc<CircuitBreaker>,
    retry: RetryConfig,
    clock: Arc<dyn Clock>,
}

impl<T: Transport> RateLimitedTransport<T> {
    pub fn new(
        inner: T,
        bucket: Arc<TokenBucket>,
        breaker: Arc<CircuitBreaker>,
        retry: RetryConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner,
            bucket,
            breaker,
            retry,
            clock,
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }
}

#[async_trait]
impl<T: Transport> Transport for RateLimitedTransport<T> {
    async fn get(&self, request: &ApiRequest) -> Result<Value> {
        let bucket = self.bucket.as_ref();
        let inner = &self.inner;
        with_retry(&self.retry, self.clock.as_ref(), &self.breaker, move || async move {
            bucket.acquire().await;
            inner.get(request).await
        })
        .await
    }
}
