//! Outbound request plumbing.
//!
//! A [`Transport`] executes one GET against the provider and returns the JSON
//! body or a classified [`ApiError`]. [`HttpTransport`] talks to the real API,
//! [`MockTransport`] replays scripted answers, and [`RateLimitedTransport`]
//! wraps either one with throttling, retries and the circuit breaker.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

pub mod http;
pub mod limited;
pub mod mock;

pub use http::HttpTransport;
pub use limited::RateLimitedTransport;
pub use mock::MockTransport;

/// One GET against a provider path with ordered query parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    path: String,
    params: Vec<(String, String)>,
}

impl ApiRequest {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            params: Vec::new(),
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    /// First value of a parameter
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl std::fmt::Display for ApiRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "GET {}", self.path)?;
        for (i, (k, v)) in self.params.iter().enumerate() {
            write!(f, "{}{}={}", if i == 0 { '?' } else { '&' }, k, v)?;
        }
        Ok(())
    }
}

/// Executes provider requests
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    async fn get(&self, request: &ApiRequest) -> Result<Value>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn get(&self, request: &ApiRequest) -> Result<Value> {
        (**self).get(request).await
    }
}
