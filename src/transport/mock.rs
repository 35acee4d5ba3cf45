//! Mock transport for testing purposes.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use super::{ApiRequest, Transport};
use crate::error::{ApiError, Result};

type Handler = Box<dyn Fn(&ApiRequest) -> Result<Value> + Send + Sync>;

/// A transport that answers from a script and records every request.
///
/// Scripted answers are consumed in order; once they run out the handler (if
/// any) answers, otherwise the call fails as a server error.
#[derive(Default)]
pub struct MockTransport {
    script: Mutex<VecDeque<Result<Value>>>,
    handler: Option<Handler>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("pending", &self.pending())
            .field("requests", &self.request_count())
            .finish()
    }
}

impl MockTransport {
    /// Create a new mock transport with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every unscripted request with `handler`.
    pub fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(&ApiRequest) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            handler: Some(Box::new(handler)),
            ..Self::default()
        }
    }

    /// Queue a successful answer.
    pub fn push_ok(&self, value: Value) -> &Self {
        self.push(Ok(value))
    }

    /// Queue a failure.
    pub fn push_err(&self, error: ApiError) -> &Self {
        self.push(Err(error))
    }

    fn push(&self, answer: Result<Value>) -> &Self {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(answer);
        self
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Scripted answers not consumed yet.
    pub fn pending(&self) -> usize {
        self.script.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get(&self, request: &ApiRequest) -> Result<Value> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        let scripted = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();

        match (scripted, &self.handler) {
            (Some(answer), _) => answer,
            (None, Some(handler)) => handler(request),
            (None, None) => Err(ApiError::server_error(format!(
                "mock transport has no answer for {}",
                request
            ))),
        }
    }
}

/// Helper to build a provider listing page for tests.
pub fn listing_page(results: Vec<Value>, count: u64, next_cursor: Option<&str>) -> Value {
    serde_json::json!({
        "meta": {
            "count": count,
            "page": null,
            "per_page": results.len(),
            "next_cursor": next_cursor,
        },
        "results": results,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_script_then_handler() {
        let mock = MockTransport::with_handler(|req| Ok(json!({ "path": req.path() })));
        mock.push_ok(json!({"first": true}));

        let first = mock.get(&ApiRequest::new("/works")).await.unwrap();
        let second = mock.get(&ApiRequest::new("/authors")).await.unwrap();

        assert_eq!(first["first"], true);
        assert_eq!(second["path"], "/authors");
        assert_eq!(mock.request_count(), 2);
    }

    #[tokio::test]
    async fn test_unscripted_request_fails() {
        let mock = MockTransport::new();
        let err = mock.get(&ApiRequest::new("/works")).await.unwrap_err();
        assert!(err.is_transient());
    }
}
