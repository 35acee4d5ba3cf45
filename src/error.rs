//! Error taxonomy shared by every stage of the engine.
//!
//! All failures, whether caught before a request is built or reported by the
//! provider, end up as one of five [`ErrorKind`]s. The tool layer converts an
//! [`ApiError`] into an [`ErrorEnvelope`] so callers can branch on `is_error`
//! without looking at status codes.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Closed set of failure classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed input, caught locally or rejected by the provider with 400
    BadRequest,
    /// The provider has no such entity (404)
    NotFound,
    /// 429 from the provider, or the circuit breaker refused the call
    RateLimited,
    /// 5xx from the provider, an unreadable payload, or exhausted retries
    ServerError,
    /// Transport-level failure: deadline exceeded or connection lost
    Timeout,
}

impl ErrorKind {
    /// Wire name of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "bad_request",
            ErrorKind::NotFound => "not_found",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::ServerError => "server_error",
            ErrorKind::Timeout => "timeout",
        }
    }

    /// Fixed remediation hint for the kind
    pub fn suggestion(&self) -> &'static str {
        match self {
            ErrorKind::BadRequest => {
                "Check entity_type, filter field names (see openalex_filter_fields), limit bounds and identifier format."
            }
            ErrorKind::NotFound => {
                "Verify the identifier, or pass a name instead so it is resolved by free-text search."
            }
            ErrorKind::RateLimited => {
                "The provider is throttling requests. Wait a few seconds before retrying, or set OPENALEX_EMAIL for a higher rate budget."
            }
            ErrorKind::ServerError => {
                "The provider failed to answer. Retry later; if it persists, narrow the query or lower the limit."
            }
            ErrorKind::Timeout => {
                "The request did not complete in time. Retry with a larger timeout_secs or a smaller limit."
            }
        }
    }

    /// Whether a failure of this kind may succeed when repeated
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorKind::RateLimited | ErrorKind::ServerError | ErrorKind::Timeout
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ApiError {
    #[error("Bad request: {message}")]
    BadRequest {
        message: String,
        status: Option<u16>,
    },

    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("Rate limited: {message}")]
    RateLimited {
        message: String,
        status: Option<u16>,
        retry_after: Option<Duration>,
    },

    #[error("Server error: {message}")]
    ServerError {
        message: String,
        status: Option<u16>,
    },

    #[error("Timeout: {message}")]
    Timeout { message: String },
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest {
            message: message.into(),
            status: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound {
            message: message.into(),
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        ApiError::RateLimited {
            message: message.into(),
            status: None,
            retry_after: None,
        }
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        ApiError::ServerError {
            message: message.into(),
            status: None,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        ApiError::Timeout {
            message: message.into(),
        }
    }

    /// Classify a non-success HTTP status returned by the provider
    pub fn from_status(status: u16, body: &str, retry_after: Option<Duration>) -> Self {
        let detail = provider_message(body);
        match status {
            404 => ApiError::NotFound {
                message: detail.unwrap_or_else(|| "the provider has no such entity".to_string()),
            },
            429 => ApiError::RateLimited {
                message: detail.unwrap_or_else(|| "too many requests".to_string()),
                status: Some(status),
                retry_after,
            },
            408 | 504 => ApiError::Timeout {
                message: detail.unwrap_or_else(|| format!("provider timed out ({})", status)),
            },
            s if s >= 500 => ApiError::ServerError {
                message: detail.unwrap_or_else(|| format!("provider returned status {}", s)),
                status: Some(s),
            },
            s => ApiError::BadRequest {
                message: detail.unwrap_or_else(|| format!("provider rejected the request ({})", s)),
                status: Some(s),
            },
        }
    }

    /// The taxonomy kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::BadRequest { .. } => ErrorKind::BadRequest,
            ApiError::NotFound { .. } => ErrorKind::NotFound,
            ApiError::RateLimited { .. } => ErrorKind::RateLimited,
            ApiError::ServerError { .. } => ErrorKind::ServerError,
            ApiError::Timeout { .. } => ErrorKind::Timeout,
        }
    }

    /// HTTP status associated with the failure, when one exists
    pub fn http_status(&self) -> Option<u16> {
        match self {
            ApiError::BadRequest { status, .. }
            | ApiError::RateLimited { status, .. }
            | ApiError::ServerError { status, .. } => *status,
            ApiError::NotFound { .. } => Some(404),
            ApiError::Timeout { .. } => None,
        }
    }

    /// Human-readable message without the kind prefix
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest { message, .. }
            | ApiError::NotFound { message }
            | ApiError::RateLimited { message, .. }
            | ApiError::ServerError { message, .. }
            | ApiError::Timeout { message } => message,
        }
    }

    /// Delay the provider asked for before the next attempt
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ApiError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind().is_transient()
    }

    /// Prefix the message with context; the kind and status are kept as they are
    pub fn context(mut self, context: impl std::fmt::Display) -> Self {
        let prefixed = |message: &mut String| *message = format!("{}: {}", context, message);
        match &mut self {
            ApiError::BadRequest { message, .. }
            | ApiError::NotFound { message }
            | ApiError::RateLimited { message, .. }
            | ApiError::ServerError { message, .. }
            | ApiError::Timeout { message } => prefixed(message),
        }
        self
    }

    /// Build the caller-facing envelope
    pub fn to_envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope::from(self)
    }
}

/// Pull the provider's own explanation out of an error body, if it sent one
fn provider_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let error = value.get("error").and_then(|v| v.as_str());
    let message = value.get("message").and_then(|v| v.as_str());
    match (error, message) {
        (Some(e), Some(m)) => Some(format!("{}: {}", e, m)),
        (Some(e), None) => Some(e.to_string()),
        (None, Some(m)) => Some(m.to_string()),
        (None, None) => None,
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return ApiError::timeout(format!("request timed out: {}", err));
        }
        if let Some(status) = err.status() {
            return ApiError::from_status(status.as_u16(), "", None);
        }
        if err.is_builder() {
            return ApiError::bad_request(format!("could not build request: {}", err));
        }
        if err.is_decode() {
            return ApiError::server_error(format!("unreadable response body: {}", err));
        }
        ApiError::timeout(format!("connection to provider failed: {}", err))
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::server_error(format!("unexpected response shape: {}", err))
    }
}

/// Structured failure returned to the caller
///
/// Fields are private; an envelope is only ever built from an [`ApiError`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorEnvelope {
    is_error: bool,
    error_kind: ErrorKind,
    http_status: Option<u16>,
    message: String,
    suggestion: String,
}

impl ErrorEnvelope {
    pub fn is_error(&self) -> bool {
        self.is_error
    }

    pub fn error_kind(&self) -> ErrorKind {
        self.error_kind
    }

    pub fn http_status(&self) -> Option<u16> {
        self.http_status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn suggestion(&self) -> &str {
        &self.suggestion
    }
}

impl From<&ApiError> for ErrorEnvelope {
    fn from(err: &ApiError) -> Self {
        let kind = err.kind();
        Self {
            is_error: true,
            error_kind: kind,
            http_status: err.http_status(),
            message: err.message().to_string(),
            suggestion: kind.suggestion().to_string(),
        }
    }
}

impl From<ApiError> for ErrorEnvelope {
    fn from(err: ApiError) -> Self {
        ErrorEnvelope::from(&err)
    }
}

pub type Result<T, E = ApiError> = std::result::Result<T, E>;
