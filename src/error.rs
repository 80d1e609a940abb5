//! Error types for QuillClaw
//!
//! This module defines all error types used throughout the engine.
//! Uses `thiserror` for ergonomic error handling with automatic `Display`
//! and `Error` trait implementations.

use std::fmt;
use thiserror::Error;

// ============================================================================
// Model API Error Classification
// ============================================================================

/// Classification of a non-success model endpoint response.
///
/// Drives the retry decision without string matching: only [`Overloaded`]
/// responses are transient enough to retry automatically.
///
/// [`Overloaded`]: ApiErrorKind::Overloaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiErrorKind {
    /// The endpoint reported it is temporarily overloaded (HTTP 529 or an
    /// `overloaded_error` body). Retried with backoff.
    Overloaded,
    /// HTTP 429 — too many requests. Carries a retry-after hint but is not
    /// auto-retried by the core loop.
    RateLimited,
    /// HTTP 400 — malformed request, oversized payload, bad tool schema.
    InvalidRequest,
    /// HTTP 401 — missing or invalid API key.
    Unauthenticated,
    /// HTTP 5xx — server-side failure.
    ServerError,
    /// Anything the classifier does not recognize.
    Unknown,
}

impl fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiErrorKind::Overloaded => write!(f, "overloaded"),
            ApiErrorKind::RateLimited => write!(f, "rate limited"),
            ApiErrorKind::InvalidRequest => write!(f, "invalid request"),
            ApiErrorKind::Unauthenticated => write!(f, "unauthenticated"),
            ApiErrorKind::ServerError => write!(f, "server error"),
            ApiErrorKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// A classified, terminal model endpoint failure.
///
/// Carries everything a caller needs to decide remediation: the HTTP status,
/// the classified kind, the server's retry-after hint (rate limits only),
/// and the error message from the response body.
#[derive(Debug, Clone, Error)]
#[error("Model API error ({kind}, HTTP {status}): {message}")]
pub struct ApiError {
    /// HTTP status code of the failed response.
    pub status: u16,
    /// Classified error kind.
    pub kind: ApiErrorKind,
    /// Seconds to wait before retrying, from the `retry-after` header.
    pub retry_after: Option<u64>,
    /// Error message extracted from the response body.
    pub message: String,
}

impl ApiError {
    /// Create a new classified error.
    pub fn new(status: u16, kind: ApiErrorKind, message: &str) -> Self {
        Self {
            status,
            kind,
            retry_after: None,
            message: message.to_string(),
        }
    }

    /// Attach a retry-after hint (seconds).
    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds);
        self
    }

    /// Returns `true` if this failure is transient and worth retrying.
    ///
    /// Only [`ApiErrorKind::Overloaded`] qualifies; rate limits surface to
    /// the caller with their wait-time hint instead.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, ApiErrorKind::Overloaded)
    }

    /// A longer explanation with concrete next steps, suitable for showing
    /// alongside the short [`Display`](fmt::Display) line.
    pub fn remediation(&self) -> String {
        match self.kind {
            ApiErrorKind::Overloaded => {
                "The model endpoint is temporarily overloaded. Automatic retries were \
                 exhausted; wait a minute and try again."
                    .to_string()
            }
            ApiErrorKind::RateLimited => match self.retry_after {
                Some(secs) => format!(
                    "Rate limit reached. Wait about {} seconds before sending the next \
                     message, or reduce how often you send requests.",
                    secs
                ),
                None => "Rate limit reached. Wait a little before sending the next \
                         message, or reduce how often you send requests."
                    .to_string(),
            },
            ApiErrorKind::InvalidRequest => {
                "The request was rejected as invalid. This usually means the conversation \
                 has grown too large — trim the history or start a new conversation. If it \
                 persists, try a different model."
                    .to_string()
            }
            ApiErrorKind::Unauthenticated => {
                "Authentication failed. Check that your API key is set and still valid."
                    .to_string()
            }
            ApiErrorKind::ServerError => {
                "The model endpoint hit an internal error. Try again shortly; if it \
                 persists, switch to a different model."
                    .to_string()
            }
            ApiErrorKind::Unknown => {
                "The model endpoint returned an unrecognized error. Try again; if it \
                 persists, check the service status page."
                    .to_string()
            }
        }
    }
}

// ============================================================================
// Primary Error Type
// ============================================================================

/// The primary error type for QuillClaw operations.
#[derive(Error, Debug)]
pub enum QuillError {
    /// Classified model endpoint failure (terminal after any retries).
    #[error("{0}")]
    Api(#[from] ApiError),

    /// The model returned a stop reason the loop has no contract for.
    /// Indicates a protocol violation, fatal for the turn.
    #[error("Unexpected stop reason: {0}")]
    UnexpectedStopReason(String),

    /// Configuration-related errors (missing API key, invalid values, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Tool execution errors that escaped the tool boundary. The agent loop
    /// folds these into tool_result strings; they only surface directly when
    /// a tool is invoked outside a turn.
    #[error("Tool error: {0}")]
    Tool(String),

    /// Conversation store errors (persistence failures, invalid state, etc.)
    #[error("Store error: {0}")]
    Store(String),

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP transport errors (connect failures, timeouts)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// A specialized `Result` type for QuillClaw operations.
pub type Result<T> = std::result::Result<T, QuillError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = QuillError::Config("missing API key".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing API key");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let quill_err: QuillError = io_err.into();
        assert!(matches!(quill_err, QuillError::Io(_)));
    }

    #[test]
    fn test_api_error_display() {
        let err = ApiError::new(529, ApiErrorKind::Overloaded, "server busy");
        let text = err.to_string();
        assert!(text.contains("overloaded"));
        assert!(text.contains("529"));
        assert!(text.contains("server busy"));
    }

    #[test]
    fn test_api_error_retryable() {
        assert!(ApiError::new(529, ApiErrorKind::Overloaded, "busy").is_retryable());

        assert!(!ApiError::new(429, ApiErrorKind::RateLimited, "slow down").is_retryable());
        assert!(!ApiError::new(400, ApiErrorKind::InvalidRequest, "bad json").is_retryable());
        assert!(!ApiError::new(401, ApiErrorKind::Unauthenticated, "bad key").is_retryable());
        assert!(!ApiError::new(500, ApiErrorKind::ServerError, "oops").is_retryable());
        assert!(!ApiError::new(418, ApiErrorKind::Unknown, "teapot").is_retryable());
    }

    #[test]
    fn test_api_error_retry_after() {
        let err = ApiError::new(429, ApiErrorKind::RateLimited, "slow down").with_retry_after(30);
        assert_eq!(err.retry_after, Some(30));
        assert!(err.remediation().contains("30 seconds"));
    }

    #[test]
    fn test_remediation_has_next_steps_for_every_kind() {
        let kinds = [
            ApiErrorKind::Overloaded,
            ApiErrorKind::RateLimited,
            ApiErrorKind::InvalidRequest,
            ApiErrorKind::Unauthenticated,
            ApiErrorKind::ServerError,
            ApiErrorKind::Unknown,
        ];
        for kind in kinds {
            let err = ApiError::new(500, kind, "x");
            assert!(
                !err.remediation().is_empty(),
                "remediation missing for {:?}",
                kind
            );
        }
    }

    #[test]
    fn test_api_error_into_quill_error() {
        let api = ApiError::new(401, ApiErrorKind::Unauthenticated, "invalid key");
        let err: QuillError = api.into();
        assert!(matches!(err, QuillError::Api(_)));
        assert!(err.to_string().contains("unauthenticated"));
    }

    #[test]
    fn test_unexpected_stop_reason_display() {
        let err = QuillError::UnexpectedStopReason("pause_turn".to_string());
        assert_eq!(err.to_string(), "Unexpected stop reason: pause_turn");
    }

    #[test]
    fn test_result_type() {
        fn returns_result() -> Result<i32> {
            Ok(42)
        }
        assert_eq!(returns_result().unwrap(), 42);
    }
}
