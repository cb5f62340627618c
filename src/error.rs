//! Error types for remote method calls.
//!
//! Every failure the engine can observe is funnelled into an [`AjaxError`]: transport problems,
//! timeouts, server-reported error codes and the synthetic errors the client raises itself
//! (invalid params, malformed batches, exhausted retries). [`Error`] is the crate-wide error and
//! wraps `AjaxError` next to the few failures that never reach the wire.

use http::StatusCode;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

/// Well-known error codes, both server-reported and client-generated.
pub mod codes {
    /// Transport could not reach the server.
    pub const NETWORK_ERROR: &str = "NETWORK_ERROR";
    /// Transport gave up waiting for the server.
    pub const REQUEST_TIMEOUT: &str = "REQUEST_TIMEOUT";
    /// Response body was not the JSON envelope the API promises.
    pub const INVALID_RESPONSE: &str = "INVALID_RESPONSE";
    /// Params could not be encoded as a JSON object.
    pub const INVALID_PARAMS: &str = "INVALID_PARAMS";
    /// Every attempt of a call failed.
    pub const ALL_ATTEMPTS_EXHAUSTED: &str = "ALL_ATTEMPTS_EXHAUSTED";

    pub const QUERY_LIMIT_EXCEEDED: &str = "QUERY_LIMIT_EXCEEDED";
    pub const OPERATION_TIME_LIMIT: &str = "OPERATION_TIME_LIMIT";
    pub const EXPIRED_TOKEN: &str = "expired_token";
    pub const INVALID_TOKEN: &str = "invalid_token";

    pub const ACCESS_DENIED: &str = "ACCESS_DENIED";
    pub const INVALID_CREDENTIALS: &str = "INVALID_CREDENTIALS";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const INVALID_REQUEST: &str = "INVALID_REQUEST";
    pub const ERROR_METHOD_NOT_FOUND: &str = "ERROR_METHOD_NOT_FOUND";
    pub const ERROR_MANIFEST_IS_NOT_AVAILABLE: &str = "ERROR_MANIFEST_IS_NOT_AVAILABLE";
    pub const ERROR_BATCH_LENGTH_EXCEEDED: &str = "ERROR_BATCH_LENGTH_EXCEEDED";
    pub const ERROR_BATCH_EMPTY: &str = "ERROR_BATCH_EMPTY";
    pub const ERROR_BATCH_METHOD_NOT_ALLOWED: &str = "ERROR_BATCH_METHOD_NOT_ALLOWED";
    pub const NO_AUTH_FOUND: &str = "NO_AUTH_FOUND";
    pub const INSUFFICIENT_SCOPE: &str = "insufficient_scope";
    pub const INVALID_GRANT: &str = "invalid_grant";
}

/// Coarse classification of an [`AjaxError`], driving the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Transport unreachable. Retried with backoff.
    Network,
    /// Transport timeout. Retried with backoff.
    Timeout,
    /// Credential expired or rejected (401). Refresh, then retry the same attempt.
    Auth,
    /// Per-account throughput exceeded. The rate limiter tightens and the call is retried.
    RateLimit,
    /// Per-method execution budget exhausted. Long backoff keyed to the reset time.
    OperatingLimit,
    /// Never retried.
    Fatal,
    /// Anything else. Generic exponential backoff.
    Unknown,
}

/// The query an error (or result) originated from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestInfo {
    pub method: String,
    pub params: Value,
    pub request_id: String,
}

impl RequestInfo {
    pub fn new(method: impl Into<String>, params: Value, request_id: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            params,
            request_id: request_id.into(),
        }
    }
}

/// A failed API exchange.
///
/// Values are immutable once built: the `with_*` helpers consume `self` and are meant for
/// construction only. Cloning is cheap enough to fan one batch failure out to every command.
#[derive(Debug, Clone)]
pub struct AjaxError {
    code: String,
    description: String,
    status: u16,
    timestamp: SystemTime,
    request_info: Option<RequestInfo>,
    cause: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl AjaxError {
    /// Creates an error stamped with the current time.
    pub fn new(code: impl Into<String>, description: impl Into<String>, status: u16) -> Self {
        Self {
            code: code.into(),
            description: description.into(),
            status,
            timestamp: SystemTime::now(),
            request_info: None,
            cause: None,
        }
    }

    /// Attaches the originating query.
    pub fn with_request_info(mut self, info: RequestInfo) -> Self {
        self.request_info = Some(info);
        self
    }

    /// Attaches the underlying error.
    pub fn with_cause<E>(mut self, cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.cause = Some(Arc::new(cause));
        self
    }

    /// Replaces the status code.
    #[deprecated(note = "status is fixed at construction; build a new error instead")]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Classifies a transport failure.
    pub fn from_transport(err: reqwest::Error, info: Option<RequestInfo>) -> Self {
        let error = if err.is_timeout() {
            Self::new(codes::REQUEST_TIMEOUT, err.to_string(), 408)
        } else {
            Self::new(codes::NETWORK_ERROR, err.to_string(), 0)
        };
        let error = error.with_cause(err);
        match info {
            Some(info) => error.with_request_info(info),
            None => error,
        }
    }

    /// Wraps the final error of a retry loop that ran out of attempts.
    pub fn all_attempts_exhausted(attempts: usize, last: AjaxError) -> Self {
        let method = last
            .request_info
            .as_ref()
            .map(|info| info.method.clone())
            .unwrap_or_default();
        Self {
            code: codes::ALL_ATTEMPTS_EXHAUSTED.to_string(),
            description: format!("all {attempts} attempts to call {method} failed: {last}"),
            status: last.status,
            timestamp: SystemTime::now(),
            request_info: last.request_info.clone(),
            cause: Some(Arc::new(last)),
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// HTTP-like status; `0` when no response was received.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// The status as a typed HTTP status code, when it is one.
    pub fn http_status(&self) -> Option<StatusCode> {
        StatusCode::from_u16(self.status).ok()
    }

    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    pub fn request_info(&self) -> Option<&RequestInfo> {
        self.request_info.as_ref()
    }

    /// Classifies the error for the retry policy.
    pub fn kind(&self) -> ErrorKind {
        match self.code.as_str() {
            codes::NETWORK_ERROR => ErrorKind::Network,
            codes::REQUEST_TIMEOUT => ErrorKind::Timeout,
            codes::EXPIRED_TOKEN | codes::INVALID_TOKEN if self.status == 401 => ErrorKind::Auth,
            codes::QUERY_LIMIT_EXCEEDED => ErrorKind::RateLimit,
            codes::OPERATION_TIME_LIMIT => ErrorKind::OperatingLimit,
            code if crate::retry::is_non_retryable(code) => ErrorKind::Fatal,
            _ => match self.status {
                503 => ErrorKind::RateLimit,
                429 => ErrorKind::OperatingLimit,
                _ => ErrorKind::Unknown,
            },
        }
    }

    /// Returns `true` unless the error belongs to the fixed do-not-retry list.
    pub fn is_retryable(&self) -> bool {
        self.kind() != ErrorKind::Fatal
    }
}

impl fmt::Display for AjaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.description.is_empty() {
            write!(f, "{} (status {})", self.code, self.status)
        } else {
            write!(f, "{}: {} (status {})", self.code, self.description, self.status)
        }
    }
}

impl std::error::Error for AjaxError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}

/// Extracts `(code, description)` from an error payload.
///
/// Accepts the v2 shapes `{error: "CODE", error_description}` and
/// `{error: {error, error_description}}`, the v3 shape
/// `{error: {code, message, validation: [{message}]}}`, and a bare code string.
pub(crate) fn parse_error_payload(payload: &Value) -> Option<(String, String)> {
    match payload {
        Value::String(code) if !code.is_empty() => Some((code.clone(), String::new())),
        Value::Object(map) => {
            let top_description = map
                .get("error_description")
                .and_then(Value::as_str)
                .unwrap_or_default();
            match map.get("error")? {
                Value::String(code) => Some((code.clone(), top_description.to_string())),
                Value::Object(inner) => {
                    let code = inner
                        .get("code")
                        .or_else(|| inner.get("error"))
                        .and_then(|c| match c {
                            Value::String(s) => Some(s.clone()),
                            Value::Number(n) => Some(n.to_string()),
                            _ => None,
                        })?;
                    let mut description = inner
                        .get("message")
                        .or_else(|| inner.get("error_description"))
                        .and_then(Value::as_str)
                        .unwrap_or(top_description)
                        .to_string();
                    let validation: Vec<&str> = inner
                        .get("validation")
                        .and_then(Value::as_array)
                        .map(|items| {
                            items
                                .iter()
                                .filter_map(|item| item.get("message").and_then(Value::as_str))
                                .collect()
                        })
                        .unwrap_or_default();
                    if !validation.is_empty() {
                        if !description.is_empty() {
                            description.push_str(": ");
                        }
                        description.push_str(&validation.join("; "));
                    }
                    Some((code, description))
                }
                _ => None,
            }
        }
        _ => None,
    }
}

/// The main error type of the crate.
#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    /// A failed API exchange, transport error, or client-side rejection of a call.
    #[error(transparent)]
    Ajax(#[from] AjaxError),

    /// Invalid client configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An invalid base URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The authentication provider could not supply a credential.
    #[error("Authentication failed: {0}")]
    Auth(String),
}

impl Error {
    /// The API error, if this is one.
    pub fn as_ajax(&self) -> Option<&AjaxError> {
        match self {
            Error::Ajax(err) => Some(err),
            _ => None,
        }
    }

    /// The API error code, if this is an API error.
    pub fn code(&self) -> Option<&str> {
        self.as_ajax().map(AjaxError::code)
    }

    /// Returns `true` if retrying the call could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Ajax(err) => err.is_retryable(),
            Error::Configuration(_) | Error::InvalidUrl(_) | Error::Auth(_) => false,
        }
    }
}

/// A specialized `Result` type for API calls.
pub type Result<T> = std::result::Result<T, Error>;
