//! Error types for the API client
//!
//! Transports and interceptors fail with a [`TransportError`], a loose bag
//! of whatever the underlying client reported. The pipeline turns every such
//! failure into exactly one [`ApiError`] variant using the priority-ordered
//! [`CLASSIFICATION_RULES`] table.

use crate::http::ResponseEnvelope;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Message returned when a relative path is used without a base URL
pub const BASE_URL_NOT_CONFIGURED: &str =
    "base_url not configured. Please call configure() with a base_url first.";

/// Classified failure of a logical API call
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    /// Client misconfiguration detected before any network call
    #[error("{0}")]
    Config(String),

    /// The request's cancellation token fired
    #[error("Request cancelled")]
    Cancelled,

    /// The network could not be reached
    #[error("No internet connection: {0}")]
    Network(String),

    /// The transport gave up waiting
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// The server answered with an error status
    #[error("HTTP {status}: {message}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Failure description
        message: String,
        /// Response payload, when the server sent one
        details: Option<Value>,
    },

    /// Anything else
    #[error("{message}")]
    Unknown {
        /// Failure description
        message: String,
        /// Status code, when one was available
        status: Option<u16>,
    },
}

impl ApiError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an unknown error
    pub fn unknown(msg: impl Into<String>) -> Self {
        Self::Unknown {
            message: msg.into(),
            status: None,
        }
    }

    /// Create an HTTP error response
    pub fn http(status: u16, message: impl Into<String>, details: Option<Value>) -> Self {
        Self::Http {
            status,
            message: message.into(),
            details,
        }
    }

    /// Status code carried by the error, if any
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Unknown { status, .. } => *status,
            _ => None,
        }
    }

    /// Connection-level failure
    #[must_use]
    pub fn is_network_error(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    /// The call exceeded its timeout
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// The call was cancelled through its token
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Derived from an HTTP 401
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Http { status: 401, .. })
    }

    /// Only network failures and timeouts are retried
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.is_network_error() || self.is_timeout()
    }

    /// Check if this is a client error (4xx)
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Http { status, .. } if (400..500).contains(status))
    }

    /// Check if this is a server error (5xx)
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::Http { status, .. } if *status >= 500)
    }
}

impl From<apikit_core::Error> for ApiError {
    fn from(err: apikit_core::Error) -> Self {
        match err.code.category() {
            "Configuration" => Self::Config(err.message),
            _ => Self::unknown(err.to_string()),
        }
    }
}

/// Raw failure reported by a transport or an interceptor
#[derive(Debug, Clone, Default)]
pub struct TransportError {
    /// Human-readable description from the underlying client
    pub message: String,
    /// Machine-readable code such as `ECONNREFUSED` or `ETIMEDOUT`
    pub code: Option<String>,
    /// Response received before failing, for HTTP status errors
    pub response: Option<Box<ResponseEnvelope>>,
    /// The failure came from the request's cancellation signal
    pub cancelled: bool,
}

impl TransportError {
    /// Generic failure with a message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    /// Failure raised because the cancellation token fired
    #[must_use]
    pub fn cancelled() -> Self {
        Self {
            message: "The operation was aborted".to_string(),
            cancelled: true,
            ..Self::default()
        }
    }

    /// Connection-level failure
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(message).with_code("ECONNREFUSED")
    }

    /// Transport-enforced timeout
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(message).with_code("ETIMEDOUT")
    }

    /// Error status carrying the response that triggered it
    pub fn status(response: ResponseEnvelope) -> Self {
        Self {
            message: format!("Request failed with status code {}", response.status),
            response: Some(Box::new(response)),
            ..Self::default()
        }
    }

    /// Attach a machine-readable code
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    fn has_code(&self, codes: &[&str]) -> bool {
        self.code
            .as_deref()
            .is_some_and(|code| codes.iter().any(|c| c.eq_ignore_ascii_case(code)))
    }

    /// Message sniffing only applies when the transport supplied no code
    fn uncoded_message_contains(&self, patterns: &[&str]) -> bool {
        if self.code.is_some() {
            return false;
        }
        let message = self.message.to_ascii_lowercase();
        patterns.iter().any(|p| message.contains(p))
    }

    fn error_response(&self) -> Option<&ResponseEnvelope> {
        self.response.as_deref().filter(|r| r.status >= 400)
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} ({code})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for TransportError {}

/// Codes that mean the network was unreachable
const NETWORK_CODES: &[&str] = &[
    "ECONNREFUSED",
    "ECONNRESET",
    "ENOTFOUND",
    "ENETUNREACH",
    "EHOSTUNREACH",
];

/// Lower-case message fragments that mean the network was unreachable
const NETWORK_PATTERNS: &[&str] = &[
    "network request failed",
    "error sending request",
    "connection refused",
    "dns error",
    "failed to lookup address",
];

const TIMEOUT_CODES: &[&str] = &["ECONNABORTED", "ETIMEDOUT"];

const TIMEOUT_PATTERNS: &[&str] = &["timeout", "timed out"];

/// One row of the classification table
pub struct ClassificationRule {
    /// Short label used in logs
    pub name: &'static str,
    /// Whether this row applies
    pub matches: fn(&TransportError) -> bool,
    /// Build the classified error
    pub classify: fn(&TransportError) -> ApiError,
}

impl fmt::Debug for ClassificationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassificationRule")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Rules tried in order; the first match wins, [`ApiError::Unknown`] otherwise
pub const CLASSIFICATION_RULES: &[ClassificationRule] = &[
    ClassificationRule {
        name: "cancelled",
        matches: |e| e.cancelled,
        classify: |_| ApiError::Cancelled,
    },
    ClassificationRule {
        name: "network",
        matches: |e| e.has_code(NETWORK_CODES) || e.uncoded_message_contains(NETWORK_PATTERNS),
        classify: |e| ApiError::Network(e.message.clone()),
    },
    ClassificationRule {
        name: "timeout",
        matches: |e| e.has_code(TIMEOUT_CODES) || e.uncoded_message_contains(TIMEOUT_PATTERNS),
        classify: |e| ApiError::Timeout(e.message.clone()),
    },
    ClassificationRule {
        name: "http_status",
        matches: |e| e.error_response().is_some(),
        classify: |e| match e.error_response() {
            Some(response) => ApiError::Http {
                status: response.status,
                message: e.message.clone(),
                details: response_details(response),
            },
            None => ApiError::unknown(e.message.clone()),
        },
    },
];

fn response_details(response: &ResponseEnvelope) -> Option<Value> {
    use crate::http::ResponseBody;

    match &response.data {
        ResponseBody::Empty => None,
        ResponseBody::Json(value) => Some(value.clone()),
        ResponseBody::Text(text) => Some(Value::String(text.clone())),
        ResponseBody::Binary(bytes) => Some(Value::from(bytes.len())),
    }
}

/// Map a raw failure to exactly one taxonomy variant
#[must_use]
pub fn classify(error: &TransportError) -> ApiError {
    CLASSIFICATION_RULES
        .iter()
        .find(|rule| (rule.matches)(error))
        .map_or_else(
            || {
                let message = if error.message.is_empty() {
                    "An error occurred".to_string()
                } else {
                    error.message.clone()
                };
                ApiError::Unknown {
                    message,
                    status: error.response.as_ref().map(|r| r.status),
                }
            },
            |rule| (rule.classify)(error),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::ResponseEnvelope;
    use serde_json::json;

    #[test]
    fn test_cancellation_wins_over_everything() {
        let mut err = TransportError::timeout("timed out");
        err.cancelled = true;
        assert_eq!(classify(&err), ApiError::Cancelled);
    }

    #[test]
    fn test_network_by_code_and_message() {
        assert!(classify(&TransportError::network("refused")).is_network_error());
        assert!(classify(&TransportError::new("Network request failed")).is_network_error());
        assert!(
            classify(&TransportError::new("error sending request for url (http://x/)"))
                .is_network_error()
        );
        assert!(classify(&TransportError::new("boom").with_code("ENOTFOUND")).is_network_error());
    }

    #[test]
    fn test_network_checked_before_timeout() {
        let err = TransportError::new("dns error: lookup timed out");
        assert!(classify(&err).is_network_error());
    }

    #[test]
    fn test_code_takes_precedence_over_message() {
        let err = TransportError::timeout("error sending request for url (http://x/): operation timed out");
        assert!(classify(&err).is_timeout());
    }

    #[test]
    fn test_timeout_by_code_and_message() {
        assert!(classify(&TransportError::new("aborted").with_code("ECONNABORTED")).is_timeout());
        assert!(classify(&TransportError::new("timeout of 10000ms exceeded")).is_timeout());
        assert!(classify(&TransportError::timeout("slow")).is_timeout());
    }

    #[test]
    fn test_http_status_error() {
        let response = ResponseEnvelope::new(404, json!({"error": "missing"}));
        let err = classify(&TransportError::status(response));

        assert_eq!(err.status(), Some(404));
        assert!(err.is_client_error());
        assert!(!err.is_retryable());
        match err {
            ApiError::Http { details, .. } => assert_eq!(details, Some(json!({"error": "missing"}))),
            other => panic!("expected Http, got {other:?}"),
        }
    }

    #[test]
    fn test_unauthorized_is_derived() {
        let err = classify(&TransportError::status(ResponseEnvelope::new(401, json!(null))));
        assert!(err.is_unauthorized());
        assert!(!ApiError::http(403, "forbidden", None).is_unauthorized());
    }

    #[test]
    fn test_success_response_attached_is_unknown() {
        let mut err = TransportError::new("decoder failed");
        err.response = Some(Box::new(ResponseEnvelope::new(200, json!({}))));

        assert_eq!(
            classify(&err),
            ApiError::Unknown {
                message: "decoder failed".to_string(),
                status: Some(200)
            }
        );
    }

    #[test]
    fn test_unknown_fallback_message() {
        assert_eq!(classify(&TransportError::default()), ApiError::unknown("An error occurred"));
    }

    #[test]
    fn test_retryable_only_network_and_timeout() {
        assert!(ApiError::Network("x".into()).is_retryable());
        assert!(ApiError::Timeout("x".into()).is_retryable());
        assert!(!ApiError::Cancelled.is_retryable());
        assert!(!ApiError::http(503, "unavailable", None).is_retryable());
        assert!(ApiError::http(503, "unavailable", None).is_server_error());
        assert!(!ApiError::config("x").is_retryable());
    }

    #[test]
    fn test_rule_order_is_stable() {
        let names: Vec<_> = CLASSIFICATION_RULES.iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["cancelled", "network", "timeout", "http_status"]);
    }
}
