//! Request and response values exchanged with transports
//!
//! These are plain data. Pipeline stages never mutate a descriptor in place;
//! interceptors take one by value and hand back the descriptor to dispatch.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Header map used throughout the pipeline, ordered for stable logging
pub type Headers = BTreeMap<String, String>;

/// HTTP method for a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[allow(missing_docs)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    /// Upper-case method name as sent on the wire
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    /// Whether a request body is forwarded for this method
    #[must_use]
    pub fn allows_body(&self) -> bool {
        !matches!(self, Self::Get)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            other => Err(format!("unsupported HTTP method: {other}")),
        }
    }
}

/// A fully assembled request handed to a [`Transport`](crate::transport::Transport)
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    /// Absolute URL including the query string
    pub url: String,
    /// HTTP verb
    pub method: HttpMethod,
    /// JSON body; always `None` for GET
    pub body: Option<Value>,
    /// Fully assembled request headers
    pub headers: Headers,
    /// Transport-enforced timeout
    pub timeout: Option<Duration>,
    /// Signal the transport must honor
    pub cancellation: Option<CancellationToken>,
}

impl RequestDescriptor {
    /// Create a descriptor with no headers, body, or timeout
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method,
            body: None,
            headers: Headers::new(),
            timeout: None,
            cancellation: None,
        }
    }

    /// Return a copy with `name` set to `value`
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Return a copy carrying `body`
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Look a header up ignoring ASCII case
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        lookup_header(&self.headers, name)
    }

    /// Whether the cancellation signal has already fired
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }
}

fn lookup_header<'a>(headers: &'a Headers, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// Parsed response payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum ResponseBody {
    /// No body
    Empty,
    /// Parsed JSON
    Json(Value),
    /// UTF-8 text that is not JSON
    Text(String),
    /// Anything else
    Binary(Vec<u8>),
}

impl ResponseBody {
    /// Parse raw bytes according to a `Content-Type` header value
    ///
    /// JSON media types (including `+json` suffixes) are parsed, `text/*` is
    /// decoded as UTF-8, anything else is kept as bytes.
    pub fn from_bytes(content_type: &str, bytes: Vec<u8>) -> Result<Self, serde_json::Error> {
        if bytes.is_empty() {
            return Ok(Self::Empty);
        }

        let media_type = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if media_type == "application/json" || media_type.ends_with("+json") {
            serde_json::from_slice(&bytes).map(Self::Json)
        } else if media_type.starts_with("text/") {
            Ok(Self::Text(String::from_utf8_lossy(&bytes).into_owned()))
        } else {
            Ok(Self::Binary(bytes))
        }
    }

    /// Whether there is no body
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// The JSON value, if the payload was JSON
    #[must_use]
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Borrow the text body
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Decode into `T`; text payloads are parsed as JSON, empty ones as `null`
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        match self {
            Self::Json(value) => T::deserialize(value),
            Self::Text(text) => serde_json::from_str(text),
            Self::Binary(bytes) => serde_json::from_slice(bytes),
            Self::Empty => T::deserialize(Value::Null),
        }
    }
}

impl From<Value> for ResponseBody {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

/// Transport-specific response object, passed through untouched
///
/// The pipeline never looks inside; consumers downcast to the type their
/// transport documents.
#[derive(Clone)]
pub struct RawResponse(Arc<dyn Any + Send + Sync>);

impl RawResponse {
    /// Wrap a transport-specific response
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Borrow the inner value as `T`
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }
}

impl fmt::Debug for RawResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RawResponse(..)")
    }
}

/// A response as produced by a transport and returned to callers
#[derive(Debug, Clone)]
pub struct ResponseEnvelope {
    /// Decoded body
    pub data: ResponseBody,
    /// HTTP status code
    pub status: u16,
    /// Lower-cased header names; may be empty if the transport cannot expose them
    pub headers: Headers,
    /// Transport-specific response; `None` on a cache hit
    pub raw: Option<RawResponse>,
}

impl ResponseEnvelope {
    /// Response with no headers
    pub fn new(status: u16, data: impl Into<ResponseBody>) -> Self {
        Self {
            data: data.into(),
            status,
            headers: Headers::new(),
            raw: None,
        }
    }

    /// Add a response header
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Attach the transport-specific response
    #[must_use]
    pub fn with_raw(mut self, raw: RawResponse) -> Self {
        self.raw = Some(raw);
        self
    }

    /// Look a header up ignoring ASCII case
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        lookup_header(&self.headers, name)
    }

    /// Status is 2xx
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode the payload into `T`
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        self.data.decode()
    }
}
