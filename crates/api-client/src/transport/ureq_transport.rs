//! Blocking transport backed by `ureq`
//!
//! Calls run on tokio's blocking pool and race the descriptor's
//! cancellation token. Unlike [`ReqwestTransport`](super::ReqwestTransport),
//! 4xx/5xx statuses are failures carrying the response.

use super::Transport;
use crate::error::TransportError;
use crate::http::{Headers, RequestDescriptor, ResponseBody, ResponseEnvelope, RawResponse};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;
use ureq::Agent;
use ureq::http;

/// Raw value attached to responses from [`UreqTransport`]
#[derive(Debug, Clone)]
pub struct UreqRaw {
    /// Requested URL
    pub url: String,
    /// HTTP version
    pub version: String,
}

/// Transport that performs requests with a `ureq::Agent`
#[derive(Debug, Default, Clone)]
pub struct UreqTransport {
    _private: (),
}

impl UreqTransport {
    /// Transport with default settings
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn agent(timeout: Option<Duration>) -> Agent {
    let config = Agent::config_builder()
        .timeout_global(timeout)
        .http_status_as_error(false)
        .build();
    Agent::new_with_config(config)
}

fn run_blocking(request: &RequestDescriptor) -> Result<ResponseEnvelope, TransportError> {
    let mut builder = http::Request::builder()
        .method(request.method.as_str())
        .uri(request.url.as_str());
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }

    let body = match request.body.as_ref().filter(|_| request.method.allows_body()) {
        Some(value) => serde_json::to_vec(value)
            .map_err(|e| TransportError::new(format!("failed to encode request body: {e}")))?,
        None => Vec::new(),
    };
    let http_request = builder
        .body(body)
        .map_err(|e| TransportError::new(e.to_string()).with_code("ERR_INVALID_URL"))?;

    let mut response = agent(request.timeout).run(http_request).map_err(from_ureq)?;

    let status = response.status().as_u16();
    let mut headers = Headers::new();
    for (name, value) in response.headers() {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        headers
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    let content_type = headers.get("content-type").cloned().unwrap_or_default();
    let raw = UreqRaw {
        url: request.url.clone(),
        version: format!("{:?}", response.version()),
    };

    let bytes = response.body_mut().read_to_vec().map_err(from_ureq)?;
    let data = ResponseBody::from_bytes(&content_type, bytes)
        .map_err(|e| TransportError::new(format!("invalid JSON response body: {e}")))?;

    debug!(status, url = %raw.url, "ureq response received");

    let envelope = ResponseEnvelope {
        data,
        status,
        headers,
        raw: Some(RawResponse::new(raw)),
    };
    if status >= 400 {
        return Err(TransportError::status(envelope));
    }
    Ok(envelope)
}

fn from_ureq(err: ureq::Error) -> TransportError {
    let message = err.to_string();
    match err {
        ureq::Error::Timeout(_) => TransportError::timeout(message),
        ureq::Error::HostNotFound => TransportError::new(message).with_code("ENOTFOUND"),
        ureq::Error::ConnectionFailed | ureq::Error::Io(_) => TransportError::network(message),
        _ => TransportError::new(message),
    }
}

#[async_trait]
impl Transport for UreqTransport {
    fn name(&self) -> &'static str {
        "ureq"
    }

    async fn request(&self, request: RequestDescriptor) -> Result<ResponseEnvelope, TransportError> {
        let token = request.cancellation.clone().unwrap_or_default();
        if token.is_cancelled() {
            return Err(TransportError::cancelled());
        }

        let call = tokio::task::spawn_blocking(move || run_blocking(&request));

        tokio::select! {
            biased;
            () = token.cancelled() => Err(TransportError::cancelled()),
            joined = call => joined.unwrap_or_else(|e| {
                Err(TransportError::new(format!("transport task failed: {e}")))
            }),
        }
    }
}
