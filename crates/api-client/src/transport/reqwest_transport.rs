//! Default transport backed by `reqwest`

use super::Transport;
use crate::error::TransportError;
use crate::http::{Headers, HttpMethod, RequestDescriptor, ResponseBody, ResponseEnvelope, RawResponse};
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method};
use std::net::SocketAddr;
use tracing::debug;

/// User agent sent by the default client
const USER_AGENT: &str = concat!("apikit/", env!("CARGO_PKG_VERSION"));

/// Raw value attached to responses from [`ReqwestTransport`]
#[derive(Debug, Clone)]
pub struct ReqwestRaw {
    /// Final URL after redirects
    pub url: String,
    /// HTTP version, e.g. `HTTP/1.1`
    pub version: String,
    /// Peer address, when known
    pub remote_addr: Option<SocketAddr>,
}

/// Transport that performs requests with a shared `reqwest::Client`
///
/// Every status is returned as a response unless
/// [`error_for_status`](Self::error_for_status) is enabled, in which case
/// 4xx/5xx become failures carrying the response.
#[derive(Debug, Default)]
pub struct ReqwestTransport {
    client: OnceCell<Client>,
    error_for_status: bool,
}

impl ReqwestTransport {
    /// Create a transport; the client is built on first use
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an existing client (connection pool, proxy, TLS settings)
    #[must_use]
    pub fn with_client(client: Client) -> Self {
        Self {
            client: OnceCell::with_value(client),
            error_for_status: false,
        }
    }

    /// Fail on 4xx/5xx instead of returning them as responses
    #[must_use]
    pub fn error_for_status(mut self, enabled: bool) -> Self {
        self.error_for_status = enabled;
        self
    }

    fn client(&self) -> Result<&Client, TransportError> {
        self.client.get_or_try_init(|| {
            Client::builder()
                .user_agent(USER_AGENT)
                .build()
                .map_err(|e| TransportError::new(format!("failed to build HTTP client: {e}")))
        })
    }

    async fn send(&self, request: RequestDescriptor) -> Result<ResponseEnvelope, TransportError> {
        let mut builder = self.client()?.request(to_method(request.method), &request.url);

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(body) = request.body.as_ref().filter(|_| request.method.allows_body()) {
            let bytes = serde_json::to_vec(body)
                .map_err(|e| TransportError::new(format!("failed to encode request body: {e}")))?;
            builder = builder.body(bytes);
        }

        let response = builder.send().await.map_err(from_reqwest)?;

        let status = response.status().as_u16();
        let raw = ReqwestRaw {
            url: response.url().to_string(),
            version: format!("{:?}", response.version()),
            remote_addr: response.remote_addr(),
        };

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
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let bytes = response.bytes().await.map_err(from_reqwest)?;
        let data = ResponseBody::from_bytes(&content_type, bytes.to_vec())
            .map_err(|e| TransportError::new(format!("invalid JSON response body: {e}")))?;

        debug!(status, url = %raw.url, "reqwest response received");

        let envelope = ResponseEnvelope {
            data,
            status,
            headers,
            raw: Some(RawResponse::new(raw)),
        };

        if self.error_for_status && status >= 400 {
            return Err(TransportError::status(envelope));
        }
        Ok(envelope)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    fn name(&self) -> &'static str {
        "reqwest"
    }

    async fn request(&self, request: RequestDescriptor) -> Result<ResponseEnvelope, TransportError> {
        match request.cancellation.clone() {
            Some(token) => {
                tokio::select! {
                    biased;
                    () = token.cancelled() => Err(TransportError::cancelled()),
                    result = self.send(request) => result,
                }
            }
            None => self.send(request).await,
        }
    }
}

fn to_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
    }
}

fn from_reqwest(err: reqwest::Error) -> TransportError {
    let message = err.to_string();
    if err.is_timeout() {
        TransportError::timeout(message)
    } else if err.is_connect() {
        TransportError::network(message)
    } else if err.is_builder() {
        TransportError::new(message).with_code("ERR_INVALID_URL")
    } else {
        TransportError::new(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_mapping() {
        assert_eq!(to_method(HttpMethod::Patch), Method::PATCH);
        assert_eq!(to_method(HttpMethod::Delete), Method::DELETE);
    }

    #[test]
    fn test_client_is_built_lazily_once() {
        let transport = ReqwestTransport::new();
        let first = transport.client().unwrap() as *const Client;
        let second = transport.client().unwrap() as *const Client;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_invalid_url_is_not_a_network_error() {
        let transport = ReqwestTransport::new();
        let err = transport
            .request(RequestDescriptor::new(HttpMethod::Get, "not a url"))
            .await
            .unwrap_err();
        assert!(!crate::error::classify(&err).is_network_error());
    }

    #[tokio::test]
    async fn test_precancelled_token_short_circuits() {
        let token = tokio_util::sync::CancellationToken::new();
        token.cancel();

        let mut request = RequestDescriptor::new(HttpMethod::Get, "http://127.0.0.1:9/never");
        request.cancellation = Some(token);

        let err = ReqwestTransport::new().request(request).await.unwrap_err();
        assert!(err.cancelled);
    }
}
