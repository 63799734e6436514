//! Request, response, and error interceptors
//!
//! Interceptors run at fixed pipeline stages:
//! - [`RequestInterceptor`] after the descriptor is fully assembled, once per attempt
//! - [`ResponseInterceptor`] on the transport's response, before status checks and caching
//! - [`ErrorInterceptor`] on every classified failure, before the retry decision
//!
//! Any async closure with the matching signature is an interceptor:
//!
//! ```rust
//! use apikit::{ConfigPatch, RequestDescriptor, TransportError};
//!
//! let patch = ConfigPatch::new().on_request(|req: RequestDescriptor| async move {
//!     Ok::<_, TransportError>(req.with_header("X-Client", "apikit"))
//! });
//! ```

use crate::error::{ApiError, TransportError};
use crate::http::{RequestDescriptor, ResponseEnvelope};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

/// Rewrites the outgoing request
#[async_trait]
pub trait RequestInterceptor: Send + Sync {
    async fn intercept(&self, request: RequestDescriptor) -> Result<RequestDescriptor, TransportError>;
}

/// Rewrites the transport's response
#[async_trait]
pub trait ResponseInterceptor: Send + Sync {
    async fn intercept(&self, response: ResponseEnvelope) -> Result<ResponseEnvelope, TransportError>;
}

/// Rewrites a classified failure; may reclassify it
#[async_trait]
pub trait ErrorInterceptor: Send + Sync {
    async fn intercept(&self, error: ApiError) -> ApiError;
}

#[async_trait]
impl<F, Fut> RequestInterceptor for F
where
    F: Fn(RequestDescriptor) -> Fut + Send + Sync,
    Fut: Future<Output = Result<RequestDescriptor, TransportError>> + Send,
{
    async fn intercept(&self, request: RequestDescriptor) -> Result<RequestDescriptor, TransportError> {
        self(request).await
    }
}

#[async_trait]
impl<F, Fut> ResponseInterceptor for F
where
    F: Fn(ResponseEnvelope) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ResponseEnvelope, TransportError>> + Send,
{
    async fn intercept(&self, response: ResponseEnvelope) -> Result<ResponseEnvelope, TransportError> {
        self(response).await
    }
}

#[async_trait]
impl<F, Fut> ErrorInterceptor for F
where
    F: Fn(ApiError) -> Fut + Send + Sync,
    Fut: Future<Output = ApiError> + Send,
{
    async fn intercept(&self, error: ApiError) -> ApiError {
        self(error).await
    }
}

/// Fire-and-forget notification for 401 responses
pub type UnauthorizedHandler = Arc<dyn Fn() + Send + Sync>;
