//! Stateless client facade

use crate::config::ConfigHandle;
use crate::error::{ApiError, ApiResult};
use crate::http::{HttpMethod, ResponseEnvelope};
use crate::pipeline::Pipeline;
use crate::request::RequestOptions;
use serde::Serialize;
use serde_json::Value;
use tracing::instrument;

/// Plain client: every verb resolves to the call's single outcome
///
/// There is no implicit cancellation bookkeeping; pass a token through
/// [`RequestOptions::cancellation`] to make a call cancelable.
///
/// ```rust,no_run
/// use apikit::{configure, ApiClient, ConfigPatch};
///
/// # async fn demo() -> apikit::ApiResult<()> {
/// configure(ConfigPatch::new().base_url("https://api.example.com").retry(2))?;
///
/// let user = ApiClient::global().get("/users/1").await?;
/// println!("{} {:?}", user.status, user.data);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct ApiClient {
    pipeline: Pipeline,
}

impl ApiClient {
    /// Create a client bound to `config`
    #[must_use]
    pub fn new(config: ConfigHandle) -> Self {
        Self {
            pipeline: Pipeline::new(config),
        }
    }

    /// Create a client bound to the process-wide configuration
    #[must_use]
    pub fn global() -> Self {
        Self {
            pipeline: Pipeline::global(),
        }
    }

    /// The configuration handle this client reads
    #[must_use]
    pub fn config(&self) -> &ConfigHandle {
        self.pipeline.config()
    }

    // -------------------------------------------------------------------------
    // Verbs
    // -------------------------------------------------------------------------

    /// `GET path` with default options
    pub async fn get(&self, path: &str) -> ApiResult<ResponseEnvelope> {
        self.get_with(path, RequestOptions::default()).await
    }

    /// `GET path` with per-call options
    #[instrument(skip(self, options))]
    pub async fn get_with(&self, path: &str, options: RequestOptions) -> ApiResult<ResponseEnvelope> {
        self.request(HttpMethod::Get, path, None, options).await
    }

    /// `POST path` with a JSON body
    pub async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> ApiResult<ResponseEnvelope> {
        self.post_with(path, body, RequestOptions::default()).await
    }

    /// `POST path` with a JSON body and per-call options
    #[instrument(skip(self, body, options))]
    pub async fn post_with<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        options: RequestOptions,
    ) -> ApiResult<ResponseEnvelope> {
        let body = to_body(body)?;
        self.request(HttpMethod::Post, path, Some(body), options).await
    }

    /// `PUT path` with a JSON body
    pub async fn put<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> ApiResult<ResponseEnvelope> {
        self.put_with(path, body, RequestOptions::default()).await
    }

    /// `PUT path` with a JSON body and per-call options
    #[instrument(skip(self, body, options))]
    pub async fn put_with<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        options: RequestOptions,
    ) -> ApiResult<ResponseEnvelope> {
        let body = to_body(body)?;
        self.request(HttpMethod::Put, path, Some(body), options).await
    }

    /// `PATCH path` with a JSON body
    pub async fn patch<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> ApiResult<ResponseEnvelope> {
        self.patch_with(path, body, RequestOptions::default()).await
    }

    /// `PATCH path` with a JSON body and per-call options
    #[instrument(skip(self, body, options))]
    pub async fn patch_with<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        options: RequestOptions,
    ) -> ApiResult<ResponseEnvelope> {
        let body = to_body(body)?;
        self.request(HttpMethod::Patch, path, Some(body), options).await
    }

    /// DELETE; named `del` to match the other facades
    pub async fn del(&self, path: &str) -> ApiResult<ResponseEnvelope> {
        self.del_with(path, RequestOptions::default()).await
    }

    /// `DELETE path` with per-call options
    #[instrument(skip(self, options))]
    pub async fn del_with(&self, path: &str, options: RequestOptions) -> ApiResult<ResponseEnvelope> {
        self.request(HttpMethod::Delete, path, None, options).await
    }

    /// Run any method through the pipeline
    pub async fn request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<Value>,
        options: RequestOptions,
    ) -> ApiResult<ResponseEnvelope> {
        self.pipeline.execute(method, path, body, options).await
    }
}

pub(crate) fn to_body<B: Serialize + ?Sized>(body: &B) -> ApiResult<Value> {
    serde_json::to_value(body)
        .map_err(|e| ApiError::unknown(format!("failed to serialize request body: {e}")))
}
