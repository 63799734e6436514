//! The request orchestration pipeline
//!
//! One logical call runs these stages in a fixed order:
//!
//! 1. snapshot the configuration (reused by every retry)
//! 2. fail fast when a relative path has no base URL
//! 3. build the URL and cache key, then try the cache (GET only)
//! 4. per attempt: token, headers, descriptor, request interceptor,
//!    dispatch, response interceptor
//! 5. on success: unauthorized hook, cache store
//! 6. on failure: classify, error interceptor, unauthorized hook, then
//!    retry network failures and timeouts with exponential backoff
//!
//! Exactly one result is produced per call. Cache hits skip interceptors
//! and the transport entirely.

use crate::config::{ApiConfig, ConfigHandle};
use crate::error::{classify, ApiError, ApiResult, TransportError, BASE_URL_NOT_CONFIGURED};
use crate::http::{Headers, HttpMethod, RequestDescriptor, ResponseBody, ResponseEnvelope};
use crate::request::{
    append_query, cache_key, is_absolute_url, resolve_url, RequestOptions, DEFAULT_CACHE_TTL,
};
use apikit_core::cache::CacheStore;
use apikit_core::retry::BackoffPolicy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Message for a call with an empty path
pub const URL_REQUIRED: &str = "URL is required.";

/// What the cache holds for a GET; `raw` is never cached
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedResponse {
    data: ResponseBody,
    status: u16,
    headers: Headers,
}

impl From<&ResponseEnvelope> for CachedResponse {
    fn from(response: &ResponseEnvelope) -> Self {
        Self {
            data: response.data.clone(),
            status: response.status,
            headers: response.headers.clone(),
        }
    }
}

impl From<CachedResponse> for ResponseEnvelope {
    fn from(cached: CachedResponse) -> Self {
        Self {
            data: cached.data,
            status: cached.status,
            headers: cached.headers,
            raw: None,
        }
    }
}

/// Executes logical calls against a configuration handle
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    config: ConfigHandle,
    backoff: BackoffPolicy,
}

impl Pipeline {
    /// Pipeline reading `config` on every call
    #[must_use]
    pub fn new(config: ConfigHandle) -> Self {
        Self {
            config,
            backoff: BackoffPolicy::default(),
        }
    }

    /// A pipeline over the process-wide configuration
    #[must_use]
    pub fn global() -> Self {
        Self::new(crate::config::global())
    }

    /// The configuration handle
    #[must_use]
    pub fn config(&self) -> &ConfigHandle {
        &self.config
    }

    /// Run one logical call to completion
    ///
    /// Retries are internal; the caller sees a single outcome. A 4xx/5xx
    /// returned as a response by the transport is a success here; only
    /// transports that fail on error statuses produce [`ApiError::Http`].
    #[instrument(
        name = "api_request",
        skip(self, body, options),
        fields(request_id = %Uuid::new_v4())
    )]
    pub async fn execute(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<Value>,
        options: RequestOptions,
    ) -> ApiResult<ResponseEnvelope> {
        let config = self.config.config();

        if path.is_empty() {
            return Err(ApiError::config(URL_REQUIRED));
        }
        if config.base_url.is_empty() && !is_absolute_url(path) {
            return Err(ApiError::config(BASE_URL_NOT_CONFIGURED));
        }

        let resolved = resolve_url(&config.base_url, path);
        let call = Call {
            url: append_query(&resolved, &options.params),
            cache_key: cache_key(&resolved, &options.params),
            cache: config
                .cache_store
                .clone()
                .filter(|_| method == HttpMethod::Get && !options.no_cache),
            body: body.filter(|_| method.allows_body()),
            token: options.cancellation.clone().unwrap_or_default(),
            retries: options.retry.unwrap_or(config.retry),
            method,
            config,
            options,
        };

        if let Some(hit) = call.cached().await {
            debug!(key = %call.cache_key, status = hit.status, "cache hit");
            return Ok(hit);
        }

        call.run(&self.backoff).await
    }
}

struct Call {
    config: Arc<ApiConfig>,
    method: HttpMethod,
    url: String,
    cache_key: String,
    cache: Option<Arc<dyn CacheStore>>,
    body: Option<Value>,
    options: RequestOptions,
    token: CancellationToken,
    retries: u32,
}

impl Call {
    async fn run(&self, backoff: &BackoffPolicy) -> ApiResult<ResponseEnvelope> {
        let mut unauthorized_notified = false;
        let mut attempt = 0;

        loop {
            let outcome = if self.token.is_cancelled() {
                Err(TransportError::cancelled())
            } else {
                self.attempt().await
            };

            match outcome {
                Ok(response) => {
                    if response.status == 401 {
                        self.notify_unauthorized(&mut unauthorized_notified);
                    }
                    self.store(&response).await;
                    debug!(status = response.status, attempt, "request succeeded");
                    return Ok(response);
                }
                Err(raw) => {
                    let mut error = classify(&raw);
                    if let Some(interceptor) = &self.config.on_error {
                        error = interceptor.intercept(error).await;
                    }
                    if error.is_unauthorized() {
                        self.notify_unauthorized(&mut unauthorized_notified);
                    }

                    if !error.is_retryable() || attempt >= self.retries || self.token.is_cancelled() {
                        debug!(%error, attempt, "request failed");
                        return Err(error);
                    }

                    let delay = backoff.delay_for_attempt(attempt);
                    warn!(
                        %error,
                        attempt = attempt + 1,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "request failed, will retry"
                    );
                    tokio::select! {
                        biased;
                        () = self.token.cancelled() => return Err(ApiError::Cancelled),
                        () = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
            }
        }
    }

    async fn attempt(&self) -> Result<ResponseEnvelope, TransportError> {
        let bearer = self.bearer_token().await;

        let mut request = RequestDescriptor {
            url: self.url.clone(),
            method: self.method,
            body: self.body.clone(),
            headers: assemble_headers(
                &self.config.default_headers,
                &self.options.headers,
                bearer.as_deref(),
            ),
            timeout: Some(self.options.timeout.unwrap_or(self.config.timeout)),
            cancellation: Some(self.token.clone()),
        };

        if let Some(interceptor) = &self.config.on_request {
            request = interceptor.intercept(request).await?;
        }

        let transport = Arc::clone(&self.config.transport);
        debug!(transport = transport.name(), url = %request.url, "dispatching");
        let response = tokio::select! {
            biased;
            () = self.token.cancelled() => return Err(TransportError::cancelled()),
            result = transport.request(request) => result?,
        };

        match &self.config.on_response {
            Some(interceptor) => interceptor.intercept(response).await,
            None => Ok(response),
        }
    }

    /// Token lookup never fails the call
    async fn bearer_token(&self) -> Option<String> {
        let store = self.config.token_store.as_ref()?;
        match store.get_token().await {
            Ok(token) => token.filter(|t| !t.is_empty()),
            Err(e) => {
                warn!(error = %e, "token store read failed, continuing without token");
                None
            }
        }
    }

    fn notify_unauthorized(&self, notified: &mut bool) {
        if *notified {
            return;
        }
        if let Some(handler) = &self.config.on_unauthorized {
            *notified = true;
            handler();
        }
    }

    async fn cached(&self) -> Option<ResponseEnvelope> {
        let store = self.cache.as_ref()?;
        let bytes = match store.get(&self.cache_key).await {
            Ok(bytes) => bytes?,
            Err(e) => {
                warn!(error = %e, key = %self.cache_key, "cache read failed, treating as miss");
                return None;
            }
        };
        match serde_json::from_slice::<CachedResponse>(&bytes) {
            Ok(cached) => Some(cached.into()),
            Err(e) => {
                warn!(error = %e, key = %self.cache_key, "unreadable cache entry, treating as miss");
                None
            }
        }
    }

    /// Cache a 2xx response that has data; other statuses and empty bodies are never stored
    async fn store(&self, response: &ResponseEnvelope) {
        let Some(store) = &self.cache else {
            return;
        };
        if !response.is_success() || response.data.is_empty() {
            return;
        }

        let ttl = self.options.cache_ttl.unwrap_or(DEFAULT_CACHE_TTL);
        let bytes = match serde_json::to_vec(&CachedResponse::from(response)) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "response not cacheable");
                return;
            }
        };
        if let Err(e) = store.set(&self.cache_key, bytes, ttl).await {
            warn!(error = %e, key = %self.cache_key, "cache write failed");
        }
    }
}

/// `Content-Type: application/json`, then defaults, then per-call headers,
/// then `Authorization` when a token is present
///
/// Later layers replace earlier ones case-insensitively.
#[must_use]
pub fn assemble_headers(defaults: &Headers, per_call: &Headers, token: Option<&str>) -> Headers {
    let mut headers = Headers::new();
    overlay(&mut headers, "Content-Type", "application/json");
    for (name, value) in defaults.iter().chain(per_call) {
        overlay(&mut headers, name, value);
    }
    if let Some(token) = token {
        overlay(&mut headers, "Authorization", &format!("Bearer {token}"));
    }
    headers
}

fn overlay(headers: &mut Headers, name: &str, value: &str) {
    headers.retain(|existing, _| !existing.eq_ignore_ascii_case(name));
    headers.insert(name.to_string(), value.to_string());
}
