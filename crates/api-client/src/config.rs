//! Process-wide client configuration
//!
//! [`ApiConfig`] is never mutated in place. [`ConfigHandle::configure`]
//! merges a [`ConfigPatch`] over the current value and swaps in the result,
//! so a request holding an earlier snapshot keeps seeing it until it ends.
//!
//! Patches can be built in code, read from `APIKIT_*` environment variables
//! with [`ConfigPatch::from_env`], or loaded from TOML with [`ConfigFile`].

use crate::error::{ApiError, ApiResult};
use crate::http::Headers;
use crate::interceptor::{ErrorInterceptor, RequestInterceptor, ResponseInterceptor, UnauthorizedHandler};
use crate::transport::{self, Transport, TransportKind, TransportSpec};
use apikit_core::Error as StoreError;
use apikit_core::cache::CacheStore;
use apikit_core::token::TokenStore;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, warn};

/// Transport timeout used until one is configured
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Effective configuration sampled by the pipeline
#[derive(Clone)]
pub struct ApiConfig {
    /// Prefix for relative request paths; empty means "not configured"
    pub base_url: String,
    /// Executor for every call
    pub transport: Arc<dyn Transport>,
    /// Source of the bearer token
    pub token_store: Option<Arc<dyn TokenStore>>,
    /// Response cache for GET requests; `None` disables caching
    pub cache_store: Option<Arc<dyn CacheStore>>,
    /// Sent with every request, below per-call headers
    pub default_headers: Headers,
    /// Per-call timeout unless overridden
    pub timeout: Duration,
    /// Extra attempts for network failures and timeouts
    pub retry: u32,
    /// Called at most once per logical call that ends in a 401
    pub on_unauthorized: Option<UnauthorizedHandler>,
    /// Runs before every attempt
    pub on_request: Option<Arc<dyn RequestInterceptor>>,
    /// Runs on every successful attempt
    pub on_response: Option<Arc<dyn ResponseInterceptor>>,
    /// Runs on every classified failure
    pub on_error: Option<Arc<dyn ErrorInterceptor>>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            transport: transport::default_transport(),
            token_store: None,
            cache_store: None,
            default_headers: Headers::new(),
            timeout: DEFAULT_TIMEOUT,
            retry: 0,
            on_unauthorized: None,
            on_request: None,
            on_response: None,
            on_error: None,
        }
    }
}

impl fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConfig")
            .field("base_url", &self.base_url)
            .field("transport", &self.transport.name())
            .field("token_store", &self.token_store.is_some())
            .field("cache_store", &self.cache_store.is_some())
            .field("default_headers", &self.default_headers)
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .field("on_unauthorized", &self.on_unauthorized.is_some())
            .field("on_request", &self.on_request.is_some())
            .field("on_response", &self.on_response.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

impl ApiConfig {
    /// Shallow merge: every field set on `patch` replaces the current one
    ///
    /// A built-in transport that is not compiled in falls back to the
    /// default transport with a warning.
    #[must_use]
    pub fn merged(&self, patch: ConfigPatch) -> Self {
        let mut next = self.clone();

        if let Some(base_url) = patch.base_url {
            next.base_url = base_url;
        }
        if let Some(spec) = patch.transport {
            next.transport = match spec {
                TransportSpec::Custom(instance) => instance,
                TransportSpec::Builtin(kind) => transport::resolve(kind).unwrap_or_else(|e| {
                    warn!(error = %e, "transport unavailable, falling back to reqwest");
                    transport::default_transport()
                }),
            };
        }
        if let Some(store) = patch.token_store {
            next.token_store = Some(store);
        }
        if let Some(store) = patch.cache_store {
            next.cache_store = Some(store);
        }
        if let Some(headers) = patch.default_headers {
            next.default_headers = headers;
        }
        if let Some(timeout) = patch.timeout {
            next.timeout = timeout;
        }
        if let Some(retry) = patch.retry {
            next.retry = retry;
        }
        if let Some(handler) = patch.on_unauthorized {
            next.on_unauthorized = Some(handler);
        }
        if let Some(interceptor) = patch.on_request {
            next.on_request = Some(interceptor);
        }
        if let Some(interceptor) = patch.on_response {
            next.on_response = Some(interceptor);
        }
        if let Some(interceptor) = patch.on_error {
            next.on_error = Some(interceptor);
        }

        next
    }

    /// Check the values a patch can get wrong
    ///
    /// An empty base URL is valid: absolute request paths still work.
    pub fn validate(&self) -> ApiResult<()> {
        if !self.base_url.is_empty()
            && !self.base_url.starts_with("http://")
            && !self.base_url.starts_with("https://")
        {
            return Err(ApiError::config("base_url must start with http:// or https://"));
        }

        if self.timeout.is_zero() {
            return Err(ApiError::config("timeout cannot be zero"));
        }

        Ok(())
    }
}

/// Partial configuration; unset fields keep their current value
#[derive(Clone, Default)]
pub struct ConfigPatch {
    /// Prefix for relative paths
    pub base_url: Option<String>,
    /// Built-in transport kind or a custom instance
    pub transport: Option<TransportSpec>,
    /// Source of the bearer token
    pub token_store: Option<Arc<dyn TokenStore>>,
    /// Response cache for GET requests; `None` disables caching
    pub cache_store: Option<Arc<dyn CacheStore>>,
    /// Replaces the whole default header map
    pub default_headers: Option<Headers>,
    /// Per-call timeout
    pub timeout: Option<Duration>,
    /// Extra attempts for network failures and timeouts
    pub retry: Option<u32>,
    /// Called at most once per logical call that ends in a 401
    pub on_unauthorized: Option<UnauthorizedHandler>,
    /// Runs before every attempt
    pub on_request: Option<Arc<dyn RequestInterceptor>>,
    /// Runs on every successful attempt
    pub on_response: Option<Arc<dyn ResponseInterceptor>>,
    /// Runs on every classified failure
    pub on_error: Option<Arc<dyn ErrorInterceptor>>,
}

impl fmt::Debug for ConfigPatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigPatch")
            .field("base_url", &self.base_url)
            .field("transport", &self.transport)
            .field("default_headers", &self.default_headers)
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl ConfigPatch {
    /// Empty patch
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the base URL
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Select a built-in transport or install an instance
    #[must_use]
    pub fn transport(mut self, spec: impl Into<TransportSpec>) -> Self {
        self.transport = Some(spec.into());
        self
    }

    /// Install a transport instance as-is
    #[must_use]
    pub fn custom_transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(TransportSpec::custom(transport));
        self
    }

    /// Set the bearer token source
    #[must_use]
    pub fn token_store(mut self, store: impl TokenStore + 'static) -> Self {
        self.token_store = Some(Arc::new(store));
        self
    }

    /// Enable response caching with `store`
    #[must_use]
    pub fn cache_store(mut self, store: impl CacheStore + 'static) -> Self {
        self.cache_store = Some(Arc::new(store));
        self
    }

    /// Add one default header, starting from an empty map
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers
            .get_or_insert_with(Headers::new)
            .insert(name.into(), value.into());
        self
    }

    /// Replace the default header map
    #[must_use]
    pub fn default_headers(mut self, headers: Headers) -> Self {
        self.default_headers = Some(headers);
        self
    }

    /// Set the per-call timeout
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the retry count
    #[must_use]
    pub fn retry(mut self, retry: u32) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Called once per logical request that ends in a 401
    #[must_use]
    pub fn on_unauthorized(mut self, handler: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_unauthorized = Some(Arc::new(handler));
        self
    }

    /// Install the request interceptor
    #[must_use]
    pub fn on_request(mut self, interceptor: impl RequestInterceptor + 'static) -> Self {
        self.on_request = Some(Arc::new(interceptor));
        self
    }

    /// Install the response interceptor
    #[must_use]
    pub fn on_response(mut self, interceptor: impl ResponseInterceptor + 'static) -> Self {
        self.on_response = Some(Arc::new(interceptor));
        self
    }

    /// Install the error interceptor
    #[must_use]
    pub fn on_error(mut self, interceptor: impl ErrorInterceptor + 'static) -> Self {
        self.on_error = Some(Arc::new(interceptor));
        self
    }

    /// Read a patch from the process environment
    ///
    /// Reads the following environment variables:
    /// - `APIKIT_BASE_URL`: base URL for relative paths
    /// - `APIKIT_TRANSPORT`: `reqwest`/`fetch` or `ureq`/`axios`
    /// - `APIKIT_RETRY`: retry count
    /// - `APIKIT_TIMEOUT_MS`: transport timeout in milliseconds
    pub fn from_env() -> ApiResult<Self> {
        Self::from_vars(|name| env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> ApiResult<Self> {
        let mut patch = Self::new();

        if let Some(url) = lookup("APIKIT_BASE_URL") {
            patch.base_url = Some(url);
        }
        if let Some(kind) = lookup("APIKIT_TRANSPORT") {
            let kind: TransportKind = kind
                .parse()
                .map_err(|_| StoreError::invalid_value("APIKIT_TRANSPORT", &kind))?;
            patch.transport = Some(kind.into());
        }
        if let Some(retry) = lookup("APIKIT_RETRY") {
            let retry = retry
                .trim()
                .parse()
                .map_err(|_| StoreError::invalid_value("APIKIT_RETRY", &retry))?;
            patch.retry = Some(retry);
        }
        if let Some(ms) = lookup("APIKIT_TIMEOUT_MS") {
            let ms: u64 = ms
                .trim()
                .parse()
                .map_err(|_| StoreError::invalid_value("APIKIT_TIMEOUT_MS", &ms))?;
            patch.timeout = Some(Duration::from_millis(ms));
        }

        Ok(patch)
    }
}

/// Serialisable subset of the configuration
///
/// ```toml
/// base_url = "https://api.example.com"
/// transport = "fetch"
/// retry = 2
/// timeout_ms = 5000
///
/// [headers]
/// X-Client = "apikit"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    /// Prefix for relative paths
    pub base_url: Option<String>,
    /// Built-in transport kind
    pub transport: Option<TransportKind>,
    /// Extra attempts for network failures and timeouts
    pub retry: Option<u32>,
    /// Per-call timeout in milliseconds
    pub timeout_ms: Option<u64>,
    /// Default headers
    pub headers: Headers,
}

impl ConfigFile {
    /// Load from a TOML file
    pub fn load(path: impl AsRef<Path>) -> apikit_core::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                apikit_core::Error::config_not_found(path)
            } else {
                apikit_core::Error::from(e)
            }
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> apikit_core::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Convert into a patch; an empty header table leaves defaults alone
    #[must_use]
    pub fn into_patch(self) -> ConfigPatch {
        ConfigPatch {
            base_url: self.base_url,
            transport: self.transport.map(TransportSpec::Builtin),
            default_headers: (!self.headers.is_empty()).then_some(self.headers),
            timeout: self.timeout_ms.map(Duration::from_millis),
            retry: self.retry,
            ..ConfigPatch::default()
        }
    }
}

/// Shared replace-on-write configuration cell
///
/// Clones share the same cell.
#[derive(Debug, Clone, Default)]
pub struct ConfigHandle {
    inner: Arc<RwLock<Arc<ApiConfig>>>,
}

impl ConfigHandle {
    /// Handle holding `config`
    #[must_use]
    pub fn new(config: ApiConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(config))),
        }
    }

    /// A handle whose initial value is the default config merged with `patch`
    pub fn with_patch(patch: ConfigPatch) -> ApiResult<Self> {
        let config = ApiConfig::default().merged(patch);
        config.validate()?;
        Ok(Self::new(config))
    }

    /// Merge `patch` over the current configuration and install the result
    ///
    /// A merged configuration that fails [`ApiConfig::validate`] is rejected
    /// and the current one stays installed.
    pub fn configure(&self, patch: ConfigPatch) -> ApiResult<Arc<ApiConfig>> {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let next = guard.merged(patch);
        if let Err(e) = next.validate() {
            warn!(error = %e, "configuration rejected");
            return Err(e);
        }
        let next = Arc::new(next);
        debug!(
            base_url = %next.base_url,
            transport = next.transport.name(),
            retry = next.retry,
            "configuration replaced"
        );
        *guard = Arc::clone(&next);
        Ok(next)
    }

    /// Install a complete configuration
    pub fn replace(&self, config: ApiConfig) -> ApiResult<()> {
        config.validate()?;
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(config);
        Ok(())
    }

    /// Current snapshot
    #[must_use]
    pub fn config(&self) -> Arc<ApiConfig> {
        Arc::clone(&self.inner.read().unwrap_or_else(|e| e.into_inner()))
    }

    /// Transport of the current snapshot
    #[must_use]
    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.config().transport)
    }
}

static GLOBAL: Lazy<ConfigHandle> = Lazy::new(ConfigHandle::default);

/// The process-wide handle used by [`ApiClient::global`](crate::ApiClient::global)
#[must_use]
pub fn global() -> ConfigHandle {
    GLOBAL.clone()
}

/// Merge `patch` into the process-wide configuration
pub fn configure(patch: ConfigPatch) -> ApiResult<Arc<ApiConfig>> {
    GLOBAL.configure(patch)
}

/// Snapshot of the process-wide configuration
#[must_use]
pub fn get_config() -> Arc<ApiConfig> {
    GLOBAL.config()
}

/// Transport of the process-wide configuration
#[must_use]
pub fn get_transport() -> Arc<dyn Transport> {
    GLOBAL.transport()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::http::{RequestDescriptor, ResponseEnvelope};
    use apikit_core::token::MemoryTokenStore;
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct Named(&'static str);

    #[async_trait]
    impl Transport for Named {
        fn name(&self) -> &'static str {
            self.0
        }

        async fn request(&self, _: RequestDescriptor) -> Result<ResponseEnvelope, TransportError> {
            Err(TransportError::new("not wired"))
        }
    }

    #[test]
    fn test_defaults() {
        let config = ApiConfig::default();
        assert!(config.base_url.is_empty());
        assert_eq!(config.timeout, Duration::from_millis(10_000));
        assert_eq!(config.retry, 0);
        assert_eq!(config.transport.name(), "reqwest");
        assert!(config.token_store.is_none());
    }

    #[test]
    fn test_merge_keeps_omitted_fields() {
        let first = ApiConfig::default().merged(
            ConfigPatch::new()
                .base_url("https://api.test")
                .retry(3)
                .header("X-App", "demo"),
        );
        let second = first.merged(ConfigPatch::new().timeout(Duration::from_secs(2)));

        assert_eq!(second.base_url, "https://api.test");
        assert_eq!(second.retry, 3);
        assert_eq!(second.default_headers.get("X-App").map(String::as_str), Some("demo"));
        assert_eq!(second.timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_headers_are_replaced_not_merged() {
        let first = ApiConfig::default().merged(ConfigPatch::new().header("A", "1"));
        let second = first.merged(ConfigPatch::new().header("B", "2"));
        assert!(!second.default_headers.contains_key("A"));
        assert!(second.default_headers.contains_key("B"));
    }

    #[test]
    fn test_custom_transport_installed_directly() {
        let config = ApiConfig::default().merged(ConfigPatch::new().custom_transport(Named("stub")));
        assert_eq!(config.transport.name(), "stub");

        let config = config.merged(ConfigPatch::new().transport(TransportKind::Reqwest));
        assert_eq!(config.transport.name(), "reqwest");
    }

    #[cfg(not(feature = "ureq"))]
    #[test]
    fn test_unavailable_transport_falls_back() {
        let config = ApiConfig::default()
            .merged(ConfigPatch::new().custom_transport(Named("stub")))
            .merged(ConfigPatch::new().transport(TransportKind::Ureq));
        assert_eq!(config.transport.name(), "reqwest");
    }

    #[test]
    fn test_validate() {
        assert!(ApiConfig::default().validate().is_ok());

        let bad_scheme = ApiConfig::default().merged(ConfigPatch::new().base_url("ftp://x"));
        assert!(matches!(bad_scheme.validate(), Err(ApiError::Config(_))));

        let zero = ApiConfig::default().merged(ConfigPatch::new().timeout(Duration::ZERO));
        assert!(zero.validate().is_err());
    }

    #[test]
    fn test_handle_snapshot_is_stable_across_configure() {
        let handle = ConfigHandle::with_patch(ConfigPatch::new().base_url("https://one.test")).unwrap();
        let before = handle.config();

        handle.configure(
            ConfigPatch::new()
                .base_url("https://two.test")
                .token_store(MemoryTokenStore::new()),
        ).unwrap();

        assert_eq!(before.base_url, "https://one.test");
        assert!(before.token_store.is_none());
        assert_eq!(handle.config().base_url, "https://two.test");
        assert!(handle.config().token_store.is_some());
    }

    #[test]
    fn test_configure_rejects_invalid_merge() {
        let handle = ConfigHandle::with_patch(ConfigPatch::new().base_url("https://one.test")).unwrap();

        let err = handle.configure(ConfigPatch::new().timeout(Duration::ZERO).retry(3)).unwrap_err();
        assert_eq!(err, ApiError::config("timeout cannot be zero"));
        assert!(handle.configure(ConfigPatch::new().base_url("ftp://x")).is_err());

        let current = handle.config();
        assert_eq!(current.timeout, DEFAULT_TIMEOUT);
        assert_eq!(current.retry, 0);
        assert_eq!(current.base_url, "https://one.test");

        assert!(ConfigHandle::with_patch(ConfigPatch::new().timeout(Duration::ZERO)).is_err());
        let mut zero = ApiConfig::default();
        zero.timeout = Duration::ZERO;
        assert!(handle.replace(zero).is_err());
    }

    #[test]
    fn test_handle_clones_share_state() {
        let handle = ConfigHandle::default();
        let other = handle.clone();
        other.configure(ConfigPatch::new().retry(5)).unwrap();
        assert_eq!(handle.config().retry, 5);

        handle.replace(ApiConfig::default()).unwrap();
        assert_eq!(other.config().retry, 0);
    }

    #[test]
    fn test_from_vars() {
        let vars: HashMap<&str, &str> = [
            ("APIKIT_BASE_URL", "https://env.test"),
            ("APIKIT_TRANSPORT", "fetch"),
            ("APIKIT_RETRY", "2"),
            ("APIKIT_TIMEOUT_MS", "2500"),
        ]
        .into_iter()
        .collect();

        let patch = ConfigPatch::from_vars(|k| vars.get(k).map(ToString::to_string)).unwrap();
        assert_eq!(patch.base_url.as_deref(), Some("https://env.test"));
        assert_eq!(patch.retry, Some(2));
        assert_eq!(patch.timeout, Some(Duration::from_millis(2500)));
        assert!(matches!(
            patch.transport,
            Some(TransportSpec::Builtin(TransportKind::Reqwest))
        ));
    }

    #[test]
    fn test_from_vars_rejects_garbage() {
        let err = ConfigPatch::from_vars(|k| (k == "APIKIT_RETRY").then(|| "many".to_string()))
            .unwrap_err();
        assert_eq!(err, ApiError::config("Invalid value for APIKIT_RETRY: many"));

        assert!(ConfigPatch::from_vars(|k| (k == "APIKIT_TRANSPORT").then(|| "curl".into())).is_err());
        assert!(ConfigPatch::from_vars(|_| None).unwrap().base_url.is_none());
    }

    #[test]
    fn test_config_file_into_patch() {
        let file = ConfigFile::from_toml_str(
            r#"
            base_url = "https://file.test"
            transport = "axios"
            timeout_ms = 1500

            [headers]
            X-Client = "apikit"
            "#,
        )
        .unwrap();

        assert_eq!(file.transport, Some(TransportKind::Ureq));
        let patch = file.into_patch();
        assert_eq!(patch.timeout, Some(Duration::from_millis(1500)));
        assert!(patch.retry.is_none());
        assert_eq!(
            patch.default_headers.unwrap().get("X-Client").map(String::as_str),
            Some("apikit")
        );
    }

    #[test]
    fn test_config_file_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("apikit.toml");
        std::fs::write(&path, "retry = 4\n").unwrap();

        let file = ConfigFile::load(&path).unwrap();
        assert_eq!(file.retry, Some(4));
        assert!(file.into_patch().default_headers.is_none());

        let missing = ConfigFile::load(dir.path().join("nope.toml")).unwrap_err();
        assert_eq!(missing.code, apikit_core::ErrorCode::ConfigNotFound);
    }

    #[test]
    fn test_bad_toml_is_parse_error() {
        let err = ConfigFile::from_toml_str("retry = \"lots\"").unwrap_err();
        assert_eq!(err.code, apikit_core::ErrorCode::ConfigParseError);
    }
}
