//! Per-call overrides and URL construction

use crate::http::Headers;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::form_urlencoded;

/// TTL for cached GET responses when the call does not set one
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_millis(60_000);

/// Options for a single logical call
///
/// Query parameters keep insertion order on the wire; `None` values are
/// dropped. The cache key sorts them, so order never splits the cache.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Merged over the configured default headers
    pub headers: Headers,
    /// Query parameters in insertion order; `None` values are skipped
    pub params: Vec<(String, Option<String>)>,
    /// Overrides the configured transport timeout
    pub timeout: Option<Duration>,
    /// Caller-owned cancellation signal
    pub cancellation: Option<CancellationToken>,
    /// Lifetime of a cached response
    pub cache_ttl: Option<Duration>,
    /// Skip both cache lookup and cache store
    pub no_cache: bool,
    /// Overrides the configured retry count
    pub retry: Option<u32>,
}

impl RequestOptions {
    /// Options that inherit every configured default
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header above the configured defaults
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Add a query parameter
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((name.into(), Some(value.to_string())));
        self
    }

    /// Add a parameter that is omitted from the query when `None`
    #[must_use]
    pub fn param_opt<V: ToString>(mut self, name: impl Into<String>, value: Option<V>) -> Self {
        self.params.push((name.into(), value.map(|v| v.to_string())));
        self
    }

    /// Override the configured timeout
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Make the call cancelable through `token`
    #[must_use]
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Override the cache lifetime
    #[must_use]
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    /// Skip cache reads and writes
    #[must_use]
    pub fn no_cache(mut self) -> Self {
        self.no_cache = true;
        self
    }

    /// Override the configured retry count
    #[must_use]
    pub fn retry(mut self, retry: u32) -> Self {
        self.retry = Some(retry);
        self
    }
}

/// Whether `path` carries its own http(s) scheme
#[must_use]
pub fn is_absolute_url(path: &str) -> bool {
    let lower = path.get(..8).unwrap_or(path).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Absolute paths are used verbatim, anything else is appended to `base_url`
#[must_use]
pub fn resolve_url(base_url: &str, path: &str) -> String {
    if is_absolute_url(path) {
        path.to_string()
    } else {
        format!("{base_url}{path}")
    }
}

fn encode<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}

fn present(params: &[(String, Option<String>)]) -> impl Iterator<Item = (&str, &str)> {
    params
        .iter()
        .filter_map(|(k, v)| v.as_deref().map(|v| (k.as_str(), v)))
}

fn join_query(url: &str, query: &str) -> String {
    if query.is_empty() {
        return url.to_string();
    }
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}{query}")
}

/// Append encoded parameters with `?` or `&` as the URL requires
#[must_use]
pub fn append_query(url: &str, params: &[(String, Option<String>)]) -> String {
    join_query(url, &encode(present(params)))
}

/// Deterministic cache key: resolved URL plus parameters sorted by name
///
/// Joined the same way as [`append_query`], so a path that already carries a
/// query string gets `&`.
#[must_use]
pub fn cache_key(url: &str, params: &[(String, Option<String>)]) -> String {
    let mut sorted: Vec<_> = present(params).collect();
    sorted.sort_unstable();
    join_query(url, &encode(sorted))
}
