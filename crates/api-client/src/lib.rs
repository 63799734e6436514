//! Pluggable HTTP request orchestration
//!
//! This crate wraps a pluggable [`Transport`] with the behavior every call
//! needs, applied in one fixed pipeline:
//!
//! - **Configuration**: replace-on-write settings, process-wide or per handle
//! - **Authentication**: bearer token injection from a [`TokenStore`](apikit_core::token::TokenStore)
//! - **Caching**: GET responses cached by URL and sorted query parameters
//! - **Retries**: network failures and timeouts retried with 200ms exponential backoff
//! - **Cancellation**: cooperative, never retried
//! - **Interceptors**: request, response, and error hooks plus a 401 callback
//!
//! Three facades sit on top: [`ApiClient`] (stateless), [`ReactiveClient`]
//! (observable `{loading, error, data}` with cancelable verbs), and
//! [`Paginator`].
//!
//! # Example
//!
//! ```rust,no_run
//! use apikit::prelude::*;
//! use apikit_core::token::MemoryTokenStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     configure(
//!         ConfigPatch::new()
//!             .base_url("https://api.example.com")
//!             .token_store(MemoryTokenStore::with_token("secret"))
//!             .retry(2)
//!             .on_unauthorized(|| eprintln!("session expired")),
//!     )?;
//!
//!     let client = ApiClient::global();
//!     let user = client
//!         .get_with("/users", RequestOptions::new().param("page", 1))
//!         .await?;
//!     println!("status {}", user.status);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod interceptor;
pub mod pagination;
pub mod pipeline;
pub mod reactive;
pub mod request;
pub mod transport;

pub use client::ApiClient;
pub use config::{configure, get_config, get_transport, global, ApiConfig, ConfigFile, ConfigHandle, ConfigPatch};
pub use error::{classify, ApiError, ApiResult, TransportError};
pub use http::{Headers, HttpMethod, RawResponse, RequestDescriptor, ResponseBody, ResponseEnvelope};
pub use interceptor::{ErrorInterceptor, RequestInterceptor, ResponseInterceptor};
pub use pagination::{PageState, PaginationOptions, Paginator};
pub use pipeline::Pipeline;
pub use reactive::{ApiState, CancelableRequest, ReactiveClient, StateCell};
pub use request::RequestOptions;
pub use transport::{Transport, TransportKind, TransportSpec};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::client::ApiClient;
    pub use crate::config::{configure, get_config, ConfigHandle, ConfigPatch};
    pub use crate::error::{ApiError, ApiResult};
    pub use crate::http::{HttpMethod, ResponseBody, ResponseEnvelope};
    pub use crate::pagination::{PaginationOptions, Paginator};
    pub use crate::reactive::{ApiState, ReactiveClient};
    pub use crate::request::RequestOptions;
    pub use crate::transport::{Transport, TransportKind};
}
