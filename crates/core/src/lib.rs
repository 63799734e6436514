//! Core primitives for the ApiKit HTTP client
//!
//! This crate holds the pieces of the client that do not depend on any
//! particular transport:
//!
//! - **Error handling**: Structured errors with codes, context, and recovery suggestions
//! - **Backoff**: Exponential retry delays
//! - **Cache stores**: In-memory and file-backed response caches with TTL
//! - **Token stores**: In-memory and file-backed bearer token storage
//!
//! # Example
//!
//! ```rust,no_run
//! use apikit_core::prelude::*;
//!
//! # async fn demo() -> apikit_core::Result<()> {
//! let tokens = MemoryTokenStore::new();
//! tokens.set_token("secret").await?;
//!
//! let delay = BackoffPolicy::default().delay_for_attempt(1);
//! assert_eq!(delay.as_millis(), 400);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cache;
pub mod error;
pub mod retry;
pub mod token;

pub use error::{Error, ErrorCode, Result, ResultExt};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::cache::{CacheStore, FileCache, FileCacheConfig, MemoryCache};
    pub use crate::error::{Error, ErrorCode, Result, ResultExt};
    pub use crate::retry::BackoffPolicy;
    pub use crate::token::{FileTokenStore, MemoryTokenStore, TokenStore};
}
