//! Pluggable executors for a single HTTP call
//!
//! | Kind | Type | Availability |
//! |------|------|--------------|
//! | `reqwest` (alias `fetch`) | [`ReqwestTransport`] | always |
//! | `ureq` (alias `axios`) | `UreqTransport` | `ureq` cargo feature |
//!
//! Custom transports implement [`Transport`] and are installed with
//! [`TransportSpec::Custom`].

mod reqwest_transport;
#[cfg(feature = "ureq")]
mod ureq_transport;

pub use reqwest_transport::{ReqwestRaw, ReqwestTransport};
#[cfg(feature = "ureq")]
pub use ureq_transport::{UreqRaw, UreqTransport};

use crate::error::TransportError;
use crate::http::{RequestDescriptor, ResponseEnvelope};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// Performs one HTTP call
///
/// Implementations must populate `status` and `data`, honor the
/// descriptor's timeout and cancellation token, and report a fired token
/// with [`TransportError::cancelled`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short identifier used in logs
    fn name(&self) -> &'static str;

    async fn request(&self, request: RequestDescriptor) -> Result<ResponseEnvelope, TransportError>;
}

/// Built-in transport identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Async reqwest client
    #[serde(alias = "fetch")]
    Reqwest,
    /// Blocking ureq client
    #[serde(alias = "axios")]
    Ureq,
}

impl TransportKind {
    /// Canonical lowercase name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reqwest => "reqwest",
            Self::Ureq => "ureq",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reqwest" | "fetch" => Ok(Self::Reqwest),
            "ureq" | "axios" => Ok(Self::Ureq),
            other => Err(format!("unknown transport: {other}")),
        }
    }
}

/// Transport selection accepted by configuration
#[derive(Clone)]
pub enum TransportSpec {
    /// Resolve a built-in transport through [`resolve`]
    Builtin(TransportKind),
    /// Install this instance as-is
    Custom(Arc<dyn Transport>),
}

impl TransportSpec {
    /// Wrap a transport instance
    pub fn custom(transport: impl Transport + 'static) -> Self {
        Self::Custom(Arc::new(transport))
    }
}

impl fmt::Debug for TransportSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Builtin(kind) => f.debug_tuple("Builtin").field(kind).finish(),
            Self::Custom(transport) => f.debug_tuple("Custom").field(&transport.name()).finish(),
        }
    }
}

impl From<TransportKind> for TransportSpec {
    fn from(kind: TransportKind) -> Self {
        Self::Builtin(kind)
    }
}

/// A built-in transport was requested but is not compiled in
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("transport '{kind}' is unavailable; enable the `{kind}` cargo feature")]
pub struct TransportUnavailable {
    /// The kind that was requested
    pub kind: TransportKind,
}

/// The transport used when nothing else is configured
#[must_use]
pub fn default_transport() -> Arc<dyn Transport> {
    Arc::new(ReqwestTransport::new())
}

/// Instantiate a built-in transport
pub fn resolve(kind: TransportKind) -> Result<Arc<dyn Transport>, TransportUnavailable> {
    match kind {
        TransportKind::Reqwest => Ok(default_transport()),
        #[cfg(feature = "ureq")]
        TransportKind::Ureq => Ok(Arc::new(UreqTransport::new())),
        #[cfg(not(feature = "ureq"))]
        TransportKind::Ureq => Err(TransportUnavailable { kind }),
    }
}
