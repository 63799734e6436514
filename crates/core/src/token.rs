//! Bearer token storage
//!
//! The pipeline only ever reads tokens; applications write them after login
//! and remove them on logout or when the server answers 401.

use crate::error::{Error, Result, ResultExt};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tokio::fs;

/// Key under which the token is persisted
pub const TOKEN_KEY: &str = "apikit_token";

/// Asynchronous bearer token store
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Read the current token, if any
    async fn get_token(&self) -> Result<Option<String>>;

    /// Persist a token, replacing any previous one
    async fn set_token(&self, token: &str) -> Result<()>;

    /// Forget the current token
    async fn remove_token(&self) -> Result<()>;
}

/// Process-local token store
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: RwLock<Option<String>>,
}

impl MemoryTokenStore {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already holds `token`
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn get_token(&self) -> Result<Option<String>> {
        Ok(self.token.read().unwrap_or_else(|e| e.into_inner()).clone())
    }

    async fn set_token(&self, token: &str) -> Result<()> {
        *self.token.write().unwrap_or_else(|e| e.into_inner()) = Some(token.to_string());
        Ok(())
    }

    async fn remove_token(&self) -> Result<()> {
        *self.token.write().unwrap_or_else(|e| e.into_inner()) = None;
        Ok(())
    }
}

/// Token persisted in a small JSON document on disk
///
/// The document is an object so other keys written by the host survive
/// token updates.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    /// Store the token in the JSON document at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default location under the platform data directory
    pub fn default_location() -> Result<Self> {
        let dir = dirs::data_dir().ok_or_else(|| {
            Error::token_store("No data directory available on this platform")
                .with_suggestion("Use FileTokenStore::new with an explicit path")
        })?;
        Ok(Self::new(dir.join("apikit").join("token.json")))
    }

    /// Path of the backing document
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_document(&self) -> Result<Map<String, Value>> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(Error::from(e).with_context("reading token document")),
        };

        if content.trim().is_empty() {
            return Ok(Map::new());
        }

        match serde_json::from_str::<Value>(&content)? {
            Value::Object(map) => Ok(map),
            _ => Err(Error::token_store(format!(
                "Token document is not a JSON object: {}",
                self.path.display()
            ))),
        }
    }

    async fn write_document(&self, document: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(document)?;
        fs::write(&self.path, content)
            .await
            .map_err(Error::from)
            .context("writing token document")
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn get_token(&self) -> Result<Option<String>> {
        let document = self.read_document().await?;
        Ok(document
            .get(TOKEN_KEY)
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    async fn set_token(&self, token: &str) -> Result<()> {
        let mut document = self.read_document().await?;
        document.insert(TOKEN_KEY.to_string(), Value::String(token.to_string()));
        self.write_document(&document).await
    }

    async fn remove_token(&self) -> Result<()> {
        let mut document = self.read_document().await?;
        if document.remove(TOKEN_KEY).is_some() {
            self.write_document(&document).await?;
        }
        Ok(())
    }
}
