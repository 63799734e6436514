//! Response cache stores with per-entry TTL
//!
//! Two backends implement [`CacheStore`]:
//! - [`MemoryCache`]: process-local map, expiry checked on read and swept
//!   periodically on write
//! - [`FileCache`]: one `.meta`/`.data` file pair per entry with an
//!   integrity hash, optionally fronted by an in-memory layer
//!
//! Values are opaque bytes; callers own the encoding.
//!
//! # Example
//!
//! ```rust,no_run
//! use apikit_core::cache::{CacheStore, MemoryCache};
//! use std::time::Duration;
//!
//! # async fn demo() -> apikit_core::Result<()> {
//! let cache = MemoryCache::new();
//! cache.set("GET https://api.test/users", b"[]".to_vec(), Duration::from_secs(60)).await?;
//! assert!(cache.get("GET https://api.test/users").await?.is_some());
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::fs;
use tracing::debug;

/// Asynchronous key/value store with per-entry TTL
///
/// Expiry is the store's responsibility: an expired entry must read as a miss.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Read a live entry
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Write an entry that expires after `ttl`
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;

    /// Remove one entry, or every entry when `key` is `None`
    async fn clear(&self, key: Option<&str>) -> Result<()>;
}

/// Cache entry metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    /// When the entry was created (unix millis)
    created_at: i64,
    /// When the entry expires (unix millis)
    expires_at: i64,
    /// Size of the cached data in bytes
    size_bytes: u64,
    /// Hash of the cached data for integrity
    hash: String,
}

impl CacheEntry {
    fn new(data: &[u8], ttl: Duration) -> Self {
        let now = now_millis();
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        Self {
            created_at: now,
            expires_at: now.saturating_add(ttl_ms),
            size_bytes: data.len() as u64,
            hash: hash_bytes(data),
        }
    }

    fn is_expired(&self) -> bool {
        now_millis() >= self.expires_at
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

type MemoryMap = RwLock<HashMap<String, (CacheEntry, Vec<u8>)>>;

/// Writes between sweeps of expired in-memory entries
const SWEEP_INTERVAL: usize = 64;

fn memory_get(map: &MemoryMap, key: &str) -> Option<Vec<u8>> {
    let guard = map.read().unwrap_or_else(|e| e.into_inner());
    match guard.get(key) {
        Some((entry, data)) if !entry.is_expired() => Some(data.clone()),
        _ => None,
    }
}

/// Insert an entry, sweeping expired ones every [`SWEEP_INTERVAL`] writes
fn memory_insert(map: &MemoryMap, writes: &AtomicUsize, key: String, entry: CacheEntry, data: Vec<u8>) {
    let mut guard = map.write().unwrap_or_else(|e| e.into_inner());
    if (writes.fetch_add(1, Ordering::Relaxed) + 1) % SWEEP_INTERVAL == 0 {
        guard.retain(|_, (entry, _)| !entry.is_expired());
    }
    guard.insert(key, (entry, data));
}

fn memory_evict(map: &MemoryMap, key: Option<&str>) {
    let mut guard = map.write().unwrap_or_else(|e| e.into_inner());
    match key {
        Some(key) => {
            guard.remove(key);
        }
        None => guard.clear(),
    }
}

/// In-memory cache store
#[derive(Default)]
pub struct MemoryCache {
    entries: MemoryMap,
    writes: AtomicUsize,
}

impl MemoryCache {
    /// Create an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, including expired ones not yet swept
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether the cache holds no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop expired entries, returning how many were removed
    pub fn cleanup(&self) -> usize {
        let mut guard = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let before = guard.len();
        guard.retain(|_, (entry, _)| !entry.is_expired());
        before - guard.len()
    }
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache").field("entries", &self.len()).finish()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let hit = memory_get(&self.entries, key);
        if hit.is_none() {
            // Expired entries are dropped lazily
            let mut guard = self.entries.write().unwrap_or_else(|e| e.into_inner());
            if guard.get(key).is_some_and(|(entry, _)| entry.is_expired()) {
                guard.remove(key);
            }
        }
        Ok(hit)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        let entry = CacheEntry::new(&value, ttl);
        memory_insert(&self.entries, &self.writes, key.to_string(), entry, value);
        Ok(())
    }

    async fn clear(&self, key: Option<&str>) -> Result<()> {
        memory_evict(&self.entries, key);
        Ok(())
    }
}

/// File cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileCacheConfig {
    /// Cache directory path
    pub cache_dir: PathBuf,
    /// Keep a copy of entries in memory
    pub memory_cache: bool,
}

impl Default for FileCacheConfig {
    fn default() -> Self {
        let cache_dir = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from(".cache"))
            .join("apikit")
            .join("responses");

        Self {
            cache_dir,
            memory_cache: true,
        }
    }
}

/// File-based cache with optional in-memory layer
pub struct FileCache {
    config: FileCacheConfig,
    memory: Option<MemoryMap>,
    writes: AtomicUsize,
}

impl FileCache {
    /// Create a new cache instance, creating the directory if needed
    pub async fn new(config: FileCacheConfig) -> Result<Self> {
        fs::create_dir_all(&config.cache_dir).await?;

        let memory = config.memory_cache.then(|| RwLock::new(HashMap::new()));

        Ok(Self {
            config,
            memory,
            writes: AtomicUsize::new(0),
        })
    }

    /// Create with default configuration
    pub async fn default_cache() -> Result<Self> {
        Self::new(FileCacheConfig::default()).await
    }

    /// Directory holding the entry files
    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.config.cache_dir
    }

    fn hash_key(key: &str) -> String {
        hash_bytes(key.as_bytes())
    }

    fn entry_path(&self, cache_key: &str) -> PathBuf {
        self.config.cache_dir.join(format!("{cache_key}.meta"))
    }

    fn data_path(&self, cache_key: &str) -> PathBuf {
        self.config.cache_dir.join(format!("{cache_key}.data"))
    }

    async fn remove_files(&self, cache_key: &str) {
        let _ = fs::remove_file(self.entry_path(cache_key)).await;
        let _ = fs::remove_file(self.data_path(cache_key)).await;
    }
}

impl std::fmt::Debug for FileCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileCache")
            .field("cache_dir", &self.config.cache_dir)
            .field("memory_cache", &self.memory.is_some())
            .finish()
    }
}

#[async_trait]
impl CacheStore for FileCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let cache_key = Self::hash_key(key);

        if let Some(ref memory) = self.memory {
            if let Some(data) = memory_get(memory, &cache_key) {
                return Ok(Some(data));
            }
        }

        let entry_path = self.entry_path(&cache_key);
        let data_path = self.data_path(&cache_key);

        let meta = match fs::read_to_string(&entry_path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let entry: CacheEntry = serde_json::from_str(&meta)?;

        if entry.is_expired() {
            debug!(key = %key, "Cache entry expired");
            self.remove_files(&cache_key).await;
            return Ok(None);
        }

        let data = match fs::read(&data_path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.remove_files(&cache_key).await;
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        if hash_bytes(&data) != entry.hash {
            self.remove_files(&cache_key).await;
            return Err(Error::corrupt_entry(key));
        }

        if let Some(ref memory) = self.memory {
            let mut guard = memory.write().unwrap_or_else(|e| e.into_inner());
            guard.insert(cache_key, (entry, data.clone()));
        }

        Ok(Some(data))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        let cache_key = Self::hash_key(key);
        let entry = CacheEntry::new(&value, ttl);

        fs::write(self.entry_path(&cache_key), serde_json::to_string(&entry)?).await?;
        fs::write(self.data_path(&cache_key), &value).await?;

        if let Some(ref memory) = self.memory {
            memory_insert(memory, &self.writes, cache_key, entry, value);
        }

        Ok(())
    }

    async fn clear(&self, key: Option<&str>) -> Result<()> {
        match key {
            Some(key) => {
                let cache_key = Self::hash_key(key);
                if let Some(ref memory) = self.memory {
                    memory_evict(memory, Some(&cache_key));
                }
                self.remove_files(&cache_key).await;
            }
            None => {
                if let Some(ref memory) = self.memory {
                    memory_evict(memory, None);
                }
                let mut dir = fs::read_dir(&self.config.cache_dir).await?;
                while let Some(entry) = dir.next_entry().await? {
                    let _ = fs::remove_file(entry.path()).await;
                }
            }
        }
        Ok(())
    }
}
