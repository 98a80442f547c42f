//! Versioned cache storage
//!
//! A cache storage holds any number of named cache stores. Each store maps
//! a request identity (method + normalized URL) to a full response
//! snapshot. The cache manager only ever reads from the store named by the
//! live cache version; the other stores exist only until the next
//! activation deletes them.

pub mod hash;
pub mod memory;
pub mod sqlite;

use pwa_offline_proto::{CacheEntry, ProtoError, RequestKey, ResponseSnapshot};
use serde::Serialize;
use thiserror::Error;

/// Error type for cache storage operations
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Snapshot codec error: {0}")]
    Codec(#[from] ProtoError),

    #[error("Cache store not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for CacheError {
    fn from(e: rusqlite::Error) -> Self {
        CacheError::Database(e.to_string())
    }
}

/// Trait for a set of named cache stores
///
/// This abstraction allows for different storage backends (SQLite, memory)
/// behind the same cache manager. Writes to an existing key replace the
/// previous snapshot; there is never more than one entry per key.
#[async_trait::async_trait]
pub trait CacheStorage: Send + Sync {
    /// Create the named store if it does not exist yet
    async fn open(&self, cache_name: &str) -> Result<(), CacheError>;

    /// Whether the named store exists
    async fn has(&self, cache_name: &str) -> Result<bool, CacheError>;

    /// Names of every existing store
    async fn keys(&self) -> Result<Vec<String>, CacheError>;

    /// Delete a store and all of its entries
    ///
    /// Returns `false` if there was no such store.
    async fn delete(&self, cache_name: &str) -> Result<bool, CacheError>;

    /// Store one snapshot
    ///
    /// Only `open` creates stores: writing into a store that does not exist
    /// (or was deleted by an activation) fails with `CacheError::NotFound`.
    async fn put(
        &self,
        cache_name: &str,
        key: &RequestKey,
        response: &ResponseSnapshot,
    ) -> Result<(), CacheError>;

    /// Store a batch of snapshots atomically: either all of them land or none
    async fn put_all(&self, cache_name: &str, entries: &[CacheEntry]) -> Result<(), CacheError>;

    /// Look up the snapshot stored for `key` in one store
    async fn match_key(
        &self,
        cache_name: &str,
        key: &RequestKey,
    ) -> Result<Option<ResponseSnapshot>, CacheError>;

    /// Every entry of one store, ordered by key
    async fn entries(&self, cache_name: &str) -> Result<Vec<CacheEntry>, CacheError>;

    /// Remember which cache version is active for a registration scope
    async fn record_active_version(&self, scope: &str, cache_name: &str) -> Result<(), CacheError>;

    /// The cache version last recorded as active for `scope`
    async fn active_version(&self, scope: &str) -> Result<Option<String>, CacheError>;

    /// Get the storage type identifier (e.g., "sqlite", "memory")
    fn storage_type(&self) -> &str;
}

/// Listing row for a cached entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntrySummary {
    pub method: String,
    pub url: String,
    pub status: u16,
    pub content_type: String,
    pub size: u64,
    pub sha256: String,
}

impl From<&CacheEntry> for EntrySummary {
    fn from(entry: &CacheEntry) -> Self {
        Self {
            method: entry.key.method.clone(),
            url: entry.key.url.clone(),
            status: entry.response.status,
            content_type: entry.response.content_type().to_string(),
            size: entry.response.body.len() as u64,
            sha256: hash::sha256(&entry.response.body),
        }
    }
}

/// Summary of one named store
#[derive(Debug, Clone, Serialize)]
pub struct StoreSummary {
    pub name: String,
    pub current: bool,
    pub entries: Vec<EntrySummary>,
}

/// Summarize every store, flagging the one named `current`
pub async fn summarize(
    storage: &dyn CacheStorage,
    current: &str,
) -> Result<Vec<StoreSummary>, CacheError> {
    let mut stores = Vec::new();
    for name in storage.keys().await? {
        let entries = storage.entries(&name).await?;
        stores.push(StoreSummary {
            current: name == current,
            entries: entries.iter().map(EntrySummary::from).collect(),
            name,
        });
    }
    Ok(stores)
}
