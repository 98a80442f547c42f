//! SQLite implementation of the CacheStorage trait

use crate::cache_store::hash::sha256;
use crate::cache_store::{CacheError, CacheStorage};
use chrono::Utc;
use pwa_offline_proto::{CacheEntry, RequestKey, ResponseSnapshot, decode_snapshot, encode_snapshot};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

/// SQLite-backed implementation of CacheStorage
#[derive(Clone)]
pub struct SqliteCacheStorage {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCacheStorage {
    /// Create a new SQLite cache storage
    ///
    /// If the database doesn't exist, it will be created with the required schema.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, CacheError> {
        let conn = Connection::open(db_path.as_ref())?;
        info!("Opened cache storage at {:?}", db_path.as_ref());
        Self::from_connection(conn)
    }

    /// Create a storage backed by a private in-memory database
    pub fn in_memory() -> Result<Self, CacheError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, CacheError> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, CacheError> {
        self.conn
            .lock()
            .map_err(|_| CacheError::Database("connection lock poisoned".to_string()))
    }

    /// Initialize the database schema
    fn init_schema(&self) -> Result<(), CacheError> {
        let conn = self.conn()?;

        // One row per named cache store
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS cache_stores (
                name TEXT PRIMARY KEY,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
            [],
        )?;

        // Entries keyed by (store, method, url); the snapshot blob is the
        // bincode-encoded response
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS cache_entries (
                cache_name TEXT NOT NULL,
                method TEXT NOT NULL,
                url TEXT NOT NULL,
                status INTEGER NOT NULL,
                body_sha256 TEXT NOT NULL,
                snapshot BLOB NOT NULL,
                stored_at TEXT NOT NULL,
                PRIMARY KEY (cache_name, method, url)
            )
            "#,
            [],
        )?;

        // Active cache version per registration scope, read back on restart
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS registrations (
                scope TEXT PRIMARY KEY,
                cache_version TEXT NOT NULL,
                activated_at TEXT NOT NULL
            )
            "#,
            [],
        )?;

        Ok(())
    }

    fn store_exists(conn: &Connection, cache_name: &str) -> Result<bool, CacheError> {
        let found = conn
            .query_row(
                "SELECT 1 FROM cache_stores WHERE name = ?1",
                params![cache_name],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn insert_entry(
        conn: &Connection,
        cache_name: &str,
        key: &RequestKey,
        response: &ResponseSnapshot,
    ) -> Result<(), CacheError> {
        let blob = encode_snapshot(response)?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO cache_entries
                (cache_name, method, url, status, body_sha256, snapshot, stored_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                cache_name,
                key.method,
                key.url,
                response.status as i64,
                sha256(&response.body),
                blob,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl CacheStorage for SqliteCacheStorage {
    async fn open(&self, cache_name: &str) -> Result<(), CacheError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO cache_stores (name) VALUES (?1)",
            params![cache_name],
        )?;
        Ok(())
    }

    async fn has(&self, cache_name: &str) -> Result<bool, CacheError> {
        let conn = self.conn()?;
        Self::store_exists(&conn, cache_name)
    }

    async fn keys(&self) -> Result<Vec<String>, CacheError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT name FROM cache_stores ORDER BY created_at, name")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    async fn delete(&self, cache_name: &str) -> Result<bool, CacheError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let removed_entries = tx.execute(
            "DELETE FROM cache_entries WHERE cache_name = ?1",
            params![cache_name],
        )?;
        let removed = tx.execute("DELETE FROM cache_stores WHERE name = ?1", params![cache_name])?;
        tx.commit()?;

        debug!("Deleted cache store {} ({} entries)", cache_name, removed_entries);
        Ok(removed > 0)
    }

    async fn put(
        &self,
        cache_name: &str,
        key: &RequestKey,
        response: &ResponseSnapshot,
    ) -> Result<(), CacheError> {
        let conn = self.conn()?;
        if !Self::store_exists(&conn, cache_name)? {
            return Err(CacheError::NotFound(cache_name.to_string()));
        }
        Self::insert_entry(&conn, cache_name, key, response)?;
        debug!("Stored {} in {} ({} bytes)", key, cache_name, response.body.len());
        Ok(())
    }

    async fn put_all(&self, cache_name: &str, entries: &[CacheEntry]) -> Result<(), CacheError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        if !Self::store_exists(&tx, cache_name)? {
            return Err(CacheError::NotFound(cache_name.to_string()));
        }
        for entry in entries {
            Self::insert_entry(&tx, cache_name, &entry.key, &entry.response)?;
        }
        tx.commit()?;

        debug!("Stored batch of {} entries in {}", entries.len(), cache_name);
        Ok(())
    }

    async fn match_key(
        &self,
        cache_name: &str,
        key: &RequestKey,
    ) -> Result<Option<ResponseSnapshot>, CacheError> {
        let conn = self.conn()?;
        let blob: Option<Vec<u8>> = conn
            .query_row(
                "SELECT snapshot FROM cache_entries WHERE cache_name = ?1 AND method = ?2 AND url = ?3",
                params![cache_name, key.method, key.url],
                |row| row.get(0),
            )
            .optional()?;

        match blob {
            Some(blob) => Ok(Some(decode_snapshot(&blob)?)),
            None => Ok(None),
        }
    }

    async fn entries(&self, cache_name: &str) -> Result<Vec<CacheEntry>, CacheError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT method, url, snapshot
            FROM cache_entries
            WHERE cache_name = ?1
            ORDER BY url, method
            "#,
        )?;

        let rows = stmt
            .query_map(params![cache_name], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Vec<u8>>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(method, url, blob)| {
                Ok(CacheEntry {
                    key: RequestKey { method, url },
                    response: decode_snapshot(&blob)?,
                })
            })
            .collect()
    }

    async fn record_active_version(&self, scope: &str, cache_name: &str) -> Result<(), CacheError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO registrations (scope, cache_version, activated_at) VALUES (?1, ?2, ?3)",
            params![scope, cache_name, Utc::now().to_rfc3339()],
        )?;
        debug!("Recorded {} as active for {}", cache_name, scope);
        Ok(())
    }

    async fn active_version(&self, scope: &str) -> Result<Option<String>, CacheError> {
        let conn = self.conn()?;
        let version = conn
            .query_row(
                "SELECT cache_version FROM registrations WHERE scope = ?1",
                params![scope],
                |row| row.get(0),
            )
            .optional()?;
        Ok(version)
    }

    fn storage_type(&self) -> &str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use url::Url;

    fn key(path: &str) -> RequestKey {
        RequestKey::get(&Url::parse("https://hpr.example/").unwrap().join(path).unwrap())
    }

    #[tokio::test]
    async fn test_put_and_match() {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteCacheStorage::new(temp_dir.path().join("cache.db")).unwrap();

        let response = ResponseSnapshot::new(200, "body { color: red }")
            .with_header("content-type", "text/css");
        store.open("v1").await.unwrap();
        store.put("v1", &key("style.css"), &response).await.unwrap();

        assert!(store.has("v1").await.unwrap());
        assert_eq!(
            store.match_key("v1", &key("style.css")).await.unwrap(),
            Some(response)
        );
        assert_eq!(store.match_key("v2", &key("style.css")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_put_overwrites_existing_key() {
        let store = SqliteCacheStorage::in_memory().unwrap();
        store.open("v1").await.unwrap();

        store
            .put("v1", &key("index.html"), &ResponseSnapshot::new(200, "old"))
            .await
            .unwrap();
        store
            .put("v1", &key("index.html"), &ResponseSnapshot::new(200, "new"))
            .await
            .unwrap();

        let entries = store.entries("v1").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].response.body, b"new");
    }

    #[tokio::test]
    async fn test_delete_removes_store_and_entries() {
        let store = SqliteCacheStorage::in_memory().unwrap();
        store.open("old").await.unwrap();
        store
            .put("old", &key("about.html"), &ResponseSnapshot::new(200, "about"))
            .await
            .unwrap();
        store.open("new").await.unwrap();

        assert!(store.delete("old").await.unwrap());
        assert!(!store.delete("old").await.unwrap());
        assert_eq!(store.keys().await.unwrap(), vec!["new".to_string()]);
        assert!(store.entries("old").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("cache.db");
        {
            let store = SqliteCacheStorage::new(&db_path).unwrap();
            store.open("v1").await.unwrap();
            store
                .record_active_version("https://hpr.example/", "v1")
                .await
                .unwrap();
            store
                .put("v1", &key("./"), &ResponseSnapshot::new(200, "home"))
                .await
                .unwrap();
        }

        let reopened = SqliteCacheStorage::new(&db_path).unwrap();
        let hit = reopened.match_key("v1", &key("./")).await.unwrap().unwrap();
        assert_eq!(hit.body, b"home");
        assert_eq!(
            reopened.active_version("https://hpr.example/").await.unwrap(),
            Some("v1".to_string())
        );
        assert_eq!(reopened.active_version("https://other.example/").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_put_into_deleted_store_fails() {
        let store = SqliteCacheStorage::in_memory().unwrap();
        store.open("v1").await.unwrap();
        assert!(store.delete("v1").await.unwrap());

        let result = store
            .put("v1", &key("style.css"), &ResponseSnapshot::new(200, "late"))
            .await;
        assert!(matches!(result, Err(CacheError::NotFound(_))));

        let batch = [CacheEntry {
            key: key("index.html"),
            response: ResponseSnapshot::new(200, "late"),
        }];
        assert!(matches!(store.put_all("v1", &batch).await, Err(CacheError::NotFound(_))));
        assert!(store.keys().await.unwrap().is_empty());
        assert!(store.entries("v1").await.unwrap().is_empty());
    }
}
