//! In-memory implementation of the CacheStorage trait
//!
//! Used for ephemeral runs and tests. Nothing survives a restart.

use crate::cache_store::{CacheError, CacheStorage};
use pwa_offline_proto::{CacheEntry, RequestKey, ResponseSnapshot};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

type Stores = BTreeMap<String, BTreeMap<RequestKey, ResponseSnapshot>>;

#[derive(Default)]
pub struct MemoryCacheStorage {
    stores: Mutex<Stores>,
    active: Mutex<HashMap<String, String>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn stores(&self) -> MutexGuard<'_, Stores> {
        self.stores.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait::async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn open(&self, cache_name: &str) -> Result<(), CacheError> {
        self.stores().entry(cache_name.to_string()).or_default();
        Ok(())
    }

    async fn has(&self, cache_name: &str) -> Result<bool, CacheError> {
        Ok(self.stores().contains_key(cache_name))
    }

    async fn keys(&self) -> Result<Vec<String>, CacheError> {
        Ok(self.stores().keys().cloned().collect())
    }

    async fn delete(&self, cache_name: &str) -> Result<bool, CacheError> {
        Ok(self.stores().remove(cache_name).is_some())
    }

    async fn put(
        &self,
        cache_name: &str,
        key: &RequestKey,
        response: &ResponseSnapshot,
    ) -> Result<(), CacheError> {
        self.stores()
            .get_mut(cache_name)
            .ok_or_else(|| CacheError::NotFound(cache_name.to_string()))?
            .insert(key.clone(), response.clone());
        Ok(())
    }

    async fn put_all(&self, cache_name: &str, entries: &[CacheEntry]) -> Result<(), CacheError> {
        let mut stores = self.stores();
        let store = stores
            .get_mut(cache_name)
            .ok_or_else(|| CacheError::NotFound(cache_name.to_string()))?;
        for entry in entries {
            store.insert(entry.key.clone(), entry.response.clone());
        }
        Ok(())
    }

    async fn match_key(
        &self,
        cache_name: &str,
        key: &RequestKey,
    ) -> Result<Option<ResponseSnapshot>, CacheError> {
        Ok(self
            .stores()
            .get(cache_name)
            .and_then(|store| store.get(key))
            .cloned())
    }

    async fn entries(&self, cache_name: &str) -> Result<Vec<CacheEntry>, CacheError> {
        Ok(self
            .stores()
            .get(cache_name)
            .map(|store| {
                store
                    .iter()
                    .map(|(key, response)| CacheEntry {
                        key: key.clone(),
                        response: response.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn record_active_version(&self, scope: &str, cache_name: &str) -> Result<(), CacheError> {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(scope.to_string(), cache_name.to_string());
        Ok(())
    }

    async fn active_version(&self, scope: &str) -> Result<Option<String>, CacheError> {
        Ok(self
            .active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(scope)
            .cloned())
    }

    fn storage_type(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    #[tokio::test]
    async fn test_stores_are_isolated() {
        let storage = MemoryCacheStorage::new();
        let key = RequestKey::get(&Url::parse("https://hpr.example/script.js").unwrap());

        storage.open("v1").await.unwrap();
        storage
            .put("v1", &key, &ResponseSnapshot::new(200, "console.log(1)"))
            .await
            .unwrap();
        storage.open("v2").await.unwrap();

        assert!(storage.match_key("v1", &key).await.unwrap().is_some());
        assert!(storage.match_key("v2", &key).await.unwrap().is_none());
        assert_eq!(storage.keys().await.unwrap(), vec!["v1", "v2"]);
    }

    #[tokio::test]
    async fn test_put_into_deleted_store_fails() {
        let storage = MemoryCacheStorage::new();
        let key = RequestKey::get(&Url::parse("https://hpr.example/style.css").unwrap());
        storage.open("v1").await.unwrap();
        storage.delete("v1").await.unwrap();

        let result = storage.put("v1", &key, &ResponseSnapshot::new(200, "late")).await;
        assert!(matches!(result, Err(CacheError::NotFound(ref name)) if name == "v1"));
        let entry = CacheEntry {
            key,
            response: ResponseSnapshot::new(200, "late"),
        };
        assert!(storage.put_all("v1", &[entry]).await.is_err());
        assert!(storage.keys().await.unwrap().is_empty());
    }
}
