use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::StoreBackend;
use crate::error::StoreError;
use crate::models::{CachedEntry, ResourceKey};

type Entries = HashMap<ResourceKey, CachedEntry>;

/// In-process backend. Every operation holds the lock for its whole duration,
/// so batch writes are visible all at once.
#[derive(Debug, Default)]
pub struct MemoryStore {
    stores: RwLock<HashMap<String, Entries>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StoreBackend for MemoryStore {
    async fn open(&self, store: &str) -> Result<(), StoreError> {
        self.stores
            .write()
            .await
            .entry(store.to_string())
            .or_default();
        Ok(())
    }

    async fn put(&self, store: &str, entry: CachedEntry) -> Result<(), StoreError> {
        let mut stores = self.stores.write().await;
        stores
            .entry(store.to_string())
            .or_default()
            .insert(entry.key.clone(), entry);
        Ok(())
    }

    async fn put_all(&self, store: &str, entries: Vec<CachedEntry>) -> Result<(), StoreError> {
        let count = entries.len();
        let mut stores = self.stores.write().await;
        let target = stores.entry(store.to_string()).or_default();
        for entry in entries {
            target.insert(entry.key.clone(), entry);
        }
        debug!(store, count, "Stored batch in memory");
        Ok(())
    }

    async fn get(&self, store: &str, key: &ResourceKey) -> Result<Option<CachedEntry>, StoreError> {
        let stores = self.stores.read().await;
        Ok(stores.get(store).and_then(|entries| entries.get(key)).cloned())
    }

    async fn keys(&self, store: &str) -> Result<Vec<ResourceKey>, StoreError> {
        let stores = self.stores.read().await;
        let mut keys: Vec<ResourceKey> = stores
            .get(store)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        Ok(keys)
    }

    async fn list_store_names(&self) -> Result<BTreeSet<String>, StoreError> {
        Ok(self.stores.read().await.keys().cloned().collect())
    }

    async fn delete(&self, store: &str) -> Result<bool, StoreError> {
        Ok(self.stores.write().await.remove(store).is_some())
    }
}
