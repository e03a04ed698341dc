//! Named key-value stores for cached responses.
//!
//! A `StoreBackend` holds any number of named stores, each mapping a
//! `ResourceKey` to a `CachedEntry`. The `StoreManager` is the handle the rest
//! of the crate uses: it validates names and hands out `Store` views bound to
//! one store name.
//!
//! Backends:
//! - `MemoryStore`: process-local, for tests and embedded hosts
//! - `DiskStore`: one directory per store, one JSON file per entry

pub mod disk;
pub mod memory;

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{CachedEntry, ResourceKey};

pub use disk::DiskStore;
pub use memory::MemoryStore;

/// Storage operations every backend provides.
///
/// Writes are atomic with respect to readers: a reader sees either the
/// previous entry or the new one, never a partial write.
#[async_trait]
pub trait StoreBackend: Send + Sync {
    /// Create the store if absent. Idempotent.
    async fn open(&self, store: &str) -> Result<(), StoreError>;

    /// Insert or replace one entry, creating the store if needed.
    async fn put(&self, store: &str, entry: CachedEntry) -> Result<(), StoreError>;

    /// Insert or replace a batch of entries. On success every entry is
    /// stored; on failure the store keeps its previous entries for every key.
    async fn put_all(&self, store: &str, entries: Vec<CachedEntry>) -> Result<(), StoreError>;

    async fn get(&self, store: &str, key: &ResourceKey) -> Result<Option<CachedEntry>, StoreError>;

    async fn keys(&self, store: &str) -> Result<Vec<ResourceKey>, StoreError>;

    async fn list_store_names(&self) -> Result<BTreeSet<String>, StoreError>;

    /// Remove a store and all its entries. Returns whether it existed.
    async fn delete(&self, store: &str) -> Result<bool, StoreError>;

    /// Remove leftovers of writes interrupted by an earlier process.
    /// Returns how many were removed.
    async fn purge_stale(&self) -> Result<usize, StoreError> {
        Ok(0)
    }
}

/// Store names become directory names on disk, so they are restricted.
pub fn validate_store_name(name: &str) -> Result<(), StoreError> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && !name
            .chars()
            .any(|c| c == '/' || c == '\\' || c == '\0' || c.is_control());
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidName(name.to_string()))
    }
}

/// Shared entry point to a backend.
/// Clone is cheap - the backend sits behind an `Arc`.
#[derive(Clone)]
pub struct StoreManager {
    backend: Arc<dyn StoreBackend>,
}

impl StoreManager {
    pub fn new(backend: Arc<dyn StoreBackend>) -> Self {
        Self { backend }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Open (create-if-absent) a store and return a handle bound to it.
    pub async fn open(&self, name: &str) -> Result<Store, StoreError> {
        validate_store_name(name)?;
        self.backend.open(name).await?;
        Ok(self.handle(name))
    }

    /// A handle to a store without creating it. Writes through the handle
    /// create the store on demand.
    pub fn handle(&self, name: &str) -> Store {
        Store {
            name: name.to_string(),
            backend: Arc::clone(&self.backend),
        }
    }

    pub async fn list_store_names(&self) -> Result<BTreeSet<String>, StoreError> {
        self.backend.list_store_names().await
    }

    pub async fn purge_stale(&self) -> Result<usize, StoreError> {
        self.backend.purge_stale().await
    }

    /// Remove a store. No-op if absent.
    pub async fn delete(&self, name: &str) -> Result<bool, StoreError> {
        validate_store_name(name)?;
        self.backend.delete(name).await
    }
}

impl std::fmt::Debug for StoreManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreManager").finish_non_exhaustive()
    }
}

/// A view of one named store.
#[derive(Clone)]
pub struct Store {
    name: String,
    backend: Arc<dyn StoreBackend>,
}

impl Store {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn put(&self, entry: CachedEntry) -> Result<(), StoreError> {
        self.backend.put(&self.name, entry).await
    }

    pub async fn put_all(&self, entries: Vec<CachedEntry>) -> Result<(), StoreError> {
        self.backend.put_all(&self.name, entries).await
    }

    pub async fn get(&self, key: &ResourceKey) -> Result<Option<CachedEntry>, StoreError> {
        self.backend.get(&self.name, key).await
    }

    pub async fn keys(&self) -> Result<Vec<ResourceKey>, StoreError> {
        self.backend.keys(&self.name).await
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").field("name", &self.name).finish_non_exhaustive()
    }
}
