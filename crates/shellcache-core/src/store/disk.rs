use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::fs;
use tracing::{debug, warn};

use super::StoreBackend;
use crate::error::StoreError;
use crate::models::{CachedEntry, ResourceKey};

/// Extension of committed entry files
const ENTRY_EXTENSION: &str = "json";

/// Prefix of batch staging directories under the root
const STAGING_PREFIX: &str = ".staging-";

/// Suffix of replaced entries parked in the staging directory during a batch
const BACKUP_SUFFIX: &str = ".previous";

/// Suffix of single-entry temporary files
const TEMP_SUFFIX: &str = ".tmp";

static NEXT_NONCE: AtomicU64 = AtomicU64::new(0);

/// Process marker embedded in every temporary name
fn process_marker() -> String {
    format!("p{}n", std::process::id())
}

fn nonce() -> String {
    format!(
        "{}{}",
        process_marker(),
        NEXT_NONCE.fetch_add(1, Ordering::Relaxed)
    )
}

/// Only the key of an entry file; the body is skipped, not decoded.
#[derive(Deserialize)]
struct EntryKey {
    key: ResourceKey,
}

/// A removal of something already gone counts as nothing removed.
fn removed(result: std::io::Result<()>) -> std::io::Result<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Filesystem backend.
///
/// Layout: `<root>/<store>/<sha256 of key>.json`. Every write lands in a
/// hidden temporary file first and is renamed into place, so a reader never
/// sees a half-written entry. Hidden names (leading `.`) are never stores or
/// entries.
#[derive(Debug, Clone)]
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn store_dir(&self, store: &str) -> PathBuf {
        self.root.join(store)
    }

    fn entry_file_name(key: &ResourceKey) -> String {
        format!("{}.{}", key.digest(), ENTRY_EXTENSION)
    }

    fn encode(store: &str, entry: &CachedEntry) -> Result<Vec<u8>, StoreError> {
        serde_json::to_vec(entry).map_err(|source| StoreError::Corrupt {
            store: store.to_string(),
            source,
        })
    }

    async fn read_entry(store: &str, path: &Path) -> Result<Option<CachedEntry>, StoreError> {
        let contents = match fs::read(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(store, e)),
        };
        serde_json::from_slice(&contents)
            .map(Some)
            .map_err(|source| StoreError::Corrupt {
                store: store.to_string(),
                source,
            })
    }

    /// Write to a temporary sibling, then rename over the final name.
    async fn write_atomic(store: &str, dir: &Path, entry: &CachedEntry) -> Result<(), StoreError> {
        let bytes = Self::encode(store, entry)?;
        let file_name = Self::entry_file_name(&entry.key);
        let tmp = dir.join(format!(".{}.{}{}", file_name, nonce(), TEMP_SUFFIX));

        if let Err(e) = fs::write(&tmp, &bytes).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(StoreError::io(store, e));
        }
        if let Err(e) = fs::rename(&tmp, dir.join(&file_name)).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(StoreError::io(store, e));
        }
        Ok(())
    }

    async fn ensure_store_dir(&self, store: &str) -> Result<PathBuf, StoreError> {
        let dir = self.store_dir(store);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| StoreError::io(store, e))?;
        Ok(dir)
    }

    /// Move staged files into the store. An entry being replaced is first
    /// parked in the staging directory; if a later move fails, every moved
    /// entry is taken out again and the parked ones are put back.
    async fn commit_staged(
        store: &str,
        staging: &Path,
        target: &Path,
        file_names: &[String],
    ) -> Result<(), StoreError> {
        let mut moved: Vec<(&str, bool)> = Vec::with_capacity(file_names.len());
        for name in file_names {
            let current = target.join(name);
            let backup = staging.join(format!("{}{}", name, BACKUP_SUFFIX));

            let parked = match Self::park_existing(&current, &backup).await {
                Ok(parked) => parked,
                Err(e) => {
                    Self::roll_back(store, staging, target, &moved).await;
                    return Err(StoreError::io(store, e));
                }
            };
            if let Err(e) = fs::rename(staging.join(name), &current).await {
                if parked {
                    if let Err(restore) = fs::rename(&backup, &current).await {
                        warn!(store, entry = %name, error = %restore, "Failed to restore entry");
                    }
                }
                Self::roll_back(store, staging, target, &moved).await;
                return Err(StoreError::io(store, e));
            }
            moved.push((name.as_str(), parked));
        }
        Ok(())
    }

    /// Move an existing entry file out of the way. Anything that is not a
    /// regular file is left alone.
    async fn park_existing(current: &Path, backup: &Path) -> std::io::Result<bool> {
        match fs::symlink_metadata(current).await {
            Ok(meta) if meta.is_file() => fs::rename(current, backup).await.map(|_| true),
            Ok(_) => Ok(false),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn roll_back(store: &str, staging: &Path, target: &Path, moved: &[(&str, bool)]) {
        for (name, parked) in moved.iter().rev() {
            let current = target.join(name);
            let restored = if *parked {
                fs::rename(staging.join(format!("{}{}", name, BACKUP_SUFFIX)), &current).await
            } else {
                fs::remove_file(&current).await
            };
            if let Err(e) = restored {
                warn!(store, entry = %name, error = %e, "Failed to roll back entry");
            }
        }
    }

    /// Remove temporary entry files of other processes from one store.
    async fn purge_temp_files(store: &str, dir: &Path, own: &str) -> Result<usize, StoreError> {
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(StoreError::io(store, e)),
        };

        let mut purged = 0;
        while let Some(item) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::io(store, e))?
        {
            let name = item.file_name().to_string_lossy().into_owned();
            if !name.starts_with('.') || !name.ends_with(TEMP_SUFFIX) || name.contains(own) {
                continue;
            }
            if removed(fs::remove_file(item.path()).await)
                .map_err(|e| StoreError::io(store, e))?
            {
                purged += 1;
            }
        }
        Ok(purged)
    }
}

#[async_trait]
impl StoreBackend for DiskStore {
    async fn open(&self, store: &str) -> Result<(), StoreError> {
        self.ensure_store_dir(store).await.map(|_| ())
    }

    async fn put(&self, store: &str, entry: CachedEntry) -> Result<(), StoreError> {
        let dir = self.ensure_store_dir(store).await?;
        Self::write_atomic(store, &dir, &entry).await?;
        debug!(store, key = %entry.key, "Wrote entry to disk");
        Ok(())
    }

    async fn put_all(&self, store: &str, entries: Vec<CachedEntry>) -> Result<(), StoreError> {
        let target = self.ensure_store_dir(store).await?;
        if entries.is_empty() {
            return Ok(());
        }

        let staging = self.root.join(format!("{}{}-{}", STAGING_PREFIX, store, nonce()));
        fs::create_dir_all(&staging)
            .await
            .map_err(|e| StoreError::io(store, e))?;

        let mut file_names = Vec::with_capacity(entries.len());
        let mut staged = Ok(());
        for entry in &entries {
            let file_name = Self::entry_file_name(&entry.key);
            let written = match Self::encode(store, entry) {
                Ok(bytes) => fs::write(staging.join(&file_name), bytes)
                    .await
                    .map_err(|e| StoreError::io(store, e)),
                Err(e) => Err(e),
            };
            if let Err(e) = written {
                staged = Err(e);
                break;
            }
            file_names.push(file_name);
        }

        let result = match staged {
            Ok(()) => Self::commit_staged(store, &staging, &target, &file_names).await,
            Err(e) => Err(e),
        };

        if let Err(e) = fs::remove_dir_all(&staging).await {
            warn!(store, error = %e, "Failed to remove staging directory");
        }
        if result.is_ok() {
            debug!(store, count = file_names.len(), "Committed batch to disk");
        }
        result
    }

    async fn get(&self, store: &str, key: &ResourceKey) -> Result<Option<CachedEntry>, StoreError> {
        let path = self.store_dir(store).join(Self::entry_file_name(key));
        Self::read_entry(store, &path).await
    }

    async fn keys(&self, store: &str) -> Result<Vec<ResourceKey>, StoreError> {
        let mut dir = match fs::read_dir(self.store_dir(store)).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(store, e)),
        };

        let mut keys = Vec::new();
        while let Some(item) = dir.next_entry().await.map_err(|e| StoreError::io(store, e))? {
            let path = item.path();
            let is_entry = path.extension().and_then(|e| e.to_str()) == Some(ENTRY_EXTENSION)
                && !item.file_name().to_string_lossy().starts_with('.');
            if !is_entry {
                continue;
            }
            let contents = match fs::read(&path).await {
                Ok(contents) => contents,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(StoreError::io(store, e)),
            };
            let entry: EntryKey =
                serde_json::from_slice(&contents).map_err(|source| StoreError::Corrupt {
                    store: store.to_string(),
                    source,
                })?;
            keys.push(entry.key);
        }
        keys.sort();
        Ok(keys)
    }

    async fn list_store_names(&self) -> Result<BTreeSet<String>, StoreError> {
        let root_name = self.root.display().to_string();
        let mut dir = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeSet::new()),
            Err(e) => return Err(StoreError::io(&root_name, e)),
        };

        let mut names = BTreeSet::new();
        while let Some(item) = dir
            .next_entry()
            .await
            .map_err(|e| StoreError::io(&root_name, e))?
        {
            let file_type = item
                .file_type()
                .await
                .map_err(|e| StoreError::io(&root_name, e))?;
            if !file_type.is_dir() {
                continue;
            }
            match item.file_name().into_string() {
                Ok(name) if !name.starts_with('.') => {
                    names.insert(name);
                }
                _ => {}
            }
        }
        Ok(names)
    }

    async fn delete(&self, store: &str) -> Result<bool, StoreError> {
        match fs::remove_dir_all(self.store_dir(store)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::io(store, e)),
        }
    }

    /// Staging directories and temporary files left by a crashed process.
    /// Names carrying this process's marker belong to writes still running.
    async fn purge_stale(&self) -> Result<usize, StoreError> {
        let root_name = self.root.display().to_string();
        let mut dir = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(StoreError::io(&root_name, e)),
        };

        let own = process_marker();
        let mut purged = 0;
        while let Some(item) = dir
            .next_entry()
            .await
            .map_err(|e| StoreError::io(&root_name, e))?
        {
            let file_type = item
                .file_type()
                .await
                .map_err(|e| StoreError::io(&root_name, e))?;
            if !file_type.is_dir() {
                continue;
            }
            let name = item.file_name().to_string_lossy().into_owned();
            if name.starts_with(STAGING_PREFIX) {
                if name.contains(&own) {
                    continue;
                }
                if removed(fs::remove_dir_all(item.path()).await)
                    .map_err(|e| StoreError::io(&root_name, e))?
                {
                    debug!(dir = %name, "Removed stale staging directory");
                    purged += 1;
                }
            } else if !name.starts_with('.') {
                purged += Self::purge_temp_files(&name, &item.path(), &own).await?;
            }
        }
        Ok(purged)
    }
}
