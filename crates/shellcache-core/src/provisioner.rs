//! Version provisioning and commit.
//!
//! `provision` populates the current core store with the whole shell manifest
//! in one all-or-nothing step. `commit` garbage-collects every store that does
//! not belong to the current version.

use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::CoordinatorConfig;
use crate::error::{CacheError, StoreError};
use crate::manifest::ShellManifest;
use crate::models::{CachedEntry, ResourceKey, Response};
use crate::network::Fetcher;
use crate::store::StoreManager;

/// How a freshly provisioned version wants to take over from a running one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    /// Skip graceful handover and become active right away
    Immediate,
    /// Wait until instances of the previous version have finished
    AwaitHandover,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProvisionReport {
    pub version: String,
    pub core_store: String,
    pub stored: usize,
    pub activation: Activation,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommitReport {
    pub retained: Vec<String>,
    pub deleted: Vec<String>,
    /// Stale stores that could not be removed; retried on the next commit
    pub failed: Vec<String>,
    /// Take control of already-open application instances now
    pub claim_clients: bool,
}

#[derive(Clone)]
pub struct Provisioner {
    config: Arc<CoordinatorConfig>,
    manifest: Arc<ShellManifest>,
    stores: StoreManager,
    fetcher: Arc<dyn Fetcher>,
}

impl Provisioner {
    pub fn new(
        config: Arc<CoordinatorConfig>,
        manifest: Arc<ShellManifest>,
        stores: StoreManager,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        Self {
            config,
            manifest,
            stores,
            fetcher,
        }
    }

    pub fn activation(&self) -> Activation {
        if self.config.immediate_activation {
            Activation::Immediate
        } else {
            Activation::AwaitHandover
        }
    }

    /// Fetch every manifest resource and store them together.
    ///
    /// Any transport failure, non-2xx status or store failure fails the whole
    /// step with `ProvisionFailure` and nothing is written.
    pub async fn provision(&self) -> Result<ProvisionReport, CacheError> {
        let core_name = self.config.core_store_name();
        let core = match self.stores.open(&core_name).await {
            Ok(core) => core,
            Err(e) => return Err(self.store_rejected(&core_name, e)),
        };
        info!(
            store = %core_name,
            resources = self.manifest.len(),
            "Provisioning shell resources"
        );

        let keys = self.manifest.keys();
        let results = join_all(keys.iter().map(|key| self.fetch_shell_resource(key))).await;

        let mut entries = Vec::with_capacity(keys.len());
        let mut failed = Vec::new();
        for (key, result) in keys.iter().zip(results) {
            match result {
                Ok(response) if response.is_success() => {
                    entries.push(CachedEntry::new(key.clone(), response));
                }
                Ok(response) => {
                    warn!(key = %key, status = response.status, "Shell resource returned an error status");
                    failed.push(format!("{} (status {})", key, response.status));
                }
                Err(reason) => {
                    warn!(key = %key, error = %reason, "Shell resource unreachable");
                    failed.push(key.to_string());
                }
            }
        }

        if !failed.is_empty() {
            return Err(CacheError::ProvisionFailure {
                failed,
                cause: None,
            });
        }

        let stored = entries.len();
        if let Err(e) = core.put_all(entries).await {
            return Err(self.store_rejected(&core_name, e));
        }
        info!(store = %core_name, stored, "Shell provisioned");

        Ok(ProvisionReport {
            version: self.config.version.clone(),
            core_store: core_name,
            stored,
            activation: self.activation(),
        })
    }

    /// Every manifest key counts as failed when the core store cannot take them.
    fn store_rejected(&self, core_name: &str, e: StoreError) -> CacheError {
        warn!(store = %core_name, error = %e, "Core store rejected the shell");
        CacheError::ProvisionFailure {
            failed: self.manifest.keys().iter().map(|k| k.to_string()).collect(),
            cause: Some(e),
        }
    }

    async fn fetch_shell_resource(&self, key: &ResourceKey) -> Result<Response, String> {
        let request = key.to_request().map_err(|e| e.to_string())?;
        self.fetcher.fetch(&request).await.map_err(|e| e.to_string())
    }

    /// Keep only the current core and dynamic stores; delete all others.
    pub async fn commit(&self) -> Result<CommitReport, CacheError> {
        let core_name = self.config.core_store_name();
        let dynamic_name = self.config.dynamic_store_name();
        self.stores.open(&core_name).await?;
        self.stores.open(&dynamic_name).await?;

        let stale: Vec<String> = self
            .stores
            .list_store_names()
            .await?
            .into_iter()
            .filter(|name| *name != core_name && *name != dynamic_name)
            .collect();

        let results = join_all(stale.iter().map(|name| self.stores.delete(name))).await;

        let mut deleted = Vec::new();
        let mut failed = Vec::new();
        for (name, result) in stale.into_iter().zip(results) {
            match result {
                Ok(_) => {
                    info!(store = %name, "Deleted stale store");
                    deleted.push(name);
                }
                Err(e) => {
                    warn!(store = %name, error = %e, "Failed to delete stale store");
                    failed.push(name);
                }
            }
        }
        match self.stores.purge_stale().await {
            Ok(0) => {}
            Ok(purged) => info!(purged, "Removed leftovers of interrupted writes"),
            Err(e) => warn!(error = %e, "Failed to remove leftovers of interrupted writes"),
        }
        debug!(deleted = deleted.len(), failed = failed.len(), "Commit finished");

        Ok(CommitReport {
            retained: vec![core_name, dynamic_name],
            deleted,
            failed,
            claim_clients: self.config.immediate_activation,
        })
    }

    /// Whether the current core store holds every manifest resource.
    pub async fn is_shell_complete(&self) -> Result<bool, CacheError> {
        let core = self.stores.handle(&self.config.core_store_name());
        for key in self.manifest.keys() {
            if core.get(key).await?.is_none() {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
