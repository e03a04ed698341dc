//! The host-facing coordinator.
//!
//! A host adapter drives the coordinator through `LifecycleHooks`: once per
//! deployed version it calls `on_provision` then `on_commit`, and afterwards
//! `on_request` for every intercepted request.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::CoordinatorConfig;
use crate::error::CacheError;
use crate::manifest::ShellManifest;
use crate::models::Request;
use crate::network::Fetcher;
use crate::provisioner::{CommitReport, ProvisionReport, Provisioner};
use crate::router::{Routed, Router};
use crate::store::StoreManager;

/// Entry points a host runtime invokes.
#[async_trait]
pub trait LifecycleHooks: Send + Sync {
    /// Populate the shell for the current version. An error means the host
    /// should retry or refuse to activate this version.
    async fn on_provision(&self) -> Result<ProvisionReport, CacheError>;

    /// Garbage-collect stores from other versions.
    async fn on_commit(&self) -> Result<CommitReport, CacheError>;

    /// Handle one intercepted request.
    async fn on_request(&self, request: Request) -> Result<Routed, CacheError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePhase {
    /// Nothing has run yet in this process
    Installing,
    Provisioned,
    /// Provisioning failed; commit may still prune but the version is not ready
    ProvisionFailed,
    /// Provisioned and committed
    Active,
}

/// Result of running provision and commit back to back.
#[derive(Debug)]
pub struct InstallReport {
    pub provision: Result<ProvisionReport, CacheError>,
    pub commit: Result<CommitReport, CacheError>,
}

impl InstallReport {
    pub fn succeeded(&self) -> bool {
        self.provision.is_ok() && self.commit.is_ok()
    }
}

/// Offline-first resource cache coordinator.
/// Clone is cheap - every clone shares the same stores and lifecycle state.
#[derive(Clone)]
pub struct Coordinator {
    config: Arc<CoordinatorConfig>,
    manifest: Arc<ShellManifest>,
    stores: StoreManager,
    provisioner: Provisioner,
    router: Router,
    phase: Arc<RwLock<LifecyclePhase>>,
}

impl Coordinator {
    pub fn new(
        config: CoordinatorConfig,
        stores: StoreManager,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self, CacheError> {
        config.validate()?;
        let manifest = Arc::new(ShellManifest::from_config(&config)?);
        let router = Router::new(&config, Arc::clone(&manifest), &stores, Arc::clone(&fetcher))?;
        let config = Arc::new(config);
        let provisioner = Provisioner::new(
            Arc::clone(&config),
            Arc::clone(&manifest),
            stores.clone(),
            fetcher,
        );

        Ok(Self {
            config,
            manifest,
            stores,
            provisioner,
            router,
            phase: Arc::new(RwLock::new(LifecyclePhase::Installing)),
        })
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn manifest(&self) -> &ShellManifest {
        &self.manifest
    }

    pub fn stores(&self) -> &StoreManager {
        &self.stores
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub async fn phase(&self) -> LifecyclePhase {
        *self.phase.read().await
    }

    /// Ready once the current version has been provisioned and committed.
    pub async fn is_ready(&self) -> bool {
        self.phase().await == LifecyclePhase::Active
    }

    /// Provision, then commit even if provisioning failed so that stores of
    /// older versions are never orphaned.
    pub async fn install(&self) -> InstallReport {
        let provision = self.on_provision().await;
        let commit = self.on_commit().await;
        InstallReport { provision, commit }
    }
}

#[async_trait]
impl LifecycleHooks for Coordinator {
    async fn on_provision(&self) -> Result<ProvisionReport, CacheError> {
        let result = self.provisioner.provision().await;
        let mut phase = self.phase.write().await;
        match result {
            Ok(ref report) => {
                info!(version = %report.version, activation = ?report.activation, "Version provisioned");
                *phase = LifecyclePhase::Provisioned;
            }
            Err(ref e) => {
                warn!(version = %self.config.version, error = %e, "Provisioning failed");
                *phase = LifecyclePhase::ProvisionFailed;
            }
        }
        result
    }

    async fn on_commit(&self) -> Result<CommitReport, CacheError> {
        let report = self.provisioner.commit().await?;

        let current = self.phase().await;
        let ready = match current {
            LifecyclePhase::Provisioned | LifecyclePhase::Active => true,
            // Shell provisioned by an earlier process for this same version
            LifecyclePhase::Installing => self.provisioner.is_shell_complete().await.unwrap_or(false),
            LifecyclePhase::ProvisionFailed => false,
        };

        if ready {
            *self.phase.write().await = LifecyclePhase::Active;
            info!(
                version = %self.config.version,
                claim_clients = report.claim_clients,
                "Version active"
            );
        } else {
            warn!(version = %self.config.version, "Committed without a complete shell; not ready");
        }
        Ok(report)
    }

    async fn on_request(&self, request: Request) -> Result<Routed, CacheError> {
        self.router.route(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Method, Response};
    use crate::network::StaticFetcher;

    const ORIGIN: &str = "https://attend.example";

    fn coordinator(version: &str, stores: StoreManager, fetcher: Arc<StaticFetcher>) -> Coordinator {
        let config = CoordinatorConfig::new(version, ORIGIN).with_manifest(["/", "/index.html"]);
        Coordinator::new(config, stores, fetcher).unwrap()
    }

    fn serve_shell(fetcher: &StaticFetcher) {
        fetcher.respond(&format!("{}/", ORIGIN), Response::ok("root"));
        fetcher.respond(&format!("{}/index.html", ORIGIN), Response::ok("index"));
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = CoordinatorConfig::new("", ORIGIN);
        let result = Coordinator::new(config, StoreManager::in_memory(), Arc::new(StaticFetcher::new()));
        assert!(matches!(result, Err(CacheError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_provision_then_commit_is_ready() {
        let fetcher = Arc::new(StaticFetcher::new());
        serve_shell(&fetcher);
        let c = coordinator("v1", StoreManager::in_memory(), fetcher);

        assert_eq!(c.phase().await, LifecyclePhase::Installing);
        c.on_provision().await.unwrap();
        assert_eq!(c.phase().await, LifecyclePhase::Provisioned);
        assert!(!c.is_ready().await);
        c.on_commit().await.unwrap();
        assert!(c.is_ready().await);
    }

    #[tokio::test]
    async fn test_failed_provision_still_prunes_but_is_not_ready() {
        let stores = StoreManager::in_memory();
        stores.open("core-v0").await.unwrap();
        let fetcher = Arc::new(StaticFetcher::new());
        let c = coordinator("v1", stores.clone(), fetcher);

        let report = c.install().await;

        assert!(!report.succeeded());
        assert!(matches!(report.provision, Err(CacheError::ProvisionFailure { .. })));
        assert_eq!(report.commit.unwrap().deleted, vec!["core-v0".to_string()]);
        assert_eq!(c.phase().await, LifecyclePhase::ProvisionFailed);
        assert!(!c.is_ready().await);
    }

    #[tokio::test]
    async fn test_commit_alone_is_ready_when_shell_already_stored() {
        let stores = StoreManager::in_memory();
        let fetcher = Arc::new(StaticFetcher::new());
        serve_shell(&fetcher);
        coordinator("v1", stores.clone(), fetcher.clone()).on_provision().await.unwrap();

        // A new process for the same version
        let restarted = coordinator("v1", stores, fetcher);
        restarted.on_commit().await.unwrap();
        assert!(restarted.is_ready().await);
    }

    #[tokio::test]
    async fn test_on_request_routes() {
        let fetcher = Arc::new(StaticFetcher::new());
        serve_shell(&fetcher);
        let c = coordinator("v1", StoreManager::in_memory(), fetcher);
        c.install().await;

        let req = Request::parse(Method::Get, &format!("{}/index.html", ORIGIN)).unwrap();
        let served = c.on_request(req).await.unwrap().into_served().unwrap();
        assert_eq!(served.response.body.as_ref(), b"index");

        let post = Request::parse(Method::Post, &format!("{}/index.html", ORIGIN)).unwrap();
        assert!(c.on_request(post).await.unwrap().is_pass_through());
    }
}
