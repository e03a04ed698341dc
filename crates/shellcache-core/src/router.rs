//! Per-request retrieval policies.
//!
//! Shell-class requests use stale-while-revalidate against the core store;
//! everything else is cache-first against the dynamic store. Network work
//! always runs in a detached task so that abandoning a response never
//! cancels a fetch or a store write.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::CoordinatorConfig;
use crate::error::{CacheError, FetchError};
use crate::manifest::ShellManifest;
use crate::models::{CachedEntry, Request, ResourceKey, Response};
use crate::network::Fetcher;
use crate::store::{Store, StoreManager};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestClass {
    /// Application shell: stale-while-revalidate from the core store
    Shell,
    /// Anything else: cache-first from the dynamic store
    Dynamic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSource {
    Cache,
    Network,
    Fallback,
}

impl std::fmt::Display for ResponseSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseSource::Cache => write!(f, "cache"),
            ResponseSource::Network => write!(f, "network"),
            ResponseSource::Fallback => write!(f, "offline fallback"),
        }
    }
}

/// Result of a background fetch-and-store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevalidationOutcome {
    /// Fresh response written to the store
    Updated,
    /// Network answered with a non-2xx status; store left untouched
    NotStored { status: u16 },
    FetchFailed,
    StoreFailed,
    /// The background task panicked or was aborted
    Aborted,
}

/// Handle to a detached revalidation task.
/// Dropping it detaches the task; it keeps running to completion.
#[derive(Debug)]
pub struct Revalidation {
    handle: JoinHandle<RevalidationOutcome>,
}

impl Revalidation {
    /// Wait for the background fetch-and-store to finish.
    pub async fn settled(self) -> RevalidationOutcome {
        self.handle.await.unwrap_or(RevalidationOutcome::Aborted)
    }
}

/// A response produced by the router.
#[derive(Debug)]
pub struct Served {
    pub response: Response,
    pub source: ResponseSource,
    pub class: RequestClass,
    revalidation: Option<Revalidation>,
}

impl Served {
    /// Take the background revalidation handle, if one was started.
    pub fn take_revalidation(&mut self) -> Option<Revalidation> {
        self.revalidation.take()
    }
}

/// Outcome of intercepting one request.
#[derive(Debug)]
pub enum Routed {
    /// Not intercepted: the host performs the request itself
    PassThrough,
    Served(Served),
}

impl Routed {
    pub fn is_pass_through(&self) -> bool {
        matches!(self, Routed::PassThrough)
    }

    pub fn into_served(self) -> Option<Served> {
        match self {
            Routed::Served(served) => Some(served),
            Routed::PassThrough => None,
        }
    }
}

/// Request router.
/// Clone is cheap - stores, manifest and fetcher are shared.
#[derive(Clone)]
pub struct Router {
    manifest: Arc<ShellManifest>,
    core: Store,
    dynamic: Store,
    fetcher: Arc<dyn Fetcher>,
    offline_fallback: Option<ResourceKey>,
}

impl Router {
    pub fn new(
        config: &CoordinatorConfig,
        manifest: Arc<ShellManifest>,
        stores: &StoreManager,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self, CacheError> {
        let offline_fallback = match config.offline_fallback {
            Some(ref fallback) => Some(ResourceKey::from_url(&config.resolve(fallback)?)),
            None => None,
        };
        Ok(Self {
            manifest,
            core: stores.handle(&config.core_store_name()),
            dynamic: stores.handle(&config.dynamic_store_name()),
            fetcher,
            offline_fallback,
        })
    }

    /// Retrieval class of a request, or `None` if it is not intercepted.
    pub fn classify(&self, request: &Request) -> Option<RequestClass> {
        let key = request.resource_key()?;
        if self.manifest.is_shell_request(request, &key) {
            Some(RequestClass::Shell)
        } else {
            Some(RequestClass::Dynamic)
        }
    }

    pub async fn route(&self, request: Request) -> Result<Routed, CacheError> {
        let Some(key) = request.resource_key() else {
            debug!(method = %request.method, url = %request.url, "Passing through non-GET request");
            return Ok(Routed::PassThrough);
        };

        let served = if self.manifest.is_shell_request(&request, &key) {
            self.stale_while_revalidate(request, key).await?
        } else {
            self.cache_first(request, key).await?
        };
        Ok(Routed::Served(served))
    }

    /// Serve the cached shell entry at once and refresh it in the background.
    /// Without a cached entry the caller gets the network result.
    async fn stale_while_revalidate(
        &self,
        request: Request,
        key: ResourceKey,
    ) -> Result<Served, CacheError> {
        let cached = lookup(&self.core, &key).await;

        let (tx, rx) = oneshot::channel();
        let handle = tokio::spawn(revalidate(
            Arc::clone(&self.fetcher),
            self.core.clone(),
            request,
            key.clone(),
            tx,
        ));
        let revalidation = Some(Revalidation { handle });

        if let Some(entry) = cached {
            debug!(key = %key, age_minutes = entry.age_minutes(), "Serving shell from cache, revalidating");
            return Ok(Served {
                response: entry.response,
                source: ResponseSource::Cache,
                class: RequestClass::Shell,
                revalidation,
            });
        }

        let fetched = rx
            .await
            .unwrap_or_else(|_| Err(FetchError::Unreachable("revalidation task ended early".to_string())));
        match fetched {
            Ok(response) => Ok(Served {
                response,
                source: ResponseSource::Network,
                class: RequestClass::Shell,
                revalidation,
            }),
            Err(e) => self.recover(&key, RequestClass::Shell, e).await,
        }
    }

    /// Serve from the dynamic store if present; otherwise fetch, store, serve.
    /// Cached dynamic entries are never refreshed.
    async fn cache_first(&self, request: Request, key: ResourceKey) -> Result<Served, CacheError> {
        if let Some(entry) = lookup(&self.dynamic, &key).await {
            debug!(key = %key, "Serving dynamic resource from cache");
            return Ok(Served {
                response: entry.response,
                source: ResponseSource::Cache,
                class: RequestClass::Dynamic,
                revalidation: None,
            });
        }

        let task = tokio::spawn(fetch_and_store(
            Arc::clone(&self.fetcher),
            self.dynamic.clone(),
            request,
            key.clone(),
        ));
        let fetched = task
            .await
            .unwrap_or_else(|e| Err(FetchError::Unreachable(format!("fetch task failed: {}", e))));

        match fetched {
            Ok(response) => Ok(Served {
                response,
                source: ResponseSource::Network,
                class: RequestClass::Dynamic,
                revalidation: None,
            }),
            Err(e) => self.recover(&key, RequestClass::Dynamic, e).await,
        }
    }

    /// Fall back to the offline resource if one is configured and cached.
    async fn recover(
        &self,
        key: &ResourceKey,
        class: RequestClass,
        error: FetchError,
    ) -> Result<Served, CacheError> {
        if let Some(ref fallback) = self.offline_fallback {
            for store in [&self.core, &self.dynamic] {
                if let Some(entry) = lookup(store, fallback).await {
                    info!(key = %key, fallback = %fallback, error = %error, "Serving offline fallback");
                    return Ok(Served {
                        response: entry.response,
                        source: ResponseSource::Fallback,
                        class,
                        revalidation: None,
                    });
                }
            }
            warn!(fallback = %fallback, "Offline fallback is not cached");
        }
        Err(CacheError::FetchFailure {
            key: key.to_string(),
            source: error,
        })
    }
}

/// Store reads degrade to a miss on failure.
async fn lookup(store: &Store, key: &ResourceKey) -> Option<CachedEntry> {
    match store.get(key).await {
        Ok(entry) => entry,
        Err(e) => {
            warn!(store = %store.name(), key = %key, error = %e, "Store read failed, treating as miss");
            None
        }
    }
}

async fn store_response(store: &Store, key: ResourceKey, response: Response) -> RevalidationOutcome {
    if !response.is_success() {
        debug!(key = %key, status = response.status, "Not caching error response");
        return RevalidationOutcome::NotStored {
            status: response.status,
        };
    }
    match store.put(CachedEntry::new(key.clone(), response)).await {
        Ok(()) => RevalidationOutcome::Updated,
        Err(e) => {
            warn!(store = %store.name(), key = %key, error = %e, "Store write failed");
            RevalidationOutcome::StoreFailed
        }
    }
}

/// Background half of stale-while-revalidate. The response goes to the
/// waiting caller (if any) before the store write starts.
async fn revalidate(
    fetcher: Arc<dyn Fetcher>,
    store: Store,
    request: Request,
    key: ResourceKey,
    tx: oneshot::Sender<Result<Response, FetchError>>,
) -> RevalidationOutcome {
    match fetcher.fetch(&request).await {
        Ok(response) => {
            // The caller may already have been served from cache
            let _ = tx.send(Ok(response.clone()));
            store_response(&store, key, response).await
        }
        Err(e) => {
            debug!(key = %key, error = %e, "Revalidation fetch failed");
            let _ = tx.send(Err(e));
            RevalidationOutcome::FetchFailed
        }
    }
}

async fn fetch_and_store(
    fetcher: Arc<dyn Fetcher>,
    store: Store,
    request: Request,
    key: ResourceKey,
) -> Result<Response, FetchError> {
    let response = fetcher.fetch(&request).await?;
    store_response(&store, key, response.clone()).await;
    Ok(response)
}
