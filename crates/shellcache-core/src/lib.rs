//! shellcache-core - offline-first resource cache coordinator.
//!
//! Decides per request whether to serve from a local store, the network, or
//! both, and keeps the local stores consistent across deployed versions.
//!
//! - `store`: named key-value stores (memory and disk backends)
//! - `provisioner`: populates the shell store, prunes stale versions
//! - `router`: stale-while-revalidate for the shell, cache-first otherwise
//! - `coordinator`: the lifecycle interface a host drives

pub mod config;
pub mod coordinator;
pub mod error;
pub mod manifest;
pub mod models;
pub mod network;
pub mod provisioner;
pub mod router;
pub mod store;

pub use config::CoordinatorConfig;
pub use coordinator::{Coordinator, InstallReport, LifecycleHooks, LifecyclePhase};
pub use error::{CacheError, FetchError, StoreError};
pub use manifest::ShellManifest;
pub use models::{CachedEntry, Method, Request, RequestMode, ResourceKey, Response};
pub use network::{Fetcher, HttpFetcher, ScriptedResponse, StaticFetcher};
pub use provisioner::{Activation, CommitReport, ProvisionReport};
pub use router::{RequestClass, ResponseSource, Revalidation, RevalidationOutcome, Routed, Served};
pub use store::{DiskStore, MemoryStore, Store, StoreBackend, StoreManager};
