//! Coordinator configuration.
//!
//! The configuration is fixed at build/deploy time: a version tag, the shell
//! manifest, the application origin used to resolve relative manifest entries,
//! and the two deployment toggles (immediate activation, offline fallback).
//! Store names are derived from it, never held as global state.

use std::path::Path;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// Origin used when the configuration does not name one
pub const DEFAULT_ORIGIN: &str = "http://localhost:8080/";

/// Prefix of the versioned shell store
pub const CORE_STORE_PREFIX: &str = "core";

/// Prefix of the versioned opportunistic store
pub const DYNAMIC_STORE_PREFIX: &str = "dynamic";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Version tag embedded in store names
    pub version: String,
    /// Base URL that relative manifest entries resolve against
    pub origin: String,
    /// Resources required for the application to boot offline
    pub shell_manifest: Vec<String>,
    /// Resource served when a request fails and nothing is cached
    pub offline_fallback: Option<String>,
    /// Skip graceful handover on provision and claim open instances on commit
    pub immediate_activation: bool,
    /// Path extensions that mark a request as a shell document
    pub shell_document_extensions: Vec<String>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            version: "v1".to_string(),
            origin: DEFAULT_ORIGIN.to_string(),
            shell_manifest: vec![
                "/".to_string(),
                "/index.html".to_string(),
                "/manifest.json".to_string(),
                "/icons/icon-192x192.png".to_string(),
                "/icons/icon-512x512.png".to_string(),
            ],
            offline_fallback: None,
            immediate_activation: true,
            shell_document_extensions: vec!["html".to_string(), "htm".to_string()],
        }
    }
}

impl CoordinatorConfig {
    pub fn new(version: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            origin: origin.into(),
            ..Self::default()
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_manifest<I, S>(mut self, manifest: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.shell_manifest = manifest.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_offline_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.offline_fallback = Some(fallback.into());
        self
    }

    pub fn with_immediate_activation(mut self, enabled: bool) -> Self {
        self.immediate_activation = enabled;
        self
    }

    pub fn core_store_name(&self) -> String {
        format!("{}-{}", CORE_STORE_PREFIX, self.version)
    }

    pub fn dynamic_store_name(&self) -> String {
        format!("{}-{}", DYNAMIC_STORE_PREFIX, self.version)
    }

    /// Parsed origin. Fails if the origin is not an absolute http(s) URL.
    pub fn origin_url(&self) -> Result<Url, CacheError> {
        let url = Url::parse(&self.origin)
            .map_err(|e| CacheError::InvalidConfig(format!("origin {:?}: {}", self.origin, e)))?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(CacheError::InvalidConfig(format!(
                "origin {:?} must be an absolute http(s) URL",
                self.origin
            )));
        }
        Ok(url)
    }

    /// Resolve a manifest or fallback identifier: absolute URLs are kept,
    /// anything else is joined onto the origin.
    pub fn resolve(&self, identifier: &str) -> Result<Url, CacheError> {
        let origin = self.origin_url()?;
        origin
            .join(identifier.trim())
            .map_err(|e| CacheError::InvalidConfig(format!("resource {:?}: {}", identifier, e)))
    }

    /// Lower-cased extensions without a leading dot
    pub fn normalized_extensions(&self) -> Vec<String> {
        self.shell_document_extensions
            .iter()
            .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect()
    }

    pub fn validate(&self) -> Result<(), CacheError> {
        if self.version.trim().is_empty() {
            return Err(CacheError::InvalidConfig("version tag is empty".to_string()));
        }
        if self
            .version
            .chars()
            .any(|c| c == '/' || c == '\\' || c.is_whitespace())
        {
            return Err(CacheError::InvalidConfig(format!(
                "version tag {:?} may not contain path separators or whitespace",
                self.version
            )));
        }
        self.origin_url()?;
        for entry in &self.shell_manifest {
            self.resolve(entry)?;
        }
        if let Some(ref fallback) = self.offline_fallback {
            self.resolve(fallback)?;
        }
        Ok(())
    }

    /// Load a configuration from a JSON file. Missing fields take their defaults.
    pub fn load_from(path: &Path) -> Result<Self, CacheError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            CacheError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&contents).map_err(|e| {
            CacheError::InvalidConfig(format!("cannot parse {}: {}", path.display(), e))
        })
    }

    pub fn save_to(&self, path: &Path) -> Result<(), CacheError> {
        let io_err =
            |e: std::io::Error| CacheError::InvalidConfig(format!("cannot write {}: {}", path.display(), e));
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| CacheError::InvalidConfig(e.to_string()))?;
        std::fs::write(path, contents).map_err(io_err)
    }
}
