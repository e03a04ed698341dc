use std::collections::HashSet;

use reqwest::Url;

use crate::config::CoordinatorConfig;
use crate::error::CacheError;
use crate::models::{Request, ResourceKey};

/// The resolved shell manifest: ordered, de-duplicated resource keys plus the
/// lookup sets the router classifies against.
#[derive(Debug, Clone)]
pub struct ShellManifest {
    keys: Vec<ResourceKey>,
    key_set: HashSet<ResourceKey>,
    origin: Url,
    /// Paths of manifest entries that live on the application origin
    local_paths: HashSet<String>,
    document_extensions: Vec<String>,
}

impl ShellManifest {
    pub fn from_config(config: &CoordinatorConfig) -> Result<Self, CacheError> {
        let origin = config.origin_url()?;
        let mut keys = Vec::with_capacity(config.shell_manifest.len());
        let mut key_set = HashSet::new();
        let mut local_paths = HashSet::new();

        for entry in &config.shell_manifest {
            let url = config.resolve(entry)?;
            if same_origin(&url, &origin) {
                local_paths.insert(url.path().to_string());
            }
            let key = ResourceKey::from_url(&url);
            // First occurrence wins
            if key_set.insert(key.clone()) {
                keys.push(key);
            }
        }

        Ok(Self {
            keys,
            key_set,
            origin,
            local_paths,
            document_extensions: config.normalized_extensions(),
        })
    }

    pub fn keys(&self) -> &[ResourceKey] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.key_set.contains(key)
    }

    /// Same-origin request whose path equals a manifest entry's path,
    /// whatever its query string.
    pub fn matches_local_path(&self, url: &Url) -> bool {
        same_origin(url, &self.origin) && self.local_paths.contains(url.path())
    }

    /// Whether the request path ends in a shell document extension.
    pub fn is_shell_document(&self, url: &Url) -> bool {
        let Some(last) = url.path_segments().and_then(|segments| segments.last()) else {
            return false;
        };
        let Some((_, ext)) = last.rsplit_once('.') else {
            return false;
        };
        let ext = ext.to_ascii_lowercase();
        self.document_extensions.iter().any(|e| *e == ext)
    }

    /// Shell-class: in the manifest, a navigation, or a shell document path.
    pub fn is_shell_request(&self, request: &Request, key: &ResourceKey) -> bool {
        self.contains(key)
            || request.is_navigation()
            || self.matches_local_path(&request.url)
            || self.is_shell_document(&request.url)
    }
}

fn same_origin(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme()
        && a.host_str() == b.host_str()
        && a.port_or_known_default() == b.port_or_known_default()
}
