use reqwest::Url;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::CacheError;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
    Other(String),
}

impl Method {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Method::Get,
            "HEAD" => Method::Head,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "PATCH" => Method::Patch,
            "DELETE" => Method::Delete,
            "OPTIONS" => Method::Options,
            other => Method::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Options => "OPTIONS",
            Method::Other(m) => m,
        }
    }

    /// Only GET requests are ever read from or written to a store.
    pub fn is_cacheable(&self) -> bool {
        matches!(self, Method::Get)
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the host issued the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
    /// Top-level page navigation
    Navigate,
    /// Anything loaded by a page: scripts, styles, fonts, images, data
    #[default]
    Subresource,
}

/// An intercepted resource request.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub mode: RequestMode,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            mode: RequestMode::Subresource,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn navigate(url: Url) -> Self {
        Self::get(url).with_mode(RequestMode::Navigate)
    }

    /// Parse an absolute URL string into a request.
    pub fn parse(method: Method, url: &str) -> Result<Self, CacheError> {
        let parsed = Url::parse(url).map_err(|e| CacheError::InvalidRequest {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::new(method, parsed))
    }

    pub fn with_mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }

    /// The store identity of this request, or `None` when the method is not cacheable.
    pub fn resource_key(&self) -> Option<ResourceKey> {
        self.method
            .is_cacheable()
            .then(|| ResourceKey::from_url(&self.url))
    }
}

/// Canonical identity of a cacheable request: GET plus the absolute URL
/// without its fragment. Query strings are part of the identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceKey {
    url: String,
}

impl ResourceKey {
    pub fn from_url(url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self { url: url.into() }
    }

    pub fn parse(url: &str) -> Result<Self, CacheError> {
        let parsed = Url::parse(url).map_err(|e| CacheError::InvalidRequest {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::from_url(&parsed))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn method(&self) -> Method {
        Method::Get
    }

    /// Rebuild a GET request for this key, used when (re)fetching it.
    pub fn to_request(&self) -> Result<Request, CacheError> {
        Request::parse(Method::Get, &self.url)
    }

    /// Hex SHA-256 of the key, stable across runs. Used as the on-disk file name.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.method().as_str().as_bytes());
        hasher.update(b" ");
        hasher.update(self.url.as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl std::fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method(), self.url)
    }
}
