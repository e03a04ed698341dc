use thiserror::Error;

/// Failures reported by a store backend.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid store name: {0:?}")]
    InvalidName(String),

    #[error("Store I/O failed for {store}: {source}")]
    Io {
        store: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt entry in store {store}: {source}")]
    Corrupt {
        store: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Store backend unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub(crate) fn io(store: &str, source: std::io::Error) -> Self {
        StoreError::Io {
            store: store.to_string(),
            source,
        }
    }
}

/// Failures reported by the network transport.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Resource unreachable: {0}")]
    Unreachable(String),

    #[error("Unsupported request method: {0}")]
    UnsupportedMethod(String),
}

/// Top-level error taxonomy of the coordinator.
#[derive(Error, Debug)]
pub enum CacheError {
    /// One or more shell resources could not be fetched or stored; nothing
    /// was committed. `cause` is set when the core store rejected the batch.
    #[error("Provisioning failed for {} shell resource(s): {}", .failed.len(), summarize(.failed))]
    ProvisionFailure {
        failed: Vec<String>,
        #[source]
        cause: Option<StoreError>,
    },

    #[error("Fetch failed for {key}: {source}")]
    FetchFailure {
        key: String,
        #[source]
        source: FetchError,
    },

    #[error("Store failure: {0}")]
    StoreFailure(#[from] StoreError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid request URL {url:?}: {reason}")]
    InvalidRequest { url: String, reason: String },
}

/// Maximum number of failed keys spelled out in messages
const MAX_LISTED_FAILURES: usize = 10;

fn summarize(failed: &[String]) -> String {
    if failed.len() <= MAX_LISTED_FAILURES {
        failed.join(", ")
    } else {
        format!(
            "{}... ({} total)",
            failed[..MAX_LISTED_FAILURES].join(", "),
            failed.len()
        )
    }
}

impl CacheError {
    /// Whether this error should abort the version transition.
    pub fn aborts_activation(&self) -> bool {
        matches!(self, CacheError::ProvisionFailure { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provision_failure_message_lists_keys() {
        let err = CacheError::ProvisionFailure {
            failed: vec!["GET http://app.test/".into(), "GET http://app.test/a.png".into()],
            cause: None,
        };
        let msg = err.to_string();
        assert!(msg.contains("2 shell resource(s)"));
        assert!(msg.contains("http://app.test/a.png"));
        assert!(err.aborts_activation());
    }

    #[test]
    fn test_fetch_failure_does_not_abort_activation() {
        let err = CacheError::FetchFailure {
            key: "GET http://app.test/font.woff2".into(),
            source: FetchError::Unreachable("offline".into()),
        };
        assert!(!err.aborts_activation());
    }

    #[test]
    fn test_store_failure_does_not_abort_activation() {
        let err = CacheError::from(StoreError::Unavailable("disk full".into()));
        assert!(!err.aborts_activation());
    }

    #[test]
    fn test_provision_failure_message_is_capped() {
        let failed: Vec<String> = (0..25).map(|i| format!("GET /{}", i)).collect();
        let err = CacheError::ProvisionFailure {
            failed,
            cause: None,
        };
        let msg = err.to_string();
        assert!(msg.contains("25 shell resource(s)"));
        assert!(msg.ends_with("(25 total)"));
        assert!(!msg.contains("GET /10"));
    }

    #[test]
    fn test_provision_failure_keeps_store_cause() {
        use std::error::Error as _;

        let err = CacheError::ProvisionFailure {
            failed: vec!["GET http://app.test/".into()],
            cause: Some(StoreError::Unavailable("disk full".into())),
        };
        let source = err.source().expect("store cause");
        assert!(source.to_string().contains("disk full"));
    }
}
