use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ResourceKey;

/// A fetched or cached response.
/// Clone is cheap - the body is reference counted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status: u16,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(with = "body_base64")]
    pub body: Bytes,
}

impl Response {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self::new(200, body)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// First header value with the given name, compared case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// 2xx responses are the only ones ever written to a store.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Immutable snapshot of a response, tagged with the key it was stored under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedEntry {
    pub key: ResourceKey,
    pub response: Response,
    pub cached_at: DateTime<Utc>,
}

impl CachedEntry {
    pub fn new(key: ResourceKey, response: Response) -> Self {
        Self {
            key,
            response,
            cached_at: Utc::now(),
        }
    }

    pub fn age_minutes(&self) -> i64 {
        (Utc::now() - self.cached_at).num_minutes()
    }
}

/// Bodies are arbitrary bytes (icons, model weights), so they go to JSON as base64.
mod body_base64 {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded)
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn key() -> ResourceKey {
        ResourceKey::parse("https://app.test/icons/icon-192x192.png").unwrap()
    }

    #[test]
    fn test_response_header_lookup_is_case_insensitive() {
        let resp = Response::ok("x").with_header("Content-Type", "text/html");
        assert_eq!(resp.header("content-type"), Some("text/html"));
        assert_eq!(resp.header("etag"), None);
    }

    #[test]
    fn test_response_success_range() {
        assert!(Response::new(200, "").is_success());
        assert!(Response::new(204, "").is_success());
        assert!(!Response::new(304, "").is_success());
        assert!(!Response::new(404, "").is_success());
        assert!(!Response::new(503, "").is_success());
    }

    #[test]
    fn test_entry_json_keeps_binary_body() {
        let body: Vec<u8> = vec![0x89, b'P', b'N', b'G', 0, 255];
        let entry = CachedEntry::new(key(), Response::ok(body.clone()).with_header("content-type", "image/png"));

        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"key\":\"https://app.test/icons/icon-192x192.png\""));

        let back: CachedEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back.response.body.as_ref(), body.as_slice());
        assert_eq!(back.key, entry.key);
    }

    #[test]
    fn test_age_minutes() {
        let mut entry = CachedEntry::new(key(), Response::ok("a"));
        assert_eq!(entry.age_minutes(), 0);

        entry.cached_at = Utc::now() - Duration::minutes(95);
        assert_eq!(entry.age_minutes(), 95);
    }
}
