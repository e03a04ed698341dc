use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use super::Fetcher;
use crate::error::FetchError;
use crate::models::{Request, Response};

/// HTTP request timeout in seconds.
/// Generous because shell manifests may include large model weight files.
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Connect timeout in seconds, so an unreachable host fails fast while offline.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Network transport backed by reqwest.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone, Debug)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|_| FetchError::UnsupportedMethod(request.method.to_string()))?;

        let response = self
            .client
            .request(method, request.url.clone())
            .send()
            .await?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| match value.to_str() {
                Ok(v) => Some((name.as_str().to_string(), v.to_string())),
                Err(_) => {
                    warn!(header = %name, url = %request.url, "Dropping non-ASCII header value");
                    None
                }
            })
            .collect();
        let body = response.bytes().await?;

        debug!(url = %request.url, status, bytes = body.len(), "Fetched from network");
        Ok(Response {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Method;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(server: &MockServer, p: &str) -> Request {
        Request::parse(Method::Get, &format!("{}{}", server.uri(), p)).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_returns_status_headers_body() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/index.html"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("<html>v1</html>", "text/html")
                    .insert_header("etag", "\"v1\""),
            )
            .mount(&mock_server)
            .await;

        let fetcher = HttpFetcher::new().unwrap();
        let resp = fetcher.fetch(&request(&mock_server, "/index.html")).await.unwrap();

        assert_eq!(resp.status, 200);
        assert_eq!(resp.header("content-type"), Some("text/html"));
        assert_eq!(resp.header("ETag"), Some("\"v1\""));
        assert_eq!(resp.body.as_ref(), b"<html>v1</html>");
    }

    #[tokio::test]
    async fn test_error_status_is_not_a_transport_failure() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing.png"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let fetcher = HttpFetcher::new().unwrap();
        let resp = fetcher.fetch(&request(&mock_server, "/missing.png")).await.unwrap();
        assert_eq!(resp.status, 404);
        assert!(!resp.is_success());
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        // Port 9 (discard) on localhost is closed in test environments
        let fetcher = HttpFetcher::new().unwrap();
        let req = Request::parse(Method::Get, "http://127.0.0.1:9/").unwrap();
        let err = fetcher.fetch(&req).await.unwrap_err();
        assert!(matches!(err, FetchError::Network(_)));
    }

    #[tokio::test]
    async fn test_post_is_sent_with_its_method() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/attendance"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&mock_server)
            .await;

        let fetcher = HttpFetcher::new().unwrap();
        let req = Request::parse(Method::Post, &format!("{}/api/attendance", mock_server.uri())).unwrap();
        assert_eq!(fetcher.fetch(&req).await.unwrap().status, 201);
    }
}
