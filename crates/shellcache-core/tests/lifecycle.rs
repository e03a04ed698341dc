//! End-to-end lifecycle tests: disk store, HTTP transport against a mock
//! origin, provision/commit across versions, then request routing.

use std::sync::Arc;

use shellcache_core::{
    Coordinator, CoordinatorConfig, DiskStore, HttpFetcher, LifecycleHooks, Method, Request,
    ResourceKey, ResponseSource, RevalidationOutcome, StoreManager,
};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MANIFEST: [&str; 3] = ["/", "/index.html", "/manifest.json"];

async fn mount_shell(server: &MockServer, tag: &str) {
    for p in MANIFEST {
        Mock::given(method("GET"))
            .and(path(p))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!("{} {}", tag, p)))
            .mount(server)
            .await;
    }
}

fn coordinator(version: &str, server: &MockServer, root: &TempDir) -> Coordinator {
    let config = CoordinatorConfig::new(version, server.uri()).with_manifest(MANIFEST);
    let stores = StoreManager::new(Arc::new(DiskStore::new(root.path().join("stores"))));
    Coordinator::new(config, stores, Arc::new(HttpFetcher::new().unwrap())).unwrap()
}

fn get(server: &MockServer, p: &str) -> Request {
    Request::parse(Method::Get, &format!("{}{}", server.uri(), p)).unwrap()
}

#[tokio::test]
async fn test_version_upgrade_replaces_stores() {
    let server = MockServer::start().await;
    mount_shell(&server, "v1").await;
    let root = TempDir::new().unwrap();

    let v1 = coordinator("v1", &server, &root);
    let report = v1.install().await;
    assert!(report.succeeded());
    assert_eq!(
        v1.stores().handle("core-v1").keys().await.unwrap().len(),
        3
    );

    let v2 = coordinator("v2", &server, &root);
    let report = v2.install().await;
    assert!(report.succeeded());
    assert_eq!(report.commit.unwrap().deleted, vec!["core-v1".to_string(), "dynamic-v1".to_string()]);

    let names: Vec<String> = v2.stores().list_store_names().await.unwrap().into_iter().collect();
    assert_eq!(names, vec!["core-v2".to_string(), "dynamic-v2".to_string()]);
    assert_eq!(v2.stores().handle("core-v2").keys().await.unwrap().len(), 3);
    assert!(v2.is_ready().await);
}

#[tokio::test]
async fn test_unreachable_shell_resource_blocks_activation() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("root"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/index.html"))
        .respond_with(ResponseTemplate::new(200).set_body_string("index"))
        .mount(&server)
        .await;
    // /manifest.json is not mounted: wiremock answers 404
    let root = TempDir::new().unwrap();

    let c = coordinator("v1", &server, &root);
    let provision = c.on_provision().await;

    assert!(provision.is_err());
    assert!(provision.unwrap_err().aborts_activation());
    assert!(c.stores().handle("core-v1").keys().await.unwrap().is_empty());
    c.on_commit().await.unwrap();
    assert!(!c.is_ready().await);
}

#[tokio::test]
async fn test_shell_self_heals_after_deploy() {
    let server = MockServer::start().await;
    mount_shell(&server, "build-1").await;
    let root = TempDir::new().unwrap();
    let c = coordinator("v1", &server, &root);
    assert!(c.install().await.succeeded());

    // Same version tag, new content on the server
    server.reset().await;
    mount_shell(&server, "build-2").await;

    let mut first = c
        .on_request(get(&server, "/index.html"))
        .await
        .unwrap()
        .into_served()
        .unwrap();
    assert_eq!(first.source, ResponseSource::Cache);
    assert_eq!(first.response.body.as_ref(), b"build-1 /index.html");
    assert_eq!(
        first.take_revalidation().unwrap().settled().await,
        RevalidationOutcome::Updated
    );

    let second = c
        .on_request(get(&server, "/index.html"))
        .await
        .unwrap()
        .into_served()
        .unwrap();
    assert_eq!(second.response.body.as_ref(), b"build-2 /index.html");
}

#[tokio::test]
async fn test_dynamic_resource_fetched_once_across_concurrent_handlers() {
    let server = MockServer::start().await;
    mount_shell(&server, "v1").await;
    Mock::given(method("GET"))
        .and(path("/fonts/inter.woff2"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 64]))
        .expect(1)
        .mount(&server)
        .await;
    let root = TempDir::new().unwrap();
    let c = coordinator("v1", &server, &root);
    assert!(c.install().await.succeeded());

    let first = c
        .on_request(get(&server, "/fonts/inter.woff2"))
        .await
        .unwrap()
        .into_served()
        .unwrap();
    assert_eq!(first.source, ResponseSource::Network);

    let handlers: Vec<_> = (0..8)
        .map(|_| {
            let c = c.clone();
            let req = get(&server, "/fonts/inter.woff2");
            tokio::spawn(async move { c.on_request(req).await })
        })
        .collect();
    for handler in handlers {
        let served = handler.await.unwrap().unwrap().into_served().unwrap();
        assert_eq!(served.source, ResponseSource::Cache);
        assert_eq!(served.response.body.len(), 64);
    }

    let key = ResourceKey::parse(&format!("{}/fonts/inter.woff2", server.uri())).unwrap();
    assert!(c.stores().handle("dynamic-v1").get(&key).await.unwrap().is_some());
}

#[tokio::test]
async fn test_submission_is_never_intercepted() {
    let server = MockServer::start().await;
    let root = TempDir::new().unwrap();
    let c = coordinator("v1", &server, &root);

    let post = Request::parse(Method::Post, &format!("{}/api/attendance", server.uri())).unwrap();
    assert!(c.on_request(post).await.unwrap().is_pass_through());
    assert!(c.stores().list_store_names().await.unwrap().is_empty());
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn test_install_clears_interrupted_writes() {
    let server = MockServer::start().await;
    mount_shell(&server, "v1").await;
    let root = TempDir::new().unwrap();
    let stores = root.path().join("stores");
    let crashed = stores.join(".staging-core-v0-p4294967295n12");
    std::fs::create_dir_all(&crashed).unwrap();
    std::fs::write(crashed.join("partial.json"), b"{").unwrap();

    let c = coordinator("v1", &server, &root);
    assert!(c.install().await.succeeded());

    assert!(!crashed.exists());
    assert_eq!(c.stores().handle("core-v1").keys().await.unwrap().len(), 3);
}
