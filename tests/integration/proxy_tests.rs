//! Proxy binding against a wiremock echo endpoint and a file-backed store

use crate::common::{memory_storage, pool};
use chrono::{Duration, Utc};
use crawl_warden::config::{ProxyConfig, ProxyEndpoint};
use crawl_warden::proxy::{
    HttpProxyValidator, ProxyAffinityBinder, ProxyError, ProxyProvider, ProxyValidator,
    StaticProxyProvider,
};
use crawl_warden::storage::{lock_storage, open_storage, shared, NewAccount};
use crawl_warden::Platform;
use std::sync::Arc;
use url::Url;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn endpoint(ip: &str, port: u16) -> ProxyEndpoint {
    ProxyEndpoint {
        ip: ip.to_string(),
        port,
        user: None,
        password: None,
    }
}

/// Uses the mock server both as the proxy and as the echo target, so every
/// validation ping lands on it regardless of how the request line is formed
async fn echo_binder(status: u16) -> (MockServer, ProxyAffinityBinder) {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(status).set_body_string("{\"origin\":\"10.9.9.9\"}"))
        .mount(&server)
        .await;

    let address = *server.address();
    let provider = StaticProxyProvider::new(
        vec![endpoint(&address.ip().to_string(), address.port())],
        Duration::minutes(30),
    );
    let validator = HttpProxyValidator::new(
        Url::parse(&format!("{}/ip", server.uri())).unwrap(),
        std::time::Duration::from_secs(5),
    );

    let binder = ProxyAffinityBinder::new(
        &ProxyConfig::default(),
        Arc::new(provider),
        Some(Arc::new(validator)),
        memory_storage(),
    );
    (server, binder)
}

#[tokio::test]
async fn test_validated_proxy_is_bound() {
    let (server, binder) = echo_binder(200).await;

    let snapshot = binder.get_or_bind(1).await.unwrap();
    assert_eq!(snapshot.port, server.address().port());
    assert!(!snapshot.is_expired_at(Utc::now(), Duration::seconds(60)));

    // Second call reuses the binding without another ping
    let pings = server.received_requests().await.unwrap().len();
    let again = binder.get_or_refresh_proxy(1).await.unwrap();
    assert_eq!(again, snapshot);
    assert_eq!(server.received_requests().await.unwrap().len(), pings);
}

#[tokio::test]
async fn test_failing_echo_blacklists_endpoint() {
    let (server, binder) = echo_binder(503).await;
    let port = server.address().port();
    let ip = server.address().ip().to_string();

    let result = binder.get_or_bind(1).await;
    assert!(matches!(result, Err(ProxyError::Exhausted { account_id: 1, .. })));
    assert!(binder.is_blacklisted(&ip, port));

    // The blacklisted endpoint is never offered again
    let pings = server.received_requests().await.unwrap().len();
    assert!(binder.get_or_bind(2).await.is_err());
    assert_eq!(server.received_requests().await.unwrap().len(), pings);
}

#[tokio::test]
async fn test_blacklisted_endpoint_never_returned() {
    let provider = StaticProxyProvider::new(
        vec![endpoint("10.0.0.1", 8000), endpoint("10.0.0.2", 8000)],
        Duration::minutes(30),
    );
    let binder = ProxyAffinityBinder::new(
        &ProxyConfig::default(),
        Arc::new(provider),
        None,
        memory_storage(),
    );

    for _ in 0..3 {
        binder.mark_ip_failed("10.0.0.1", 8000).await;
    }

    for account_id in 0..10 {
        let snapshot = binder.get_or_bind(account_id).await.unwrap();
        assert_eq!(snapshot.endpoint(), "10.0.0.2:8000");
    }
}

#[tokio::test]
async fn test_usage_failures_move_bound_accounts() {
    let provider = StaticProxyProvider::new(
        vec![endpoint("10.0.0.1", 8000), endpoint("10.0.0.2", 8000)],
        Duration::minutes(30),
    );
    let binder = ProxyAffinityBinder::new(
        &ProxyConfig::default(),
        Arc::new(provider),
        None,
        memory_storage(),
    );

    let first = binder.get_or_bind(1).await.unwrap();
    for _ in 0..3 {
        binder.mark_ip_failed(&first.ip, first.port).await;
    }

    let moved = binder.get_or_bind(1).await.unwrap();
    assert_ne!(moved.endpoint(), first.endpoint());
}

#[tokio::test]
async fn test_account_record_follows_binding() -> anyhow::Result<()> {
    let storage = memory_storage();
    let accounts = Arc::new(pool(storage.clone()));
    let account = accounts.add_account(NewAccount::new(Platform::Xhs, "x", "cookie"))?;

    let provider = StaticProxyProvider::new(
        vec![endpoint("10.2.0.1", 8000), endpoint("10.2.0.2", 8000)],
        Duration::minutes(30),
    );
    let binder = ProxyAffinityBinder::new(
        &ProxyConfig::default(),
        Arc::new(provider),
        None,
        storage.clone(),
    )
    .with_account_pool(accounts.clone());

    let first = binder.get_or_bind(account.id).await?;
    let bound = accounts.get_account(account.id).and_then(|a| a.bound_proxy_id);
    assert_eq!(bound, Some(first.endpoint()));

    // Blacklisting the endpoint clears the field until the next bind
    for _ in 0..3 {
        binder.mark_ip_failed(&first.ip, first.port).await;
    }
    assert_eq!(accounts.get_account(account.id).and_then(|a| a.bound_proxy_id), None);

    let second = binder.get_or_bind(account.id).await?;
    assert_ne!(second.endpoint(), first.endpoint());
    let stored = lock_storage(&storage).get_account(account.id)?;
    assert_eq!(stored.and_then(|a| a.bound_proxy_id), Some(second.endpoint()));

    binder.release(account.id).await;
    assert_eq!(accounts.get_account(account.id).and_then(|a| a.bound_proxy_id), None);
    Ok(())
}

#[tokio::test]
async fn test_bindings_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("proxy.db");
    let endpoints = vec![endpoint("10.1.0.1", 3128), endpoint("10.1.0.2", 3128)];

    let (bound_a, bound_b) = {
        let storage = shared(open_storage(&db_path).unwrap());
        let binder = ProxyAffinityBinder::new(
            &ProxyConfig::default(),
            Arc::new(StaticProxyProvider::new(endpoints.clone(), Duration::minutes(30))),
            None,
            storage,
        );
        (
            binder.get_or_bind(1).await.unwrap(),
            binder.get_or_bind(2).await.unwrap(),
        )
    };

    // A fresh provider would hand out 10.1.0.1 first; affinity must win
    let provider: Arc<dyn ProxyProvider> =
        Arc::new(StaticProxyProvider::new(endpoints, Duration::minutes(30)));
    let storage = shared(open_storage(&db_path).unwrap());
    let binder = ProxyAffinityBinder::new(&ProxyConfig::default(), provider, None, storage);
    assert_eq!(binder.restore().unwrap(), 2);

    assert_eq!(binder.get_or_bind(2).await.unwrap().endpoint(), bound_b.endpoint());
    assert_eq!(binder.get_or_bind(1).await.unwrap().endpoint(), bound_a.endpoint());
}

#[tokio::test]
async fn test_validator_reports_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let address = *server.address();
    let validator = HttpProxyValidator::new(
        Url::parse(&format!("{}/ip", server.uri())).unwrap(),
        std::time::Duration::from_secs(5),
    );
    let snapshot = crawl_warden::ProxySnapshot::new(
        address.ip().to_string(),
        address.port(),
        Utc::now() + Duration::minutes(5),
    );

    match validator.validate(&snapshot).await {
        Err(ProxyError::Validation { reason, .. }) => assert!(reason.contains("403")),
        other => panic!("expected validation error, got {:?}", other),
    }
}
