//! Health aggregation against local peers, a failing cache and slow services

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use axum::{http::StatusCode, routing::get, Router};
use portal::cache::{LookupCache, MemoryCache};
use portal::config::PeerService;
use portal::health::{AlertKind, HealthAggregator, ServiceState, Severity, CACHE_SERVICE, DATABASE_SERVICE};
use portal::storage::{SqliteStorage, Storage};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Helper to create test storage
async fn create_test_storage() -> Arc<dyn Storage> {
    let storage = SqliteStorage::new("sqlite::memory:", 5).await.unwrap();
    storage.init().await.unwrap();
    Arc::new(storage)
}

/// Cache whose every call fails
struct UnreachableCache;

#[async_trait]
impl LookupCache for UnreachableCache {
    async fn get(&self, _key: &str) -> Result<Option<String>> {
        Err(anyhow!("connection refused"))
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<()> {
        Err(anyhow!("connection refused"))
    }

    async fn ping(&self) -> Result<()> {
        Err(anyhow!("connection refused"))
    }
}

/// Serve a tiny peer on an ephemeral port and return its base URL
async fn spawn_peer() -> String {
    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route(
            "/broken",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        )
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{addr}")
}

/// A port nothing listens on
async fn unused_port_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/health")
}

fn peer(name: &str, url: String) -> PeerService {
    PeerService {
        name: name.to_string(),
        url,
    }
}

#[tokio::test]
async fn test_all_services_up() {
    let base = spawn_peer().await;
    let health = HealthAggregator::new(
        create_test_storage().await,
        Arc::new(MemoryCache::new(100)),
        vec![peer("campaign-api", format!("{base}/health"))],
        Duration::from_secs(2),
    )
    .unwrap();

    let report = health.status().await;

    assert!(report.is_healthy());
    assert!(report.alerts.is_empty());
    assert_eq!(report.services.len(), 3);
    assert_eq!(report.services[DATABASE_SERVICE], ServiceState::Up);
    assert_eq!(report.services[CACHE_SERVICE], ServiceState::Up);
    assert_eq!(report.services["campaign-api"], ServiceState::Up);
}

#[tokio::test]
async fn test_failures_become_critical_alerts() {
    let base = spawn_peer().await;
    let health = HealthAggregator::new(
        create_test_storage().await,
        Arc::new(UnreachableCache),
        vec![
            peer("campaign-api", format!("{base}/health")),
            peer("broken-api", format!("{base}/broken")),
            peer("gone-api", unused_port_url().await),
        ],
        Duration::from_secs(2),
    )
    .unwrap();

    let report = health.status().await;

    assert!(!report.is_healthy());
    assert_eq!(report.services[DATABASE_SERVICE], ServiceState::Up);
    assert_eq!(report.services["campaign-api"], ServiceState::Up);
    assert_eq!(report.services[CACHE_SERVICE], ServiceState::Down);
    assert_eq!(report.services["broken-api"], ServiceState::Down);
    assert_eq!(report.services["gone-api"], ServiceState::Down);

    assert_eq!(report.alerts.len(), 3);
    assert!(report
        .alerts
        .iter()
        .all(|a| a.kind == AlertKind::Service && a.severity == Severity::Critical));
    assert!(report
        .alerts
        .iter()
        .any(|a| a.message == "broken-api is down (HTTP 500)"));
    assert!(report
        .alerts
        .iter()
        .any(|a| a.message.starts_with("cache is down")));
}

#[tokio::test]
async fn test_slow_peer_does_not_hold_up_report() {
    let base = spawn_peer().await;
    let health = HealthAggregator::new(
        create_test_storage().await,
        Arc::new(MemoryCache::new(100)),
        vec![
            peer("slow-a", format!("{base}/slow")),
            peer("slow-b", format!("{base}/slow")),
            peer("fast", format!("{base}/health")),
        ],
        Duration::from_millis(200),
    )
    .unwrap();

    let started = Instant::now();
    let report = health.status().await;
    let elapsed = started.elapsed();

    // Probes run concurrently, so two slow peers cost one timeout, not two
    assert!(elapsed < Duration::from_secs(2), "took {elapsed:?}");
    assert_eq!(report.services["slow-a"], ServiceState::Down);
    assert_eq!(report.services["slow-b"], ServiceState::Down);
    assert_eq!(report.services["fast"], ServiceState::Up);
}
