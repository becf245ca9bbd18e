// tests/health_tests.rs
use rust_api_gateway::config::HealthCheckConfig;
use rust_api_gateway::health::HealthTracker;
use rust_api_gateway::model::{now_millis, Backend};

fn config() -> HealthCheckConfig {
    HealthCheckConfig {
        interval_secs: 30,
        timeout_secs: 2,
        path: "/health".to_string(),
        active: false,
    }
}

fn backend(id: &str, url: &str) -> Backend {
    Backend {
        id: id.to_string(),
        url: url.parse().unwrap(),
        weight: 1.0,
        health_check_path: None,
        healthy: true,
        last_health_check: None,
    }
}

fn unreachable_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_2xx_and_3xx_are_healthy() {
    let mut server = mockito::Server::new_async().await;
    let ok = server.mock("GET", "/health").with_status(200).create_async().await;
    let moved = server
        .mock("GET", "/ping")
        .with_status(302)
        .with_header("location", "/elsewhere")
        .create_async()
        .await;

    let tracker = HealthTracker::new(config(), None).unwrap();

    let result = tracker.check(&backend("a", &server.url())).await;
    assert!(result.healthy);
    assert!(result.error.is_none());

    let mut custom = backend("b", &server.url());
    custom.health_check_path = Some("/ping".to_string());
    let result = tracker.check(&custom).await;
    assert!(result.healthy);

    ok.assert_async().await;
    moved.assert_async().await;
}

#[tokio::test]
async fn test_5xx_and_unreachable_are_unhealthy() {
    let mut server = mockito::Server::new_async().await;
    server.mock("GET", "/health").with_status(503).create_async().await;

    let tracker = HealthTracker::new(config(), None).unwrap();

    let result = tracker.check(&backend("a", &server.url())).await;
    assert!(!result.healthy);
    assert_eq!(result.error.as_deref(), Some("HTTP 503 Service Unavailable"));

    let result = tracker.check(&backend("gone", &unreachable_url())).await;
    assert!(!result.healthy);
    assert!(result.error.is_some());
}

#[tokio::test]
async fn test_refresh_leaves_fresh_backends_untouched() {
    let mut server = mockito::Server::new_async().await;
    let probe = server
        .mock("GET", "/health")
        .with_status(503)
        .expect(1)
        .create_async()
        .await;

    let tracker = HealthTracker::new(config(), None).unwrap();

    let mut fresh = backend("fresh", &server.url());
    fresh.last_health_check = Some(now_millis());
    let stale = backend("stale", &server.url());

    let refreshed = tracker
        .refresh_stale_only(&[fresh.clone(), stale.clone()])
        .await;

    assert_eq!(refreshed[0], fresh);
    assert_eq!(refreshed[1].id, "stale");
    assert!(!refreshed[1].healthy);
    assert!(refreshed[1].last_health_check.is_some());

    probe.assert_async().await;
}

#[tokio::test]
async fn test_known_health_is_reused_until_stale() {
    let mut server = mockito::Server::new_async().await;
    let probe = server
        .mock("GET", "/health")
        .with_status(500)
        .expect(1)
        .create_async()
        .await;

    let tracker = HealthTracker::new(config(), None).unwrap();
    let route_backend = backend("b1", &server.url());

    // The route definition never changes; the tracker remembers the probe.
    let first = tracker.refresh_stale_only(&[route_backend.clone()]).await;
    let second = tracker.refresh_stale_only(&[route_backend]).await;

    assert!(!first[0].healthy);
    assert!(!second[0].healthy);
    assert_eq!(tracker.statuses().len(), 1);
    assert_eq!(tracker.statuses()[0].backend_id, "b1");

    probe.assert_async().await;
}
