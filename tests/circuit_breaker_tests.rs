// tests/circuit_breaker_tests.rs
use rust_api_gateway::circuit_breaker::{CircuitBreaker, CircuitBreakerRecord, CircuitBreakerState};
use rust_api_gateway::model::CircuitBreakerConfig;
use rust_api_gateway::store::MemoryStore;
use std::sync::Arc;
use std::time::Duration;

const T0: i64 = 1_700_000_000_000;

fn config() -> CircuitBreakerConfig {
    CircuitBreakerConfig {
        failure_threshold: 0.5,
        success_threshold: 2,
        timeout_ms: 30_000,
    }
}

fn breaker() -> CircuitBreaker {
    let store: Arc<MemoryStore<CircuitBreakerRecord>> = Arc::new(MemoryStore::new());
    CircuitBreaker::new(store, Duration::from_secs(3_600), None)
}

#[tokio::test]
async fn test_unknown_breaker_is_closed() {
    let cb = breaker();
    assert_eq!(cb.get_state("fresh", T0).await.unwrap(), CircuitBreakerState::Closed);
    assert!(cb.call_permitted("fresh", T0).await.unwrap());
    assert_eq!(cb.get_stats("fresh").await.unwrap(), CircuitBreakerRecord::closed());
}

#[tokio::test]
async fn test_circuit_breaker_opens_on_failures() {
    let cb = breaker();

    let state = cb.record_failure("users", &config(), T0).await.unwrap();
    assert_eq!(state, CircuitBreakerState::Open);

    let stats = cb.get_stats("users").await.unwrap();
    assert_eq!(stats.failures, 0);
    assert_eq!(stats.successes, 0);
    assert_eq!(stats.last_failure_time, Some(T0));
    assert_eq!(stats.next_attempt_time, Some(T0 + 30_000));

    assert!(!cb.call_permitted("users", T0 + 29_999).await.unwrap());
}

#[tokio::test]
async fn test_open_breaker_half_opens_after_timeout() {
    let cb = breaker();
    cb.record_failure("users", &config(), T0).await.unwrap();

    assert_eq!(
        cb.get_state("users", T0 + 30_000).await.unwrap(),
        CircuitBreakerState::HalfOpen
    );
    // The promotion is persisted with fresh counters.
    let stats = cb.get_stats("users").await.unwrap();
    assert_eq!(stats.state, CircuitBreakerState::HalfOpen);
    assert_eq!(stats.failures, 0);
    assert_eq!(stats.next_attempt_time, None);
}

#[tokio::test]
async fn test_half_open_closes_after_success_threshold() {
    let cb = breaker();
    cb.record_failure("users", &config(), T0).await.unwrap();
    cb.get_state("users", T0 + 30_000).await.unwrap();

    let state = cb.record_success("users", &config()).await.unwrap();
    assert_eq!(state, CircuitBreakerState::HalfOpen);
    assert_eq!(cb.get_stats("users").await.unwrap().successes, 1);

    let state = cb.record_success("users", &config()).await.unwrap();
    assert_eq!(state, CircuitBreakerState::Closed);
    assert_eq!(cb.get_stats("users").await.unwrap(), CircuitBreakerRecord::closed());
}

#[tokio::test]
async fn test_half_open_failure_reopens() {
    let cb = breaker();
    cb.record_failure("users", &config(), T0).await.unwrap();
    cb.get_state("users", T0 + 30_000).await.unwrap();
    cb.record_success("users", &config()).await.unwrap();

    let later = T0 + 31_000;
    let state = cb.record_failure("users", &config(), later).await.unwrap();
    assert_eq!(state, CircuitBreakerState::Open);

    let stats = cb.get_stats("users").await.unwrap();
    assert_eq!(stats.successes, 0);
    assert_eq!(stats.next_attempt_time, Some(later + 30_000));
}

#[tokio::test]
async fn test_late_success_does_not_close_open_breaker() {
    let cb = breaker();
    cb.record_failure("users", &config(), T0).await.unwrap();

    let state = cb.record_success("users", &config()).await.unwrap();
    assert_eq!(state, CircuitBreakerState::Open);
}

#[tokio::test]
async fn test_reset_is_idempotent() {
    let cb = breaker();
    cb.record_failure("users", &config(), T0).await.unwrap();

    let first = cb.reset("users").await.unwrap();
    let second = cb.reset("users").await.unwrap();

    assert_eq!(first, CircuitBreakerRecord::closed());
    assert_eq!(first, second);
    assert_eq!(cb.get_state("users", T0).await.unwrap(), CircuitBreakerState::Closed);
}

#[tokio::test]
async fn test_breakers_are_independent_per_route() {
    let cb = breaker();
    cb.record_failure("users", &config(), T0).await.unwrap();

    assert!(!cb.call_permitted("users", T0).await.unwrap());
    assert!(cb.call_permitted("orders", T0).await.unwrap());
}
