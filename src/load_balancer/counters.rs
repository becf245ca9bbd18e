// src/load_balancer/counters.rs
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionStats {
    pub backend_id: String,
    pub active_connections: u64,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
}

/// Mutable counters behind load-balancing decisions.
///
/// `LocalCounters` keeps them in process memory, which is only as good as
/// the traffic this process sees. A multi-instance deployment can back the
/// same trait with a shared atomic-increment store.
pub trait Counters: Send + Sync {
    /// Current round-robin position for `route_id`, advancing it by one.
    fn next_round_robin(&self, route_id: &str) -> u64;

    fn increment_connection(&self, backend_id: &str);

    /// Active count is floored at zero.
    fn decrement_connection(&self, backend_id: &str, success: bool);

    fn active_connections(&self, backend_id: &str) -> u64;

    fn connection_stats(&self, backend_id: &str) -> ConnectionStats;

    fn all_connection_stats(&self) -> Vec<ConnectionStats>;

    /// Drop the stats for one backend, or for all of them.
    fn reset_stats(&self, backend_id: Option<&str>);
}

#[derive(Debug, Default)]
struct ConnectionCounters {
    active: AtomicU64,
    total: AtomicU64,
    successful: AtomicU64,
    failed: AtomicU64,
}

impl ConnectionCounters {
    fn snapshot(&self, backend_id: &str) -> ConnectionStats {
        ConnectionStats {
            backend_id: backend_id.to_string(),
            active_connections: self.active.load(Ordering::Relaxed),
            total_requests: self.total.load(Ordering::Relaxed),
            successful_requests: self.successful.load(Ordering::Relaxed),
            failed_requests: self.failed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Default)]
pub struct LocalCounters {
    round_robin: DashMap<String, AtomicU64>,
    connections: DashMap<String, Arc<ConnectionCounters>>,
}

impl LocalCounters {
    pub fn new() -> Self {
        Self::default()
    }

    fn counters(&self, backend_id: &str) -> Arc<ConnectionCounters> {
        if let Some(counters) = self.connections.get(backend_id) {
            return counters.clone();
        }
        self.connections
            .entry(backend_id.to_string())
            .or_default()
            .clone()
    }
}

impl Counters for LocalCounters {
    fn next_round_robin(&self, route_id: &str) -> u64 {
        if let Some(counter) = self.round_robin.get(route_id) {
            return counter.fetch_add(1, Ordering::Relaxed);
        }
        self.round_robin
            .entry(route_id.to_string())
            .or_default()
            .fetch_add(1, Ordering::Relaxed)
    }

    fn increment_connection(&self, backend_id: &str) {
        let counters = self.counters(backend_id);
        counters.active.fetch_add(1, Ordering::SeqCst);
        counters.total.fetch_add(1, Ordering::Relaxed);
    }

    fn decrement_connection(&self, backend_id: &str, success: bool) {
        let counters = self.counters(backend_id);
        let _ = counters
            .active
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_sub(1)));

        if success {
            counters.successful.fetch_add(1, Ordering::Relaxed);
        } else {
            counters.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn active_connections(&self, backend_id: &str) -> u64 {
        self.connections
            .get(backend_id)
            .map(|c| c.active.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    fn connection_stats(&self, backend_id: &str) -> ConnectionStats {
        match self.connections.get(backend_id) {
            Some(counters) => counters.snapshot(backend_id),
            None => ConnectionStats {
                backend_id: backend_id.to_string(),
                ..ConnectionStats::default()
            },
        }
    }

    fn all_connection_stats(&self) -> Vec<ConnectionStats> {
        let mut stats: Vec<ConnectionStats> = self
            .connections
            .iter()
            .map(|entry| entry.value().snapshot(entry.key()))
            .collect();
        stats.sort_by(|a, b| a.backend_id.cmp(&b.backend_id));
        stats
    }

    fn reset_stats(&self, backend_id: Option<&str>) {
        match backend_id {
            Some(id) => {
                self.connections.remove(id);
            }
            None => self.connections.clear(),
        }
    }
}

/// Pairs a dispatch-time increment with a completion-time decrement.
///
/// The decrement happens on drop, so it still runs when the forwarding
/// future errors out, panics or is cancelled. Until `finish` is called the
/// attempt counts as failed.
pub struct ConnectionGuard {
    counters: Arc<dyn Counters>,
    backend_id: String,
    success: bool,
}

impl ConnectionGuard {
    pub fn new(counters: Arc<dyn Counters>, backend_id: &str) -> Self {
        counters.increment_connection(backend_id);
        Self {
            counters,
            backend_id: backend_id.to_string(),
            success: false,
        }
    }

    pub fn finish(mut self, success: bool) {
        self.success = success;
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.counters
            .decrement_connection(&self.backend_id, self.success);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_robin_counter_is_per_route() {
        let counters = LocalCounters::new();
        assert_eq!(counters.next_round_robin("a"), 0);
        assert_eq!(counters.next_round_robin("a"), 1);
        assert_eq!(counters.next_round_robin("b"), 0);
        assert_eq!(counters.next_round_robin("a"), 2);
    }

    #[test]
    fn test_decrement_is_floored_at_zero() {
        let counters = LocalCounters::new();
        counters.decrement_connection("b1", false);

        let stats = counters.connection_stats("b1");
        assert_eq!(stats.active_connections, 0);
        assert_eq!(stats.failed_requests, 1);
    }

    #[test]
    fn test_guard_decrements_on_drop() {
        let counters: Arc<dyn Counters> = Arc::new(LocalCounters::new());

        let guard = ConnectionGuard::new(counters.clone(), "b1");
        assert_eq!(counters.active_connections("b1"), 1);
        drop(guard);

        let stats = counters.connection_stats("b1");
        assert_eq!(stats.active_connections, 0);
        assert_eq!(stats.total_requests, 1);
        assert_eq!(stats.failed_requests, 1);

        ConnectionGuard::new(counters.clone(), "b1").finish(true);
        let stats = counters.connection_stats("b1");
        assert_eq!(stats.successful_requests, 1);
        assert_eq!(stats.total_requests, 2);
    }

    #[test]
    fn test_reset_stats() {
        let counters = LocalCounters::new();
        counters.increment_connection("b1");
        counters.increment_connection("b2");

        counters.reset_stats(Some("b1"));
        assert_eq!(counters.all_connection_stats().len(), 1);

        counters.reset_stats(None);
        assert!(counters.all_connection_stats().is_empty());
    }
}
