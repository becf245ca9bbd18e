// src/load_balancer/mod.rs
mod algorithm;
mod counters;
mod least_connections;
mod random;
mod round_robin;
mod weighted;

pub use algorithm::Algorithm;
pub use counters::{ConnectionGuard, ConnectionStats, Counters, LocalCounters};
pub use least_connections::LeastConnectionsBalancer;
pub use random::RandomBalancer;
pub use round_robin::RoundRobinBalancer;
pub use weighted::WeightedBalancer;

use crate::model::{Backend, LoadBalancerPolicy};
use std::sync::Arc;
use tracing::debug;

pub fn algorithm_for(policy: LoadBalancerPolicy) -> &'static dyn Algorithm {
    match policy {
        LoadBalancerPolicy::RoundRobin => &RoundRobinBalancer,
        LoadBalancerPolicy::Weighted => &WeightedBalancer,
        LoadBalancerPolicy::Random => &RandomBalancer,
        LoadBalancerPolicy::LeastConnections => &LeastConnectionsBalancer,
    }
}

/// Chooses backends for routes and owns the connection accounting that
/// least-connections relies on.
pub struct LoadBalancer {
    counters: Arc<dyn Counters>,
}

impl LoadBalancer {
    pub fn new(counters: Arc<dyn Counters>) -> Self {
        Self { counters }
    }

    /// Pick one healthy backend, or `None` when none is healthy.
    pub fn select(
        &self,
        backends: &[Backend],
        policy: LoadBalancerPolicy,
        route_id: &str,
    ) -> Option<Backend> {
        let healthy: Vec<&Backend> = backends.iter().filter(|b| b.healthy).collect();
        if healthy.is_empty() {
            return None;
        }

        let algorithm = algorithm_for(policy);
        let selected = algorithm.select(&healthy, route_id, self.counters.as_ref())?;
        debug!(
            "Route {} selected backend {} via {}",
            route_id,
            selected.id,
            algorithm.name()
        );
        Some(selected.clone())
    }

    /// Count a dispatch to `backend_id`; the returned guard records completion.
    pub fn track(&self, backend_id: &str) -> ConnectionGuard {
        ConnectionGuard::new(self.counters.clone(), backend_id)
    }

    pub fn increment_connection(&self, backend_id: &str) {
        self.counters.increment_connection(backend_id);
    }

    pub fn decrement_connection(&self, backend_id: &str, success: bool) {
        self.counters.decrement_connection(backend_id, success);
    }

    pub fn active_connections(&self, backend_id: &str) -> u64 {
        self.counters.active_connections(backend_id)
    }

    pub fn connection_stats(&self, backend_id: &str) -> ConnectionStats {
        self.counters.connection_stats(backend_id)
    }

    pub fn all_connection_stats(&self) -> Vec<ConnectionStats> {
        self.counters.all_connection_stats()
    }

    pub fn reset_stats(&self, backend_id: Option<&str>) {
        self.counters.reset_stats(backend_id);
    }
}

#[cfg(test)]
mod tests {
    use super::weighted::pick_weighted;
    use super::*;

    fn backend(id: &str, weight: f64) -> Backend {
        Backend {
            id: id.to_string(),
            url: format!("http://{}.internal:8080", id).parse().unwrap(),
            weight,
            health_check_path: None,
            healthy: true,
            last_health_check: None,
        }
    }

    #[test]
    fn test_pick_weighted_walks_weights() {
        let a = backend("a", 1.0);
        let b = backend("b", 3.0);
        let backends = vec![&a, &b];

        assert_eq!(pick_weighted(&backends, 0.5).unwrap().id, "a");
        assert_eq!(pick_weighted(&backends, 1.0).unwrap().id, "a");
        assert_eq!(pick_weighted(&backends, 1.5).unwrap().id, "b");
        assert_eq!(pick_weighted(&backends, 3.9).unwrap().id, "b");
    }

    #[test]
    fn test_weighted_with_zero_total_picks_first() {
        let counters = LocalCounters::new();
        let a = backend("a", 0.0);
        let b = backend("b", 0.0);

        let picked = WeightedBalancer.select(&[&a, &b], "r", &counters).unwrap();
        assert_eq!(picked.id, "a");
    }

    #[test]
    fn test_least_connections_breaks_ties_in_order() {
        let counters = LocalCounters::new();
        let a = backend("a", 1.0);
        let b = backend("b", 1.0);
        let c = backend("c", 1.0);

        let picked = LeastConnectionsBalancer
            .select(&[&a, &b, &c], "r", &counters)
            .unwrap();
        assert_eq!(picked.id, "a");

        counters.increment_connection("a");
        let picked = LeastConnectionsBalancer
            .select(&[&a, &b, &c], "r", &counters)
            .unwrap();
        assert_eq!(picked.id, "b");
    }

    #[test]
    fn test_no_healthy_backend() {
        let lb = LoadBalancer::new(Arc::new(LocalCounters::new()));
        let mut a = backend("a", 1.0);
        a.healthy = false;

        assert!(lb.select(&[a], LoadBalancerPolicy::Random, "r").is_none());
        assert!(lb.select(&[], LoadBalancerPolicy::RoundRobin, "r").is_none());
    }
}
