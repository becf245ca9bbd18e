// src/load_balancer/round_robin.rs
use super::{Algorithm, Counters};
use crate::model::Backend;

/// Cycles through backends using a per-route counter.
///
/// The counter is never rewound when the backend set changes size, so the
/// position simply continues modulo the new length.
pub struct RoundRobinBalancer;

impl Algorithm for RoundRobinBalancer {
    fn select<'a>(
        &self,
        backends: &[&'a Backend],
        route_id: &str,
        counters: &dyn Counters,
    ) -> Option<&'a Backend> {
        if backends.is_empty() {
            return None;
        }

        let index = counters.next_round_robin(route_id) % backends.len() as u64;
        Some(backends[index as usize])
    }

    fn name(&self) -> &'static str {
        "round_robin"
    }
}
