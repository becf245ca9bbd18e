// src/load_balancer/least_connections.rs
use super::{Algorithm, Counters};
use crate::model::Backend;

/// Picks the backend with the fewest in-flight requests; the first one wins
/// a tie.
pub struct LeastConnectionsBalancer;

impl Algorithm for LeastConnectionsBalancer {
    fn select<'a>(
        &self,
        backends: &[&'a Backend],
        _route_id: &str,
        counters: &dyn Counters,
    ) -> Option<&'a Backend> {
        let mut selected: Option<(&'a Backend, u64)> = None;

        for backend in backends {
            let active = counters.active_connections(&backend.id);
            match selected {
                Some((_, min)) if active >= min => {}
                _ => selected = Some((*backend, active)),
            }
        }

        selected.map(|(backend, _)| backend)
    }

    fn name(&self) -> &'static str {
        "least_connections"
    }
}
