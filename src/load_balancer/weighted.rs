// src/load_balancer/weighted.rs
use super::{Algorithm, Counters};
use crate::model::Backend;
use rand::Rng;

pub struct WeightedBalancer;

/// Walk the backends subtracting weights from `draw` until it reaches zero.
/// `draw` is expected in `[0, total_weight)`.
pub(crate) fn pick_weighted<'a>(backends: &[&'a Backend], mut draw: f64) -> Option<&'a Backend> {
    for backend in backends {
        draw -= backend.weight;
        if draw <= 0.0 {
            return Some(*backend);
        }
    }
    backends.last().copied()
}

impl Algorithm for WeightedBalancer {
    fn select<'a>(
        &self,
        backends: &[&'a Backend],
        _route_id: &str,
        _counters: &dyn Counters,
    ) -> Option<&'a Backend> {
        let total: f64 = backends.iter().map(|b| b.weight).sum();
        if total <= 0.0 {
            return backends.first().copied();
        }

        let draw = rand::thread_rng().gen_range(0.0..total);
        pick_weighted(backends, draw)
    }

    fn name(&self) -> &'static str {
        "weighted"
    }
}
