// src/load_balancer/algorithm.rs
use super::Counters;
use crate::model::Backend;

/// One backend selection policy. Callers pass only healthy backends, and
/// never an empty slice.
pub trait Algorithm: Send + Sync {
    fn select<'a>(
        &self,
        backends: &[&'a Backend],
        route_id: &str,
        counters: &dyn Counters,
    ) -> Option<&'a Backend>;

    fn name(&self) -> &'static str;
}
