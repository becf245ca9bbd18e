// src/load_balancer/random.rs
use super::{Algorithm, Counters};
use crate::model::Backend;
use rand::Rng;

pub struct RandomBalancer;

impl Algorithm for RandomBalancer {
    fn select<'a>(
        &self,
        backends: &[&'a Backend],
        _route_id: &str,
        _counters: &dyn Counters,
    ) -> Option<&'a Backend> {
        if backends.is_empty() {
            return None;
        }
        let index = rand::thread_rng().gen_range(0..backends.len());
        Some(backends[index])
    }

    fn name(&self) -> &'static str {
        "random"
    }
}
