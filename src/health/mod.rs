// src/health/mod.rs
mod checker;

pub use checker::{healthy_count, healthy_percentage, BackendHealth, HealthCheckResult, HealthTracker};
