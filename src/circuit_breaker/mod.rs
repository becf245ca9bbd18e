// src/circuit_breaker/mod.rs
mod breaker;
mod record;

pub use breaker::CircuitBreaker;
pub use record::{evaluate, CircuitBreakerRecord, CircuitBreakerState};
