// src/lib.rs
pub mod circuit_breaker;
pub mod config;
pub mod health;
pub mod load_balancer;
pub mod metrics;
pub mod model;
pub mod proxy;
pub mod rate_limit;
pub mod retry;
pub mod router;
pub mod server;
pub mod store;
