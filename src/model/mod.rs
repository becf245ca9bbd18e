// src/model/mod.rs
mod route;

pub use route::{
    Backend, CircuitBreakerConfig, LoadBalancerPolicy, RateLimitConfig, RewriteRule, Route,
    RouteError,
};

/// Wall-clock time in epoch milliseconds, the unit every persisted timestamp uses.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
