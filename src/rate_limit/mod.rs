// src/rate_limit/mod.rs
mod limiter;

pub use limiter::{Quota, RateLimitDecision, RateLimitWindow, RateLimiter, Rejection};
