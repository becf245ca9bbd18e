// src/rate_limit/limiter.rs
use crate::model::RateLimitConfig;
use crate::store::{StateStore, StoreError};
use hyper::header::{HeaderMap, HeaderValue, RETRY_AFTER};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_KEY_PREFIX: &str = "ratelimit";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitWindow {
    pub count: u64,
    /// Epoch milliseconds at which the window closes.
    pub reset_at: i64,
}

/// Remaining allowance after an admitted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quota {
    pub limit: u64,
    pub remaining: u64,
    pub reset_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub limit: u64,
    pub window_ms: u64,
    pub reset_at: i64,
    pub retry_after_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed(Quota),
    Denied(Rejection),
}

impl Quota {
    pub fn apply_headers(&self, headers: &mut HeaderMap) {
        headers.insert("x-ratelimit-limit", HeaderValue::from(self.limit));
        headers.insert("x-ratelimit-remaining", HeaderValue::from(self.remaining));
        headers.insert("x-ratelimit-reset", HeaderValue::from(self.reset_at));
    }
}

impl Rejection {
    pub fn apply_headers(&self, headers: &mut HeaderMap) {
        headers.insert("x-ratelimit-limit", HeaderValue::from(self.limit));
        headers.insert("x-ratelimit-remaining", HeaderValue::from(0u64));
        headers.insert("x-ratelimit-reset", HeaderValue::from(self.reset_at));
        headers.insert(RETRY_AFTER, HeaderValue::from(self.retry_after_secs));
    }
}

/// Fixed-window request quota per (identifier, route).
///
/// The count is read and then written back without an atomic increment, so
/// requests racing at the boundary of a window can all be admitted and push
/// the window slightly past `max_requests`.
pub struct RateLimiter {
    store: Arc<dyn StateStore<RateLimitWindow>>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn StateStore<RateLimitWindow>>) -> Self {
        Self { store }
    }

    pub async fn check(
        &self,
        identifier: &str,
        route_id: &str,
        config: &RateLimitConfig,
        now: i64,
    ) -> Result<RateLimitDecision, StoreError> {
        let window_ms = config.window_ms.max(1) as i64;
        let window_start = now.div_euclid(window_ms) * window_ms;
        let reset_at = window_start + window_ms;
        let key = window_key(config, identifier, route_id, window_start);

        let count = self
            .store
            .get(&key)
            .await?
            .map(|window| window.count)
            .unwrap_or(0);

        let until_reset_ms = (reset_at - now).max(0) as u64;
        let until_reset_secs = (until_reset_ms + 999) / 1000;

        if count >= config.max_requests {
            return Ok(RateLimitDecision::Denied(Rejection {
                limit: config.max_requests,
                window_ms: config.window_ms,
                reset_at,
                retry_after_secs: until_reset_secs,
            }));
        }

        let window = RateLimitWindow {
            count: count + 1,
            reset_at,
        };
        let ttl = Duration::from_secs(until_reset_secs.max(1));
        self.store.put(&key, window, ttl).await?;

        Ok(RateLimitDecision::Allowed(Quota {
            limit: config.max_requests,
            remaining: config.max_requests.saturating_sub(window.count),
            reset_at,
        }))
    }
}

fn window_key(
    config: &RateLimitConfig,
    identifier: &str,
    route_id: &str,
    window_start: i64,
) -> String {
    let prefix = config.key_prefix.as_deref().unwrap_or(DEFAULT_KEY_PREFIX);
    format!("{}:{}:{}:{}", prefix, identifier, route_id, window_start)
}
