// src/model/route.rs
use crate::router::PathPattern;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Backend selection policy for a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalancerPolicy {
    #[default]
    RoundRobin,
    Weighted,
    Random,
    LeastConnections,
}

/// A rule mapping inbound path/method pairs onto a set of backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub id: String,
    /// Path pattern, `*` matches one segment and `**` any number of them.
    pub path: String,
    pub methods: Vec<String>,
    pub backends: Vec<Backend>,
    #[serde(default)]
    pub load_balancer: LoadBalancerPolicy,
    #[serde(default)]
    pub rate_limit: Option<RateLimitConfig>,
    #[serde(default)]
    pub circuit_breaker: Option<CircuitBreakerConfig>,
    /// Upstream timeout in milliseconds. Absent or zero uses the proxy default.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub retries: u32,
    #[serde(default)]
    pub rewrite: Option<RewriteRule>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Backend {
    pub id: String,
    pub url: Url,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub health_check_path: Option<String>,
    #[serde(default = "default_healthy")]
    pub healthy: bool,
    /// Epoch milliseconds of the last completed health check.
    #[serde(default)]
    pub last_health_check: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub window_ms: u64,
    pub max_requests: u64,
    #[serde(default)]
    pub key_prefix: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Failure rate in (0, 1] at which a closed breaker opens.
    pub failure_threshold: f64,
    /// Successes needed in half-open before closing again.
    pub success_threshold: u32,
    /// How long the breaker stays open, in milliseconds.
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewriteRule {
    pub from: String,
    pub to: String,
}

#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("route '{id}' is invalid: {}", .errors.join("; "))]
    Invalid { id: String, errors: Vec<String> },

    #[error("duplicate route id '{0}'")]
    DuplicateId(String),
}

fn default_enabled() -> bool {
    true
}

fn default_healthy() -> bool {
    true
}

fn default_weight() -> f64 {
    1.0
}

impl Route {
    pub fn allows_method(&self, method: &str) -> bool {
        self.methods
            .iter()
            .any(|m| m == "*" || m.eq_ignore_ascii_case(method))
    }

    pub fn timeout(&self, default: Duration) -> Duration {
        match self.timeout_ms {
            Some(ms) if ms > 0 => Duration::from_millis(ms),
            _ => default,
        }
    }

    pub fn validate(&self) -> Result<(), RouteError> {
        let mut errors = Vec::new();

        if self.id.is_empty() {
            errors.push("id must not be empty".to_string());
        }

        if self.path.is_empty() {
            errors.push("path must not be empty".to_string());
        } else if let Err(e) = PathPattern::compile(&self.path) {
            errors.push(format!("invalid path pattern: {}", e));
        }

        if self.methods.is_empty() {
            errors.push("at least one HTTP method is required".to_string());
        }

        if self.enabled && self.backends.is_empty() {
            errors.push("an enabled route needs at least one backend".to_string());
        }

        for backend in &self.backends {
            if !backend.weight.is_finite() || backend.weight < 0.0 {
                errors.push(format!(
                    "backend {} has a negative or non-finite weight",
                    backend.id
                ));
            }
        }

        if let Some(limit) = &self.rate_limit {
            if limit.window_ms == 0 || limit.max_requests == 0 {
                errors.push("rate limit window and max requests must be positive".to_string());
            }
        }

        if let Some(breaker) = &self.circuit_breaker {
            if !(breaker.failure_threshold > 0.0 && breaker.failure_threshold <= 1.0) {
                errors.push("circuit breaker failure threshold must be in (0, 1]".to_string());
            }
            if breaker.success_threshold == 0 {
                errors.push("circuit breaker success threshold must be at least 1".to_string());
            }
        }

        if let Some(rewrite) = &self.rewrite {
            if let Err(e) = Regex::new(&rewrite.from) {
                errors.push(format!("invalid rewrite pattern: {}", e));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(RouteError::Invalid {
                id: self.id.clone(),
                errors,
            })
        }
    }
}
