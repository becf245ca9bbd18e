// src/config/mod.rs
mod models;

pub use models::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a file (YAML or JSON)
pub async fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config file {}", path.display()))?;

    let config = parse_config(&contents, is_yaml(path))?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

pub fn parse_config(contents: &str, yaml: bool) -> Result<Config> {
    let config: Config = if yaml {
        serde_yaml::from_str(contents).context("Failed to parse YAML config")?
    } else {
        serde_json::from_str(contents).context("Failed to parse JSON config")?
    };
    Ok(config)
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|s| s.to_str()),
        Some("yaml") | Some("yml")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
server:
  listen: 0.0.0.0:8000
health_check:
  interval_secs: 10
routes:
  - id: users
    path: /api/users/**
    methods: ["*"]
    load_balancer: least_connections
    retries: 2
    rate_limit:
      window_ms: 60000
      max_requests: 100
    circuit_breaker:
      failure_threshold: 0.5
      success_threshold: 2
      timeout_ms: 30000
    rewrite:
      from: ^/api/users
      to: /users
    backends:
      - id: users-1
        url: http://10.0.0.1:3000
        weight: 2
      - id: users-2
        url: http://10.0.0.2:3000
        health_check_path: /status
"#;

    #[test]
    fn test_parse_yaml_with_defaults() {
        let config = parse_config(YAML, true).unwrap();
        config.validate().unwrap();

        assert_eq!(config.server.listen.port(), 8000);
        assert_eq!(config.health_check.interval_secs, 10);
        assert_eq!(config.health_check.timeout_secs, 5);
        assert_eq!(config.proxy.default_timeout_ms, 30_000);
        assert_eq!(config.stores.circuit_breaker_ttl_secs, 86_400);
        assert!(config.admin.enabled);

        let route = &config.routes[0];
        assert_eq!(route.backends.len(), 2);
        assert_eq!(route.backends[0].weight, 2.0);
        assert_eq!(route.retries, 2);
    }

    #[test]
    fn test_parse_json() {
        let json = r#"{ "routes": [] , "proxy": { "proxied_by": "edge" } }"#;
        let config = parse_config(json, false).unwrap();
        assert_eq!(config.proxy.proxied_by, "edge");
        assert_eq!(config.proxy.backoff_base_ms, 100);
        assert_eq!(config.proxy.max_body_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn test_duplicate_route_ids_rejected() {
        let mut config = parse_config(YAML, true).unwrap();
        let copy = config.routes[0].clone();
        config.routes.push(copy);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retry_config_counts_first_attempt() {
        let proxy = ProxyConfig::default();
        assert_eq!(proxy.retry_config(0).max_attempts, 1);
        assert_eq!(proxy.retry_config(3).max_attempts, 4);
    }

    #[tokio::test]
    async fn test_load_config_missing_file() {
        assert!(load_config("/nonexistent/gateway.yaml").await.is_err());
    }
}
