// src/health/checker.rs
use crate::config::HealthCheckConfig;
use crate::metrics::MetricsCollector;
use crate::model::{now_millis, Backend};
use crate::store::RouteStore;
use anyhow::Result;
use dashmap::DashMap;
use reqwest::{redirect, Client};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::time::{interval, timeout};
use tracing::{debug, error, info, warn};

/// Tracks backend liveness lazily: a backend is probed only once its last
/// check is older than the configured interval, however many requests
/// arrive in between.
pub struct HealthTracker {
    config: HealthCheckConfig,
    client: Client,
    statuses: DashMap<String, BackendHealth>,
    metrics: Option<Arc<MetricsCollector>>,
    shutdown_tx: tokio::sync::watch::Sender<bool>,
    shutdown_rx: tokio::sync::watch::Receiver<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResult {
    pub backend_id: String,
    pub healthy: bool,
    pub latency_ms: u64,
    pub error: Option<String>,
    /// Epoch milliseconds.
    pub checked_at: i64,
}

/// Last known health of one backend.
#[derive(Debug, Clone, Serialize)]
pub struct BackendHealth {
    pub backend_id: String,
    pub url: String,
    pub healthy: bool,
    pub last_check: i64,
    pub latency_ms: u64,
    pub error: Option<String>,
}

impl HealthTracker {
    pub fn new(
        config: HealthCheckConfig,
        metrics: Option<Arc<MetricsCollector>>,
    ) -> Result<Self> {
        // 3xx counts as healthy, so redirects are reported, not followed.
        let client = Client::builder()
            .timeout(config.timeout())
            .redirect(redirect::Policy::none())
            .build()?;

        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

        Ok(Self {
            config,
            client,
            statuses: DashMap::new(),
            metrics,
            shutdown_tx,
            shutdown_rx,
        })
    }

    /// True when `backend` has never been checked or its last check is at
    /// least one interval old.
    pub fn needs_refresh(&self, backend: &Backend, now: i64) -> bool {
        match backend.last_health_check {
            None => true,
            Some(last) => now.saturating_sub(last) >= self.config.interval().as_millis() as i64,
        }
    }

    /// Probe one backend with a GET on its health path.
    pub async fn check(&self, backend: &Backend) -> HealthCheckResult {
        let start = std::time::Instant::now();
        let path = backend
            .health_check_path
            .as_deref()
            .unwrap_or(self.config.path.as_str());
        let url = format!("{}{}", backend.url.as_str().trim_end_matches('/'), path);

        let result = timeout(self.config.timeout(), self.client.get(&url).send()).await;
        let latency_ms = start.elapsed().as_millis() as u64;

        let (healthy, error) = match result {
            Ok(Ok(response)) => {
                let status = response.status();
                if status.is_success() || status.is_redirection() {
                    (true, None)
                } else {
                    (false, Some(format!("HTTP {}", status)))
                }
            }
            Ok(Err(e)) => (false, Some(e.to_string())),
            Err(_) => (false, Some("Request timeout".to_string())),
        };

        HealthCheckResult {
            backend_id: backend.id.clone(),
            healthy,
            latency_ms,
            error,
            checked_at: now_millis(),
        }
    }

    /// Merge known health into `backends`, probe only the stale ones, and
    /// return the updated list. Fresh backends come back untouched.
    pub async fn refresh_stale_only(&self, backends: &[Backend]) -> Vec<Backend> {
        let mut merged: Vec<Backend> = backends.iter().map(|b| self.with_known_health(b)).collect();

        let now = now_millis();
        let stale: Vec<usize> = merged
            .iter()
            .enumerate()
            .filter(|(_, b)| self.needs_refresh(b, now))
            .map(|(i, _)| i)
            .collect();

        if stale.is_empty() {
            return merged;
        }

        let checks = stale.iter().map(|&i| self.check(&merged[i]));
        let results = futures::future::join_all(checks).await;

        for (i, result) in stale.into_iter().zip(results) {
            let backend = &mut merged[i];
            self.record(backend, &result);
            backend.healthy = result.healthy;
            backend.last_health_check = Some(result.checked_at);
        }

        merged
    }

    /// Snapshot of every backend this tracker has probed.
    pub fn statuses(&self) -> Vec<BackendHealth> {
        let mut statuses: Vec<BackendHealth> =
            self.statuses.iter().map(|e| e.value().clone()).collect();
        statuses.sort_by(|a, b| a.backend_id.cmp(&b.backend_id));
        statuses
    }

    /// Background refresh of every enabled route's backends, for deployments
    /// that want probes to run ahead of traffic.
    pub async fn start(self: Arc<Self>, routes: Arc<dyn RouteStore>) {
        let mut interval = interval(self.config.interval());
        let mut shutdown_rx = self.shutdown_rx.clone();

        info!(
            "Starting health checker with interval: {:?}",
            self.config.interval()
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.refresh_all(routes.as_ref()).await;
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Health checker shutting down");
                        break;
                    }
                }
            }
        }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    async fn refresh_all(&self, routes: &dyn RouteStore) {
        let routes = match routes.list("").await {
            Ok(routes) => routes,
            Err(e) => {
                error!("Health check could not list routes: {}", e);
                return;
            }
        };

        let mut seen = HashSet::new();
        let backends: Vec<Backend> = routes
            .into_iter()
            .filter(|r| r.enabled)
            .flat_map(|r| r.backends)
            .filter(|b| seen.insert(b.id.clone()))
            .collect();

        let refreshed = self.refresh_stale_only(&backends).await;
        let healthy = healthy_count(&refreshed);
        debug!(
            "Health check complete: {}/{} healthy ({:.0}%)",
            healthy,
            refreshed.len(),
            healthy_percentage(&refreshed)
        );
    }

    fn with_known_health(&self, backend: &Backend) -> Backend {
        let mut backend = backend.clone();
        if let Some(known) = self.statuses.get(&backend.id) {
            if backend.last_health_check.map_or(true, |t| known.last_check > t) {
                backend.healthy = known.healthy;
                backend.last_health_check = Some(known.last_check);
            }
        }
        backend
    }

    fn record(&self, backend: &Backend, result: &HealthCheckResult) {
        let was_healthy = self
            .statuses
            .get(&backend.id)
            .map(|s| s.healthy)
            .unwrap_or(backend.healthy);

        if result.healthy && !was_healthy {
            info!("Backend {} is now healthy", backend.id);
        } else if !result.healthy && was_healthy {
            warn!(
                "Backend {} is now unhealthy: {}",
                backend.id,
                result.error.as_deref().unwrap_or("unknown error")
            );
        }

        self.statuses.insert(
            backend.id.clone(),
            BackendHealth {
                backend_id: backend.id.clone(),
                url: backend.url.to_string(),
                healthy: result.healthy,
                last_check: result.checked_at,
                latency_ms: result.latency_ms,
                error: result.error.clone(),
            },
        );

        if let Some(metrics) = &self.metrics {
            metrics.update_backend_health(&backend.id, result.healthy);
        }
    }
}

pub fn healthy_count(backends: &[Backend]) -> usize {
    backends.iter().filter(|b| b.healthy).count()
}

pub fn healthy_percentage(backends: &[Backend]) -> f64 {
    if backends.is_empty() {
        return 0.0;
    }
    healthy_count(backends) as f64 / backends.len() as f64 * 100.0
}
