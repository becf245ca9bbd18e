// src/metrics/collector.rs
use crate::circuit_breaker::CircuitBreakerState;
use anyhow::Result;
use prometheus::core::Collector;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;
use std::time::Duration;

pub struct MetricsRegistry {
    registry: Registry,
    collector: Arc<MetricsCollector>,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let collector = Arc::new(MetricsCollector::new(&registry)?);

        Ok(Self {
            registry,
            collector,
        })
    }

    pub fn collector(&self) -> Arc<MetricsCollector> {
        self.collector.clone()
    }

    pub fn gather(&self) -> Result<Vec<u8>> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(buffer)
    }
}

pub struct MetricsCollector {
    // Request metrics
    pub requests_total: IntCounterVec,
    pub request_duration_seconds: HistogramVec,

    // Backend metrics
    pub backend_attempts_total: IntCounterVec,
    pub backend_connections_active: IntGaugeVec,
    pub backend_health_status: IntGaugeVec,

    // Resilience metrics
    pub circuit_breaker_state: IntGaugeVec,
    pub rate_limited_total: IntCounterVec,
}

/// Register `metric` and hand back a clone for recording.
fn registered<M>(registry: &Registry, metric: M) -> Result<M>
where
    M: Collector + Clone + 'static,
{
    registry.register(Box::new(metric.clone()))?;
    Ok(metric)
}

impl MetricsCollector {
    pub fn new(registry: &Registry) -> Result<Self> {
        Ok(Self {
            requests_total: registered(
                registry,
                IntCounterVec::new(
                    Opts::new("gateway_requests_total", "Total number of requests"),
                    &["method", "status_code", "route"],
                )?,
            )?,
            request_duration_seconds: registered(
                registry,
                HistogramVec::new(
                    HistogramOpts::new(
                        "gateway_request_duration_seconds",
                        "Request duration in seconds",
                    ),
                    &["method", "route"],
                )?,
            )?,
            backend_attempts_total: registered(
                registry,
                IntCounterVec::new(
                    Opts::new(
                        "gateway_backend_attempts_total",
                        "Forwarding attempts per backend by transport outcome",
                    ),
                    &["backend", "outcome"],
                )?,
            )?,
            backend_connections_active: registered(
                registry,
                IntGaugeVec::new(
                    Opts::new(
                        "gateway_backend_connections_active",
                        "In-flight requests per backend",
                    ),
                    &["backend"],
                )?,
            )?,
            backend_health_status: registered(
                registry,
                IntGaugeVec::new(
                    Opts::new(
                        "gateway_backend_health_status",
                        "Last probe result per backend (1=healthy, 0=unhealthy)",
                    ),
                    &["backend"],
                )?,
            )?,
            circuit_breaker_state: registered(
                registry,
                IntGaugeVec::new(
                    Opts::new(
                        "gateway_circuit_breaker_state",
                        "Circuit breaker state per route (0=closed, 1=open, 2=half-open)",
                    ),
                    &["route"],
                )?,
            )?,
            rate_limited_total: registered(
                registry,
                IntCounterVec::new(
                    Opts::new(
                        "gateway_rate_limited_total",
                        "Requests rejected by the rate limiter",
                    ),
                    &["route"],
                )?,
            )?,
        })
    }

    pub fn record_request(&self, method: &str, status_code: u16, route: &str, duration: Duration) {
        self.requests_total
            .with_label_values(&[method, &status_code.to_string(), route])
            .inc();

        self.request_duration_seconds
            .with_label_values(&[method, route])
            .observe(duration.as_secs_f64());
    }

    pub fn record_backend_attempt(&self, backend: &str, success: bool) {
        let outcome = if success { "success" } else { "failure" };
        self.backend_attempts_total
            .with_label_values(&[backend, outcome])
            .inc();
    }

    pub fn update_backend_connections(&self, backend: &str, count: u64) {
        self.backend_connections_active
            .with_label_values(&[backend])
            .set(count as i64);
    }

    pub fn update_backend_health(&self, backend: &str, healthy: bool) {
        self.backend_health_status
            .with_label_values(&[backend])
            .set(i64::from(healthy));
    }

    pub fn update_circuit_breaker_state(&self, route: &str, state: CircuitBreakerState) {
        let value = match state {
            CircuitBreakerState::Closed => 0,
            CircuitBreakerState::Open => 1,
            CircuitBreakerState::HalfOpen => 2,
        };

        self.circuit_breaker_state
            .with_label_values(&[route])
            .set(value);
    }

    pub fn record_rate_limited(&self, route: &str) {
        self.rate_limited_total.with_label_values(&[route]).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_exposes_recorded_series() {
        let registry = MetricsRegistry::new().unwrap();
        let metrics = registry.collector();

        metrics.record_request("GET", 200, "users", Duration::from_millis(12));
        metrics.update_circuit_breaker_state("users", CircuitBreakerState::Open);
        metrics.record_rate_limited("users");

        let text = String::from_utf8(registry.gather().unwrap()).unwrap();
        assert!(text.contains("gateway_requests_total"));
        assert!(text.contains("gateway_circuit_breaker_state{route=\"users\"} 1"));
        assert!(text.contains("gateway_rate_limited_total{route=\"users\"} 1"));
    }
}
