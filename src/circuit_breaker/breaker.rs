// src/circuit_breaker/breaker.rs

use super::record::{evaluate, CircuitBreakerRecord, CircuitBreakerState};
use crate::metrics::MetricsCollector;
use crate::model::CircuitBreakerConfig;
use crate::store::{StateStore, StoreError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Per-route circuit breakers persisted in a `StateStore`.
///
/// Every call is an independent read-modify-write on the stored record, so
/// concurrent requests can overwrite each other's counts. The breaker may
/// therefore open a few requests later than the exact threshold.
pub struct CircuitBreaker {
    store: Arc<dyn StateStore<CircuitBreakerRecord>>,
    ttl: Duration,
    metrics: Option<Arc<MetricsCollector>>,
}

impl CircuitBreaker {
    pub fn new(
        store: Arc<dyn StateStore<CircuitBreakerRecord>>,
        ttl: Duration,
        metrics: Option<Arc<MetricsCollector>>,
    ) -> Self {
        Self {
            store,
            ttl,
            metrics,
        }
    }

    /// Current state of `id`, promoting an expired open breaker to half-open.
    pub async fn get_state(&self, id: &str, now: i64) -> Result<CircuitBreakerState, StoreError> {
        let record = self.load(id).await?;
        let evaluated = evaluate(record.clone(), now);

        if evaluated != record {
            self.save(id, &evaluated).await?;
            self.transitioned(id, record.state, evaluated.state);
        }
        Ok(evaluated.state)
    }

    pub async fn call_permitted(&self, id: &str, now: i64) -> Result<bool, StoreError> {
        Ok(self.get_state(id, now).await? != CircuitBreakerState::Open)
    }

    pub async fn record_success(
        &self,
        id: &str,
        config: &CircuitBreakerConfig,
    ) -> Result<CircuitBreakerState, StoreError> {
        let record = self.load(id).await?;
        let next = record.clone().on_success(config);
        self.commit(id, record, next).await
    }

    pub async fn record_failure(
        &self,
        id: &str,
        config: &CircuitBreakerConfig,
        now: i64,
    ) -> Result<CircuitBreakerState, StoreError> {
        let record = self.load(id).await?;
        let next = record.clone().on_failure(config, now);
        self.commit(id, record, next).await
    }

    /// Force the breaker closed with zeroed counters.
    pub async fn reset(&self, id: &str) -> Result<CircuitBreakerRecord, StoreError> {
        let record = CircuitBreakerRecord::closed();
        self.save(id, &record).await?;
        if let Some(metrics) = &self.metrics {
            metrics.update_circuit_breaker_state(id, CircuitBreakerState::Closed);
        }
        info!("Circuit breaker for {} reset", id);
        Ok(record)
    }

    /// The raw stored record, without applying time-based transitions.
    pub async fn get_stats(&self, id: &str) -> Result<CircuitBreakerRecord, StoreError> {
        self.load(id).await
    }

    async fn commit(
        &self,
        id: &str,
        before: CircuitBreakerRecord,
        after: CircuitBreakerRecord,
    ) -> Result<CircuitBreakerState, StoreError> {
        if after != before {
            self.save(id, &after).await?;
            if after.state != before.state {
                self.transitioned(id, before.state, after.state);
            }
        }
        Ok(after.state)
    }

    async fn load(&self, id: &str) -> Result<CircuitBreakerRecord, StoreError> {
        Ok(self
            .store
            .get(&key(id))
            .await?
            .unwrap_or_else(CircuitBreakerRecord::closed))
    }

    async fn save(&self, id: &str, record: &CircuitBreakerRecord) -> Result<(), StoreError> {
        self.store.put(&key(id), record.clone(), self.ttl).await
    }

    fn transitioned(&self, id: &str, from: CircuitBreakerState, to: CircuitBreakerState) {
        match to {
            CircuitBreakerState::Open => {
                warn!("Circuit breaker for {} opened (was {:?})", id, from)
            }
            CircuitBreakerState::HalfOpen => {
                info!("Circuit breaker for {} transitioned to half-open", id)
            }
            CircuitBreakerState::Closed => {
                info!("Circuit breaker for {} closed after successful recovery", id)
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.update_circuit_breaker_state(id, to);
        }
    }
}

fn key(id: &str) -> String {
    format!("circuit:{}", id)
}
