// src/store/mod.rs
//
// Storage seams for state that outlives a single request: route definitions,
// circuit breaker records and rate-limit windows.
mod memory;

pub use memory::{MemoryRouteStore, MemoryStore};

use crate::model::Route;
use async_trait::async_trait;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store backend unavailable: {0}")]
    Unavailable(String),
}

/// Read access to route definitions. Writes belong to the route admin API;
/// they are part of the trait so alternative stores can be seeded.
#[async_trait]
pub trait RouteStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<Route>, StoreError>;

    /// Routes whose id starts with `prefix`, in the store's iteration order.
    async fn list(&self, prefix: &str) -> Result<Vec<Route>, StoreError>;

    async fn put(&self, id: &str, route: Route) -> Result<(), StoreError>;

    async fn delete(&self, id: &str) -> Result<bool, StoreError>;
}

/// Key/value store with per-entry expiry.
///
/// Reads and writes are independent; there is no compare-and-swap, so two
/// writers racing on the same key may lose an update.
#[async_trait]
pub trait StateStore<V>: Send + Sync
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Result<Option<V>, StoreError>;

    async fn put(&self, key: &str, value: V, ttl: Duration) -> Result<(), StoreError>;
}
