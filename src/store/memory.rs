// src/store/memory.rs
use super::{RouteStore, StateStore, StoreError};
use crate::model::Route;
use arc_swap::ArcSwap;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// In-process `StateStore`. Expired entries are dropped when read and by
/// `purge_expired`, which the sweeper task calls periodically.
pub struct MemoryStore<V> {
    entries: DashMap<String, Entry<V>>,
}

impl<V> MemoryStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Remove every expired entry, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    pub fn spawn_sweeper(
        self: Arc<Self>,
        every: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let purged = self.purge_expired();
                        if purged > 0 {
                            debug!("Purged {} expired state entries", purged);
                        }
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        })
    }
}

impl<V> Default for MemoryStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<V> StateStore<V> for MemoryStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Result<Option<V>, StoreError> {
        let expired = match self.entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                return Ok(Some(entry.value.clone()));
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            self.entries
                .remove_if(key, |_, entry| entry.expires_at <= Instant::now());
        }
        Ok(None)
    }

    async fn put(&self, key: &str, value: V, ttl: Duration) -> Result<(), StoreError> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }
}

/// Route table held as an immutable snapshot that writers swap wholesale,
/// so request-path readers never block. Iteration order is insertion order.
pub struct MemoryRouteStore {
    routes: ArcSwap<Vec<Route>>,
}

impl MemoryRouteStore {
    pub fn new(routes: Vec<Route>) -> Self {
        Self {
            routes: ArcSwap::from_pointee(routes),
        }
    }
}

#[async_trait]
impl RouteStore for MemoryRouteStore {
    async fn get(&self, id: &str) -> Result<Option<Route>, StoreError> {
        Ok(self.routes.load().iter().find(|r| r.id == id).cloned())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<Route>, StoreError> {
        Ok(self
            .routes
            .load()
            .iter()
            .filter(|r| r.id.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn put(&self, id: &str, route: Route) -> Result<(), StoreError> {
        self.routes.rcu(|current| {
            let mut next = (**current).clone();
            match next.iter_mut().find(|r| r.id == id) {
                Some(slot) => *slot = route.clone(),
                None => next.push(route.clone()),
            }
            next
        });
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let previous = self.routes.rcu(|current| {
            current
                .iter()
                .filter(|r| r.id != id)
                .cloned()
                .collect::<Vec<_>>()
        });
        Ok(previous.iter().any(|r| r.id == id))
    }
}
