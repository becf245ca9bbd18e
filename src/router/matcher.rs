// src/router/matcher.rs
use super::PathPattern;
use crate::model::Route;
use crate::store::{RouteStore, StoreError};
use dashmap::DashMap;
use regex::Regex;
use std::sync::Arc;
use tracing::warn;

/// Resolves requests against the routes held in a `RouteStore`.
///
/// Routes are tried in store order and the first enabled route whose method
/// set and path pattern both match wins; there is no specificity ranking.
pub struct RouteMatcher {
    store: Arc<dyn RouteStore>,
    patterns: DashMap<String, Option<Arc<PathPattern>>>,
    rewrites: DashMap<String, Option<Arc<Regex>>>,
}

impl RouteMatcher {
    pub fn new(store: Arc<dyn RouteStore>) -> Self {
        Self {
            store,
            patterns: DashMap::new(),
            rewrites: DashMap::new(),
        }
    }

    pub async fn match_route(&self, path: &str, method: &str) -> Result<Option<Route>, StoreError> {
        let routes = self.store.list("").await?;

        for route in routes {
            if !route.enabled || !route.allows_method(method) {
                continue;
            }

            let matched = self
                .pattern(&route.path)
                .map(|pattern| pattern.matches(path))
                .unwrap_or(false);

            if matched {
                return Ok(Some(route));
            }
        }

        Ok(None)
    }

    /// Apply the route's rewrite rule to the first match in `path`.
    pub fn rewrite_path(&self, path: &str, route: &Route) -> String {
        let Some(rule) = &route.rewrite else {
            return path.to_string();
        };

        let regex = self
            .rewrites
            .entry(rule.from.clone())
            .or_insert_with(|| match Regex::new(&rule.from) {
                Ok(regex) => Some(Arc::new(regex)),
                Err(e) => {
                    warn!("Route {} has an invalid rewrite pattern: {}", route.id, e);
                    None
                }
            })
            .clone();

        match regex {
            Some(regex) => regex.replace(path, rule.to.as_str()).into_owned(),
            None => path.to_string(),
        }
    }

    fn pattern(&self, raw: &str) -> Option<Arc<PathPattern>> {
        self.patterns
            .entry(raw.to_string())
            .or_insert_with(|| match PathPattern::compile(raw) {
                Ok(pattern) => Some(Arc::new(pattern)),
                Err(e) => {
                    warn!("Skipping route pattern '{}': {}", raw, e);
                    None
                }
            })
            .clone()
    }
}
