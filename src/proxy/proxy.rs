// ────────────────────────────────
// src/proxy/proxy.rs
// Request pipeline: route, gate, pick a backend, forward with retries.
// ────────────────────────────────

use super::error::GatewayError;
use super::forward::{
    forwarded_headers, forwards_body, read_body, target_uri, ClientContext, ForwardError, Forwarder,
    UpstreamRequest, X_REQUEST_ID,
};
use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerRecord};
use crate::config::{Config, ProxyConfig};
use crate::health::HealthTracker;
use crate::load_balancer::{Counters, LoadBalancer, LocalCounters};
use crate::metrics::MetricsCollector;
use crate::model::{now_millis, Route};
use crate::rate_limit::{RateLimitDecision, RateLimitWindow, RateLimiter};
use crate::retry::RetryStrategy;
use crate::router::RouteMatcher;
use crate::server::ClientAddr;
use crate::store::{MemoryRouteStore, MemoryStore, RouteStore, StateStore};
use anyhow::Result;
use hyper::header::HOST;
use hyper::{Body, Request, Response};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const UNMATCHED_ROUTE: &str = "unmatched";

pub struct Proxy {
    matcher: RouteMatcher,
    health: Arc<HealthTracker>,
    load_balancer: LoadBalancer,
    rate_limiter: RateLimiter,
    circuit_breaker: CircuitBreaker,
    forwarder: Forwarder,
    config: ProxyConfig,
    trust_forwarded_for: bool,
    metrics: Option<Arc<MetricsCollector>>,
}

/// Wires a `Proxy` from configuration. Any store left unset falls back to
/// the in-process implementation.
pub struct ProxyBuilder {
    config: Config,
    routes: Option<Arc<dyn RouteStore>>,
    breaker_store: Option<Arc<dyn StateStore<CircuitBreakerRecord>>>,
    rate_limit_store: Option<Arc<dyn StateStore<RateLimitWindow>>>,
    counters: Option<Arc<dyn Counters>>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl ProxyBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            routes: None,
            breaker_store: None,
            rate_limit_store: None,
            counters: None,
            metrics: None,
        }
    }

    pub fn with_route_store(mut self, routes: Arc<dyn RouteStore>) -> Self {
        self.routes = Some(routes);
        self
    }

    pub fn with_circuit_breaker_store(
        mut self,
        store: Arc<dyn StateStore<CircuitBreakerRecord>>,
    ) -> Self {
        self.breaker_store = Some(store);
        self
    }

    pub fn with_rate_limit_store(mut self, store: Arc<dyn StateStore<RateLimitWindow>>) -> Self {
        self.rate_limit_store = Some(store);
        self
    }

    pub fn with_counters(mut self, counters: Arc<dyn Counters>) -> Self {
        self.counters = Some(counters);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> Result<Proxy> {
        let config = self.config;

        let routes = self
            .routes
            .unwrap_or_else(|| Arc::new(MemoryRouteStore::new(config.routes.clone())));
        let breaker_store = self
            .breaker_store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let rate_limit_store = self
            .rate_limit_store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let counters = self
            .counters
            .unwrap_or_else(|| Arc::new(LocalCounters::new()));

        let health = Arc::new(HealthTracker::new(
            config.health_check.clone(),
            self.metrics.clone(),
        )?);

        Ok(Proxy {
            matcher: RouteMatcher::new(routes),
            health,
            load_balancer: LoadBalancer::new(counters),
            rate_limiter: RateLimiter::new(rate_limit_store),
            circuit_breaker: CircuitBreaker::new(
                breaker_store,
                config.stores.circuit_breaker_ttl(),
                self.metrics.clone(),
            ),
            forwarder: Forwarder::new(&config.proxy.proxied_by),
            config: config.proxy,
            trust_forwarded_for: config.server.trust_forwarded_for,
            metrics: self.metrics,
        })
    }
}

impl Proxy {
    pub fn builder(config: Config) -> ProxyBuilder {
        ProxyBuilder::new(config)
    }

    pub fn matcher(&self) -> &RouteMatcher {
        &self.matcher
    }

    pub fn health(&self) -> &Arc<HealthTracker> {
        &self.health
    }

    pub fn load_balancer(&self) -> &LoadBalancer {
        &self.load_balancer
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.circuit_breaker
    }

    /// Proxy one inbound request. Failures become JSON error responses, so
    /// this never errors.
    pub async fn handle(&self, req: Request<Body>) -> Response<Body> {
        let start = Instant::now();
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let request_id = request_id(&req);

        let span = info_span!("request", %request_id, %method, %path);

        async move {
            let (route_id, result) = match self.matcher.match_route(&path, method.as_str()).await {
                Ok(Some(route)) => {
                    let result = self.proxy_route(req, &route, request_id).await;
                    (route.id, result)
                }
                Ok(None) => (
                    UNMATCHED_ROUTE.to_string(),
                    Err(GatewayError::RouteNotFound {
                        method: method.to_string(),
                        path: path.clone(),
                    }),
                ),
                Err(e) => (UNMATCHED_ROUTE.to_string(), Err(e.into())),
            };

            let response = match result {
                Ok(response) => response,
                Err(err) => {
                    if err.status().is_server_error() {
                        warn!("Request failed: {}", err);
                    } else {
                        debug!("Request rejected: {}", err);
                    }
                    Response::from(err)
                }
            };

            let status = response.status();
            if let Some(metrics) = &self.metrics {
                metrics.record_request(method.as_str(), status.as_u16(), &route_id, start.elapsed());
            }
            info!(
                route = %route_id,
                status = status.as_u16(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "request completed"
            );

            response
        }
        .instrument(span)
        .await
    }

    async fn proxy_route(
        &self,
        req: Request<Body>,
        route: &Route,
        request_id: String,
    ) -> Result<Response<Body>, GatewayError> {
        let now = now_millis();

        if route.circuit_breaker.is_some()
            && !self.circuit_breaker.call_permitted(&route.id, now).await?
        {
            return Err(GatewayError::CircuitOpen(route.id.clone()));
        }

        let client = self.client_context(&req, request_id);

        let quota = match &route.rate_limit {
            Some(limit) => {
                let identifier = format!("ip:{}", client.ip);
                match self
                    .rate_limiter
                    .check(&identifier, &route.id, limit, now)
                    .await?
                {
                    RateLimitDecision::Allowed(quota) => Some(quota),
                    RateLimitDecision::Denied(rejection) => {
                        if let Some(metrics) = &self.metrics {
                            metrics.record_rate_limited(&route.id);
                        }
                        return Err(GatewayError::RateLimited(rejection));
                    }
                }
            }
            None => None,
        };

        let result = self.dispatch(req, route, client).await;

        if let Some(breaker) = &route.circuit_breaker {
            let failed = match &result {
                Ok(response) => response.status().is_server_error(),
                Err(err) => err.status().is_server_error(),
            };
            let recorded = if failed {
                self.circuit_breaker
                    .record_failure(&route.id, breaker, now_millis())
                    .await
            } else {
                self.circuit_breaker.record_success(&route.id, breaker).await
            };
            if let Err(e) = recorded {
                warn!("Could not record circuit breaker outcome for {}: {}", route.id, e);
            }
        }

        let mut response = result?;
        if let Some(quota) = quota {
            quota.apply_headers(response.headers_mut());
        }
        Ok(response)
    }

    async fn dispatch(
        &self,
        req: Request<Body>,
        route: &Route,
        client: ClientContext,
    ) -> Result<Response<Body>, GatewayError> {
        let backends = self.health.refresh_stale_only(&route.backends).await;
        let backend = self
            .load_balancer
            .select(&backends, route.load_balancer, &route.id)
            .ok_or_else(|| GatewayError::NoHealthyBackend(route.id.clone()))?;

        let (parts, body) = req.into_parts();
        let path = self.matcher.rewrite_path(parts.uri.path(), route);
        let uri = target_uri(&backend, &path, parts.uri.query())
            .map_err(|e| GatewayError::BadRequest(format!("invalid target URL: {}", e)))?;

        let body = if forwards_body(&parts.method) {
            Some(read_body(body, self.config.max_body_bytes).await?)
        } else {
            None
        };

        let upstream = UpstreamRequest {
            method: parts.method,
            uri,
            headers: forwarded_headers(&parts.headers, &client),
            body,
        };

        debug!("Forwarding to backend {} at {}", backend.id, upstream.uri);

        let limit = route.timeout(self.config.default_timeout());
        let strategy = RetryStrategy::new(self.config.retry_config(route.retries));

        let guard = self.load_balancer.track(&backend.id);
        self.publish_connections(&backend.id);

        let forwarder = &self.forwarder;
        let metrics = self.metrics.as_deref();
        let upstream = &upstream;
        let backend_id = backend.id.as_str();

        let result = strategy
            .execute_with_decision(
                move || async move {
                    let attempt = forwarder.send(upstream, limit).await;
                    if let Some(metrics) = metrics {
                        metrics.record_backend_attempt(backend_id, attempt.is_ok());
                    }
                    if let Err(e) = &attempt {
                        warn!("Backend {} attempt failed: {}", backend_id, e);
                    }
                    attempt
                },
                ForwardError::retry_decision,
            )
            .await;

        guard.finish(result.is_ok());
        self.publish_connections(&backend.id);

        match result {
            Ok(response) => Ok(self.forwarder.relay(response, &backend.id)),
            Err(source) => Err(GatewayError::UpstreamFailure {
                backend_id: backend.id.clone(),
                source,
            }),
        }
    }

    fn client_context(&self, req: &Request<Body>, request_id: String) -> ClientContext {
        ClientContext {
            ip: client_ip(req, self.trust_forwarded_for),
            proto: req.uri().scheme_str().unwrap_or("http").to_string(),
            host: req.headers().get(HOST).cloned(),
            request_id,
        }
    }

    fn publish_connections(&self, backend_id: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.update_backend_connections(
                backend_id,
                self.load_balancer.active_connections(backend_id),
            );
        }
    }
}

/// Reuse the caller's request id when it sent one.
fn request_id(req: &Request<Body>) -> String {
    req.headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn client_ip(req: &Request<Body>, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        let first_hop = req
            .headers()
            .get(X_FORWARDED_FOR)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|hop| !hop.is_empty());
        if let Some(hop) = first_hop {
            return hop.to_string();
        }
    }

    req.extensions()
        .get::<ClientAddr>()
        .map(|addr| addr.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    fn request(xff: Option<&str>, peer: Option<&str>) -> Request<Body> {
        let mut builder = Request::get("/api/users");
        if let Some(xff) = xff {
            builder = builder.header(X_FORWARDED_FOR, xff);
        }
        let mut req = builder.body(Body::empty()).unwrap();
        if let Some(peer) = peer {
            let addr: SocketAddr = peer.parse().unwrap();
            req.extensions_mut().insert(ClientAddr(addr));
        }
        req
    }

    #[test]
    fn test_client_ip_prefers_peer_unless_trusted() {
        let req = request(Some("203.0.113.9, 10.0.0.1"), Some("10.0.0.1:5555"));
        assert_eq!(client_ip(&req, false), "10.0.0.1");
        assert_eq!(client_ip(&req, true), "203.0.113.9");

        assert_eq!(client_ip(&request(None, None), false), "unknown");
        assert_eq!(client_ip(&request(None, Some("10.0.0.2:1")), true), "10.0.0.2");
    }

    #[test]
    fn test_request_id_reuses_inbound_header() {
        let req = Request::get("/")
            .header(X_REQUEST_ID, "abc-123")
            .body(Body::empty())
            .unwrap();
        assert_eq!(request_id(&req), "abc-123");

        let generated = request_id(&request(None, None));
        assert!(Uuid::parse_str(&generated).is_ok());
    }
}
