// src/server/admin.rs
//
// Operator endpoints. Unauthenticated, so the listener binds to loopback by
// default.

use crate::metrics::MetricsRegistry;
use crate::proxy::Proxy;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Body, Method, Request, Response, StatusCode};
use serde::Serialize;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tower::Service;
use tracing::{error, info};

#[derive(Clone)]
pub struct AdminHandler {
    proxy: Arc<Proxy>,
    registry: Arc<MetricsRegistry>,
    metrics_path: Arc<str>,
}

impl AdminHandler {
    pub fn new(proxy: Arc<Proxy>, registry: Arc<MetricsRegistry>, metrics_path: &str) -> Self {
        Self {
            proxy,
            registry,
            metrics_path: Arc::from(metrics_path),
        }
    }

    pub async fn handle(&self, req: Request<Body>) -> Response<Body> {
        let path = req.uri().path().trim_end_matches('/');
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        if req.method() == Method::GET && path == self.metrics_path.trim_end_matches('/') {
            return self.metrics();
        }

        match (req.method(), segments.as_slice()) {
            (&Method::GET, ["admin", "circuit-breaker", "stats", id]) => {
                match self.proxy.circuit_breaker().get_stats(id).await {
                    Ok(record) => ok(json!({ "route_id": id, "stats": record })),
                    Err(e) => internal_error(&e.to_string()),
                }
            }
            (&Method::POST, ["admin", "circuit-breaker", "reset", id]) => {
                match self.proxy.circuit_breaker().reset(id).await {
                    Ok(record) => ok(json!({ "route_id": id, "stats": record })),
                    Err(e) => internal_error(&e.to_string()),
                }
            }
            (&Method::GET, ["admin", "load-balancer", "stats"]) => {
                ok(self.proxy.load_balancer().all_connection_stats())
            }
            (&Method::POST, ["admin", "load-balancer", "reset"]) => {
                self.proxy.load_balancer().reset_stats(None);
                info!("Connection stats reset for all backends");
                ok(json!({ "reset": "all" }))
            }
            (&Method::POST, ["admin", "load-balancer", "reset", id]) => {
                self.proxy.load_balancer().reset_stats(Some(*id));
                info!("Connection stats reset for backend {}", id);
                ok(json!({ "reset": id }))
            }
            (&Method::GET, ["admin", "health"]) => ok(self.proxy.health().statuses()),
            _ => json_response(
                StatusCode::NOT_FOUND,
                json!({
                    "success": false,
                    "error": { "code": "NOT_FOUND", "message": "Unknown admin endpoint" },
                }),
            ),
        }
    }

    fn metrics(&self) -> Response<Body> {
        match self.registry.gather() {
            Ok(buffer) => {
                let mut response = Response::new(Body::from(buffer));
                response.headers_mut().insert(
                    CONTENT_TYPE,
                    HeaderValue::from_static("text/plain; version=0.0.4"),
                );
                response
            }
            Err(e) => {
                error!("Failed to encode metrics: {}", e);
                internal_error("failed to encode metrics")
            }
        }
    }
}

fn ok<T: Serialize>(data: T) -> Response<Body> {
    json_response(StatusCode::OK, json!({ "success": true, "data": data }))
}

fn internal_error(message: &str) -> Response<Body> {
    json_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({
            "success": false,
            "error": { "code": "INTERNAL_ERROR", "message": message },
        }),
    )
}

fn json_response(status: StatusCode, body: serde_json::Value) -> Response<Body> {
    let mut response = Response::new(Body::from(body.to_string()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

impl Service<Request<Body>> for AdminHandler {
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = futures::future::BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let handler = self.clone();
        Box::pin(async move { Ok(handler.handle(req).await) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::CircuitBreakerState;
    use crate::config::Config;

    fn handler() -> AdminHandler {
        let registry = Arc::new(MetricsRegistry::new().unwrap());
        let proxy = Proxy::builder(Config::default())
            .with_metrics(registry.collector())
            .build()
            .unwrap();
        AdminHandler::new(Arc::new(proxy), registry, "/metrics")
    }

    async fn call(handler: &AdminHandler, method: Method, uri: &str) -> (StatusCode, serde_json::Value) {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = handler.handle(req).await;
        let status = response.status();
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null))
    }

    #[tokio::test]
    async fn test_circuit_breaker_stats_and_reset() {
        let handler = handler();

        let (status, body) = call(&handler, Method::GET, "/admin/circuit-breaker/stats/users").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["stats"]["state"], "closed");

        let (status, body) = call(&handler, Method::POST, "/admin/circuit-breaker/reset/users").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["route_id"], "users");

        let state = handler
            .proxy
            .circuit_breaker()
            .get_state("users", 0)
            .await
            .unwrap();
        assert_eq!(state, CircuitBreakerState::Closed);
    }

    #[tokio::test]
    async fn test_load_balancer_stats_reset() {
        let handler = handler();
        handler.proxy.load_balancer().increment_connection("b1");

        let (_, body) = call(&handler, Method::GET, "/admin/load-balancer/stats").await;
        assert_eq!(body["data"][0]["backend_id"], "b1");
        assert_eq!(body["data"][0]["active_connections"], 1);

        let (status, _) = call(&handler, Method::POST, "/admin/load-balancer/reset/b1").await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = call(&handler, Method::GET, "/admin/load-balancer/stats").await;
        assert_eq!(body["data"].as_array().map(Vec::len), Some(0));
    }

    #[tokio::test]
    async fn test_metrics_and_unknown_paths() {
        let handler = handler();

        let req = Request::get("/metrics").body(Body::empty()).unwrap();
        let response = handler.handle(req).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[CONTENT_TYPE],
            "text/plain; version=0.0.4"
        );

        let (status, body) = call(&handler, Method::GET, "/admin/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }
}
