// src/proxy/error.rs

use super::forward::{BodyError, ForwardError};
use crate::rate_limit::Rejection;
use crate::store::StoreError;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Body, Response, StatusCode};
use serde_json::json;

/// Every way a proxied request can end without a backend response.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("No route matches {method} {path}")]
    RouteNotFound { method: String, path: String },

    #[error("Rate limit exceeded")]
    RateLimited(Rejection),

    #[error("Circuit breaker is open for route {0}")]
    CircuitOpen(String),

    #[error("No healthy backend available for route {0}")]
    NoHealthyBackend(String),

    #[error("Proxy request to backend {backend_id} failed")]
    UpstreamFailure {
        backend_id: String,
        #[source]
        source: ForwardError,
    },

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Request body exceeds the {0} byte limit")]
    PayloadTooLarge(u64),

    #[error("State store failure: {0}")]
    Store(#[from] StoreError),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            GatewayError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::CircuitOpen(_) | GatewayError::NoHealthyBackend(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            GatewayError::UpstreamFailure { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::RouteNotFound { .. } => "NOT_FOUND",
            GatewayError::RateLimited(_) => "RATE_LIMIT_EXCEEDED",
            GatewayError::CircuitOpen(_) | GatewayError::NoHealthyBackend(_) => {
                "SERVICE_UNAVAILABLE"
            }
            GatewayError::UpstreamFailure { .. } => "PROXY_ERROR",
            GatewayError::BadRequest(_) => "BAD_REQUEST",
            GatewayError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            GatewayError::Store(_) => "INTERNAL_ERROR",
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            GatewayError::RateLimited(rejection) => Some(json!({
                "limit": rejection.limit,
                "window_ms": rejection.window_ms,
                "reset_at": rejection.reset_at,
                "retry_after": rejection.retry_after_secs,
            })),
            GatewayError::UpstreamFailure { source, .. } => Some(json!(source.to_string())),
            _ => None,
        }
    }
}

impl From<BodyError> for GatewayError {
    fn from(err: BodyError) -> Self {
        match err {
            BodyError::TooLarge(limit) => GatewayError::PayloadTooLarge(limit),
            BodyError::Read(e) => GatewayError::BadRequest(e.to_string()),
        }
    }
}

impl From<GatewayError> for Response<Body> {
    fn from(err: GatewayError) -> Self {
        let mut error = json!({
            "code": err.code(),
            "message": err.to_string(),
        });
        if let Some(details) = err.details() {
            error["details"] = details;
        }
        let body = json!({ "success": false, "error": error });

        let mut response = Response::new(Body::from(body.to_string()));
        *response.status_mut() = err.status();
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let GatewayError::RateLimited(rejection) = &err {
            rejection.apply_headers(response.headers_mut());
        }
        response
    }
}
