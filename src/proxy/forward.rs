// src/proxy/forward.rs
//
// One upstream attempt: build the backend request from a buffered template,
// send it through the shared client and give up when the route timeout hits.

use crate::model::Backend;
use crate::retry::RetryDecision;
use hyper::body::{Bytes, HttpBody};
use hyper::client::HttpConnector;
use hyper::header::{
    HeaderMap, HeaderName, HeaderValue, CONNECTION, CONTENT_LENGTH, HOST, TRANSFER_ENCODING,
};
use hyper::http::uri::InvalidUri;
use hyper::{Body, Client, Method, Request, Response, Uri};
use hyper_tls::HttpsConnector;
use std::time::Duration;
use tokio::time::timeout;

pub type HttpsClient = Client<HttpsConnector<HttpConnector>, Body>;

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_FORWARDED_PROTO: &str = "x-forwarded-proto";
const X_FORWARDED_HOST: &str = "x-forwarded-host";
const X_REAL_IP: &str = "x-real-ip";
pub const X_REQUEST_ID: &str = "x-request-id";
const X_PROXIED_BY: &str = "x-proxied-by";
const X_BACKEND_SERVER: &str = "x-backend-server";

#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Transport(#[from] hyper::Error),

    #[error("could not build upstream request: {0}")]
    Request(#[from] hyper::http::Error),
}

impl ForwardError {
    /// Connect failures and timeouts are worth another attempt; a request
    /// that cannot be built will fail the same way every time.
    pub fn retry_decision(&self) -> RetryDecision {
        match self {
            ForwardError::Timeout(_) | ForwardError::Transport(_) => RetryDecision::Retry,
            ForwardError::Request(_) => RetryDecision::NoRetry,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BodyError {
    #[error("request body exceeds {0} bytes")]
    TooLarge(u64),

    #[error("failed to read request body: {0}")]
    Read(#[from] hyper::Error),
}

/// Inbound request facts the forwarded headers are derived from.
#[derive(Debug, Clone)]
pub struct ClientContext {
    pub ip: String,
    pub proto: String,
    pub host: Option<HeaderValue>,
    pub request_id: String,
}

/// Everything needed to rebuild the upstream request for each attempt.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl UpstreamRequest {
    fn to_request(&self) -> Result<Request<Body>, hyper::http::Error> {
        let body = match &self.body {
            Some(bytes) => Body::from(bytes.clone()),
            None => Body::empty(),
        };

        let mut request = Request::builder()
            .method(self.method.clone())
            .uri(self.uri.clone())
            .body(body)?;
        *request.headers_mut() = self.headers.clone();
        Ok(request)
    }
}

/// Whether a request with this method carries its body upstream.
pub fn forwards_body(method: &Method) -> bool {
    !matches!(*method, Method::GET | Method::HEAD)
}

/// The rewritten path resolved against the backend origin, with the original
/// query string. A path on the backend URL itself is replaced, not prefixed.
pub fn target_uri(backend: &Backend, path: &str, query: Option<&str>) -> Result<Uri, InvalidUri> {
    let mut url = backend.url.clone();
    url.set_path(path);
    url.set_query(query);
    url.as_str().parse()
}

/// Buffer a request body so retries can resend it, refusing anything larger
/// than `limit` bytes before or while reading.
pub async fn read_body(mut body: Body, limit: u64) -> Result<Bytes, BodyError> {
    if body.size_hint().lower() > limit {
        return Err(BodyError::TooLarge(limit));
    }

    let mut buffered = Vec::new();
    while let Some(chunk) = body.data().await {
        let chunk = chunk?;
        if (buffered.len() + chunk.len()) as u64 > limit {
            return Err(BodyError::TooLarge(limit));
        }
        buffered.extend_from_slice(&chunk);
    }
    Ok(Bytes::from(buffered))
}

/// Copy the inbound headers minus hop-by-hop ones and add the forwarding set.
pub fn forwarded_headers(inbound: &HeaderMap, client: &ClientContext) -> HeaderMap {
    let mut headers = inbound.clone();
    for name in [HOST, CONNECTION, TRANSFER_ENCODING, CONTENT_LENGTH] {
        headers.remove(name);
    }

    if let Ok(ip) = HeaderValue::from_str(&client.ip) {
        headers.insert(HeaderName::from_static(X_FORWARDED_FOR), ip.clone());
        headers.insert(HeaderName::from_static(X_REAL_IP), ip);
    }
    if let Ok(proto) = HeaderValue::from_str(&client.proto) {
        headers.insert(HeaderName::from_static(X_FORWARDED_PROTO), proto);
    }
    if let Some(host) = &client.host {
        headers.insert(HeaderName::from_static(X_FORWARDED_HOST), host.clone());
    }
    if let Ok(id) = HeaderValue::from_str(&client.request_id) {
        headers.insert(HeaderName::from_static(X_REQUEST_ID), id);
    }
    headers
}

/// Shared HTTP(S) client for backend traffic.
#[derive(Clone)]
pub struct Forwarder {
    client: HttpsClient,
    proxied_by: HeaderValue,
}

impl Forwarder {
    pub fn new(proxied_by: &str) -> Self {
        let client = Client::builder().build::<_, Body>(HttpsConnector::new());
        let proxied_by = HeaderValue::from_str(proxied_by)
            .unwrap_or_else(|_| HeaderValue::from_static("API Gateway"));

        Self { client, proxied_by }
    }

    /// Send one attempt. On timeout the in-flight future is dropped, which
    /// closes its connection before any retry starts.
    pub async fn send(
        &self,
        upstream: &UpstreamRequest,
        limit: Duration,
    ) -> Result<Response<Body>, ForwardError> {
        let request = upstream.to_request()?;

        match timeout(limit, self.client.request(request)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(ForwardError::Timeout(limit)),
        }
    }

    /// Tag a backend response before relaying it; status and body are untouched.
    pub fn relay(&self, mut response: Response<Body>, backend_id: &str) -> Response<Body> {
        let headers = response.headers_mut();
        headers.insert(HeaderName::from_static(X_PROXIED_BY), self.proxied_by.clone());
        if let Ok(id) = HeaderValue::from_str(backend_id) {
            headers.insert(HeaderName::from_static(X_BACKEND_SERVER), id);
        }
        response
    }
}
