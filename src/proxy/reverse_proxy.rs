//! HTTP/1.1 reverse proxy bound to a single upstream backend.
//!
//! Each backend gets its own proxy instance, built once at startup with a
//! pooled client shaped by the backend's timeouts. The proxy rewrites the
//! request URI to the upstream authority, augments forwarding headers, and
//! maps upstream failures to `502 Bad Gateway`.

use bytes::Bytes;
use http_body_util::{combinators::BoxBody, BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{HeaderValue, HOST};
use hyper::{Request, Response, StatusCode, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::timeout;
use tracing::error;

/// Body type produced by the proxy for both upstream and locally-built
/// responses.
pub type ProxyBody = BoxBody<Bytes, hyper::Error>;

/// TCP keep-alive used for upstream connections.
const UPSTREAM_KEEPALIVE: Duration = Duration::from_secs(30);

/// How long pooled upstream connections may sit idle.
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Reverse proxy handler for one upstream backend.
#[derive(Debug)]
pub struct ReverseProxy {
    backend_id: String,
    target: Uri,
    client: Client<HttpConnector, Incoming>,
    read_timeout: Duration,
}

impl ReverseProxy {
    /// Create a proxy for the given upstream target.
    ///
    /// # Arguments
    ///
    /// * `backend_id` - Identifier stamped into `X-Backend` and log lines
    /// * `target` - Upstream base URI (scheme + authority)
    /// * `connect_timeout` - Upstream dial timeout
    /// * `read_timeout` - Bound on the upstream response-header wait
    /// * `max_idle` - Idle connections kept pooled to this backend
    pub fn new(
        backend_id: impl Into<String>,
        target: Uri,
        connect_timeout: Duration,
        read_timeout: Duration,
        max_idle: usize,
    ) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(connect_timeout));
        connector.set_keepalive(Some(UPSTREAM_KEEPALIVE));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .pool_max_idle_per_host(max_idle)
            .build(connector);

        Self {
            backend_id: backend_id.into(),
            target,
            client,
            read_timeout,
        }
    }

    /// The upstream base URI this proxy forwards to.
    pub fn target(&self) -> &Uri {
        &self.target
    }

    /// Forward a request to the upstream and stream the response back.
    ///
    /// Any upstream failure (dial error, timeout, broken response) is
    /// logged and mapped to `502 Bad Gateway` with a JSON body.
    pub async fn serve(&self, req: Request<Incoming>, client_addr: SocketAddr) -> Response<ProxyBody> {
        let path = req.uri().path().to_string();
        let req = self.direct(req, client_addr);

        match timeout(self.read_timeout, self.client.request(req)).await {
            Ok(Ok(response)) => response.map(|body| body.boxed()),
            Ok(Err(e)) => {
                error!(
                    backend = %self.backend_id,
                    path = %path,
                    error = %e,
                    "proxy error"
                );
                bad_gateway_response()
            }
            Err(_) => {
                error!(
                    backend = %self.backend_id,
                    path = %path,
                    timeout_ms = self.read_timeout.as_millis() as u64,
                    "proxy error: upstream response timed out"
                );
                bad_gateway_response()
            }
        }
    }

    /// Rewrite the request for the upstream: swap in the target authority
    /// and set the forwarding headers.
    fn direct(&self, mut req: Request<Incoming>, client_addr: SocketAddr) -> Request<Incoming> {
        let original_host = req
            .headers()
            .get(HOST)
            .cloned()
            .or_else(|| {
                req.uri()
                    .authority()
                    .and_then(|a| HeaderValue::from_str(a.as_str()).ok())
            })
            .unwrap_or_else(|| HeaderValue::from_static(""));

        let path_and_query = req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");

        let mut parts = self.target.clone().into_parts();
        parts.path_and_query = Some(
            path_and_query
                .parse()
                .unwrap_or_else(|_| hyper::http::uri::PathAndQuery::from_static("/")),
        );
        if let Ok(uri) = Uri::from_parts(parts) {
            *req.uri_mut() = uri;
        }

        let headers = req.headers_mut();
        headers.insert("x-forwarded-host", original_host);
        if let Ok(value) = client_addr.ip().to_string().parse() {
            headers.insert("x-forwarded-for", value);
        }
        headers.insert("x-forwarded-proto", HeaderValue::from_static("http"));
        headers.insert("x-load-balancer", HeaderValue::from_static("CloudBalancer"));
        if let Ok(value) = self.backend_id.parse() {
            headers.insert("x-backend", value);
        }
        if let Some(authority) = self.target.authority() {
            if let Ok(value) = HeaderValue::from_str(authority.as_str()) {
                headers.insert(HOST, value);
            }
        }

        req
    }
}

/// Build the 502 response returned for any upstream failure.
fn bad_gateway_response() -> Response<ProxyBody> {
    let body = Full::new(Bytes::from_static(br#"{"error":"Backend server error"}"#))
        .map_err(|never| match never {})
        .boxed();

    Response::builder()
        .status(StatusCode::BAD_GATEWAY)
        .header("content-type", "application/json")
        .body(body)
        .unwrap()
}
