//! Request routing: admin surface, health endpoint, and the proxy data path.

use crate::balancer::LoadBalancer;
use crate::proxy::ProxyBody;
use crate::ratelimit::RateLimiter;
use crate::server::admin::AdminHandlers;
use crate::server::middleware::AdmissionControl;
use crate::server::response::{json_error, json_response};
use crate::util::RequestId;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// Dispatches every request on the listener to the right handler.
pub struct Router {
    balancer: Arc<LoadBalancer>,
    admission: AdmissionControl,
    admin: AdminHandlers,
}

impl Router {
    /// Wire the router over the shared balancer and rate limiter.
    pub fn new(balancer: Arc<LoadBalancer>, limiter: Arc<RateLimiter>) -> Self {
        Self {
            admission: AdmissionControl::new(Arc::clone(&limiter)),
            admin: AdminHandlers::new(Arc::clone(&balancer), limiter),
            balancer,
        }
    }

    /// Handle one request, emitting an access-log line when done.
    pub async fn handle(
        &self,
        req: Request<Incoming>,
        client_addr: SocketAddr,
    ) -> Response<ProxyBody> {
        let start = Instant::now();
        let request_id = RequestId::short();
        let method = req.method().to_string();
        let path = req
            .uri()
            .path_and_query()
            .map(|pq| pq.to_string())
            .unwrap_or_else(|| req.uri().path().to_string());

        let response = self.route(req, client_addr).await;

        info!(
            request_id = %request_id,
            path = %path,
            client_ip = %client_addr,
            method = %method,
            status_code = response.status().as_u16(),
            latency_ms = start.elapsed().as_millis() as u64,
            "request processed"
        );

        response
    }

    async fn route(&self, req: Request<Incoming>, client_addr: SocketAddr) -> Response<ProxyBody> {
        match req.uri().path() {
            "/health" => json_response(StatusCode::OK, &serde_json::json!({ "status": "ok" })),
            "/admin/stats" => self.admin.stats(),
            "/admin/strategy" => self.admin.change_strategy(req).await,
            path if path.starts_with("/admin/ratelimit/") => self.admin.rate_limit(req).await,
            _ => {
                if let Some(denied) = self.admission.check(&req, client_addr) {
                    return denied;
                }
                self.forward(req, client_addr).await
            }
        }
    }

    /// The proxy data path: select a backend and forward through it.
    async fn forward(&self, req: Request<Incoming>, client_addr: SocketAddr) -> Response<ProxyBody> {
        let start = Instant::now();
        let path = req.uri().path().to_string();

        let backend = match self.balancer.get_next() {
            Ok(backend) => backend,
            Err(e) => {
                error!(
                    path = %path,
                    client_ip = %client_addr,
                    error = %e,
                    "failed to get next backend"
                );
                return json_error(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "No healthy backends available",
                );
            }
        };

        info!(
            path = %path,
            client_ip = %client_addr,
            backend_id = backend.id(),
            backend_url = %backend.url(),
            active_connections = backend.active_connections(),
            "request forwarded to backend"
        );

        let response = backend.serve(req, client_addr).await;

        info!(
            path = %path,
            client_ip = %client_addr,
            backend_id = backend.id(),
            response_time_ms = start.elapsed().as_millis() as u64,
            "backend response completed"
        );

        response
    }
}
