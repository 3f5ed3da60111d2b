//! Administrative handlers: pool stats, strategy swaps, rate-limit CRUD.

use crate::balancer::strategy::strategy_for;
use crate::balancer::LoadBalancer;
use crate::proxy::ProxyBody;
use crate::ratelimit::RateLimiter;
use crate::server::response::{empty_response, json_error, json_response};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Handlers behind `/admin/`.
pub(crate) struct AdminHandlers {
    balancer: Arc<LoadBalancer>,
    limiter: Arc<RateLimiter>,
}

#[derive(Serialize)]
struct BackendStat {
    id: String,
    url: String,
    healthy: bool,
    active_connections: i64,
}

#[derive(Serialize)]
struct StatsResponse {
    strategy: &'static str,
    backends: Vec<BackendStat>,
}

#[derive(Deserialize)]
struct StrategyRequest {
    strategy: String,
}

#[derive(Serialize, Deserialize)]
struct RateLimitBody {
    rate: f64,
    burst: u32,
}

impl AdminHandlers {
    pub(crate) fn new(balancer: Arc<LoadBalancer>, limiter: Arc<RateLimiter>) -> Self {
        Self { balancer, limiter }
    }

    /// `GET /admin/stats` — pool snapshot with per-backend health and load.
    pub(crate) fn stats(&self) -> Response<ProxyBody> {
        let backends = self
            .balancer
            .get_backends()
            .iter()
            .map(|backend| BackendStat {
                id: backend.id().to_string(),
                url: backend.url().to_string(),
                healthy: backend.is_healthy(),
                active_connections: backend.active_connections(),
            })
            .collect();

        let stats = StatsResponse {
            strategy: self.balancer.strategy_name(),
            backends,
        };

        json_response(StatusCode::OK, &stats)
    }

    /// `POST /admin/strategy` — install a new balancing strategy by name.
    pub(crate) async fn change_strategy(&self, req: Request<Incoming>) -> Response<ProxyBody> {
        if req.method() != Method::POST {
            return empty_response(StatusCode::METHOD_NOT_ALLOWED);
        }

        let body = match read_json::<StrategyRequest>(req).await {
            Ok(body) => body,
            Err(response) => return response,
        };

        let strategy = match strategy_for(&body.strategy) {
            Ok(strategy) => strategy,
            Err(e) => return json_error(StatusCode::BAD_REQUEST, &e.to_string()),
        };

        let name = strategy.name();
        self.balancer.set_strategy(strategy);

        json_response(
            StatusCode::OK,
            &serde_json::json!({
                "message": "Strategy changed successfully",
                "strategy": name,
            }),
        )
    }

    /// `/admin/ratelimit/{clientID}` — per-client limit CRUD.
    pub(crate) async fn rate_limit(&self, req: Request<Incoming>) -> Response<ProxyBody> {
        debug!(method = %req.method(), path = %req.uri().path(), "rate limit API request");

        let client_id = match req.uri().path().split('/').nth(3) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => {
                return json_error(
                    StatusCode::BAD_REQUEST,
                    "Invalid URL format. Use /admin/ratelimit/{clientID}",
                )
            }
        };

        match req.method().as_str() {
            "GET" => self.get_rate_limit(&client_id),
            "POST" => self.create_rate_limit(req, &client_id).await,
            "PUT" => self.update_rate_limit(req, &client_id).await,
            "DELETE" => self.delete_rate_limit(&client_id),
            _ => empty_response(StatusCode::METHOD_NOT_ALLOWED),
        }
    }

    fn get_rate_limit(&self, client_id: &str) -> Response<ProxyBody> {
        let limits = self.limiter.get_client_limits(client_id);

        json_response(
            StatusCode::OK,
            &RateLimitBody {
                rate: limits.rate,
                burst: limits.burst,
            },
        )
    }

    async fn create_rate_limit(
        &self,
        req: Request<Incoming>,
        client_id: &str,
    ) -> Response<ProxyBody> {
        let body = match read_json::<RateLimitBody>(req).await {
            Ok(body) => body,
            Err(response) => return response,
        };

        if let Err(e) = self.limiter.set_client_limits(client_id, body.rate, body.burst) {
            debug!(client_id, error = %e, "rejected rate limit create");
            return json_error(StatusCode::BAD_REQUEST, "Rate and burst must be positive");
        }

        info!(client_id, rate = body.rate, burst = body.burst, "rate limit created");
        empty_response(StatusCode::CREATED)
    }

    async fn update_rate_limit(
        &self,
        req: Request<Incoming>,
        client_id: &str,
    ) -> Response<ProxyBody> {
        let body = match read_json::<RateLimitBody>(req).await {
            Ok(body) => body,
            Err(response) => return response,
        };

        let result = self.limiter.update_client_limits(client_id, |limits| {
            limits.rate = body.rate;
            limits.burst = body.burst;
        });

        if let Err(e) = result {
            debug!(client_id, error = %e, "rejected rate limit update");
            return json_error(StatusCode::BAD_REQUEST, "Rate and burst must be positive");
        }

        info!(client_id, rate = body.rate, burst = body.burst, "rate limit updated");
        empty_response(StatusCode::OK)
    }

    fn delete_rate_limit(&self, client_id: &str) -> Response<ProxyBody> {
        self.limiter.delete_client_limits(client_id);
        empty_response(StatusCode::NO_CONTENT)
    }
}

/// Collect and deserialise a JSON request body, mapping failures to `400`.
async fn read_json<T: serde::de::DeserializeOwned>(
    req: Request<Incoming>,
) -> Result<T, Response<ProxyBody>> {
    let bytes = req
        .into_body()
        .collect()
        .await
        .map_err(|_| json_error(StatusCode::BAD_REQUEST, "Invalid request body"))?
        .to_bytes();

    serde_json::from_slice(&bytes)
        .map_err(|_| json_error(StatusCode::BAD_REQUEST, "Invalid request body"))
}
