//! Admission middleware: per-client rate limiting in front of the data path.

use crate::proxy::ProxyBody;
use crate::ratelimit::RateLimiter;
use crate::server::response::json_error;
use hyper::{Request, Response, StatusCode};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;

/// Decides whether a request may enter the proxy data path.
///
/// Health and admin traffic passes through untouched; everything else is
/// charged against the caller's token bucket.
pub struct AdmissionControl {
    limiter: Arc<RateLimiter>,
}

impl AdmissionControl {
    /// Create the middleware over a shared rate limiter.
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }

    /// Check a request against the rate limiter.
    ///
    /// Returns `None` when the request may proceed, or the `429` response
    /// to short-circuit with.
    pub fn check<B>(
        &self,
        req: &Request<B>,
        client_addr: SocketAddr,
    ) -> Option<Response<ProxyBody>> {
        let path = req.uri().path();
        if path == "/health" || path.starts_with("/admin/") {
            return None;
        }

        let client_id = client_id_from_request(req, client_addr);

        if self.limiter.allow(&client_id) {
            return None;
        }

        debug!(
            client_id = %client_id,
            path = %path,
            rate = self.limiter.get_rate(&client_id),
            burst = self.limiter.get_burst(&client_id),
            "rate limit exceeded"
        );

        let mut response = json_error(
            StatusCode::TOO_MANY_REQUESTS,
            "Rate limit exceeded. Please slow down your requests.",
        );
        response
            .headers_mut()
            .insert("retry-after", hyper::header::HeaderValue::from_static("60"));

        Some(response)
    }
}

/// Derive the rate-limiting identity for a request.
///
/// Precedence: `X-API-Key`, then the first hop in `X-Forwarded-For`, then
/// the remote address.
pub fn client_id_from_request<B>(req: &Request<B>, client_addr: SocketAddr) -> String {
    if let Some(api_key) = header_str(req, "x-api-key") {
        if !api_key.is_empty() {
            return format!("api:{}", api_key);
        }
    }

    if let Some(forwarded_for) = header_str(req, "x-forwarded-for") {
        if let Some(first) = forwarded_for.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    client_addr.ip().to_string()
}

fn header_str<'a, B>(req: &'a Request<B>, name: &str) -> Option<&'a str> {
    req.headers().get(name).and_then(|value| value.to_str().ok())
}
