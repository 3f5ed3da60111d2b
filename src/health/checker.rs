//! Active health checker.
//!
//! Periodically probes every backend's `/health` endpoint and toggles the
//! backend health flags that selection observes. Probes for one tick run
//! concurrently, one task per backend, over a probe client shared across
//! ticks and distinct from the proxy transport.

use crate::balancer::Backend;
use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use hyper::{Request, StatusCode, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Overall bound on a single probe, dial included.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Dial timeout for probe connections.
const PROBE_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Active health checker that probes backend servers.
pub struct HealthChecker {
    backends: Vec<Arc<Backend>>,
    interval: Duration,
    client: Client<HttpConnector, Empty<Bytes>>,
}

impl HealthChecker {
    /// Create a health checker over the given pool.
    pub fn new(backends: Vec<Arc<Backend>>, interval: Duration) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(PROBE_CONNECT_TIMEOUT));
        connector.set_keepalive(Some(Duration::from_secs(30)));

        let client = Client::builder(TokioExecutor::new()).build(connector);

        Self {
            backends,
            interval,
            client,
        }
    }

    /// Run the checker until shutdown.
    ///
    /// Probes once immediately, then on every tick. A slow round never
    /// queues up extra ticks.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(interval_secs = self.interval.as_secs(), "health checker starting");

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_all();
                }

                _ = shutdown.recv() => {
                    info!("health checker shutting down");
                    break;
                }
            }
        }
    }

    /// Fire one probe per backend, all in parallel.
    fn check_all(&self) {
        for backend in &self.backends {
            let backend = Arc::clone(backend);
            let client = self.client.clone();

            tokio::spawn(async move {
                check_backend_health(&client, &backend).await;
            });
        }
    }
}

/// Probe one backend and update its health flag, logging transitions.
async fn check_backend_health(client: &Client<HttpConnector, Empty<Bytes>>, backend: &Backend) {
    let health_url = match format!("{}health", backend.url()).parse::<Uri>() {
        Ok(uri) => uri,
        Err(e) => {
            error!(backend = backend.id(), error = %e, "failed to build health check URL");
            return;
        }
    };

    let request = match Request::get(health_url).body(Empty::<Bytes>::new()) {
        Ok(req) => req,
        Err(e) => {
            error!(backend = backend.id(), error = %e, "failed to create health check request");
            return;
        }
    };

    let response = match timeout(PROBE_TIMEOUT, client.request(request)).await {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            warn!(backend = backend.id(), error = %e, "health check connection failed");
            mark_unreachable(backend);
            return;
        }
        Err(_) => {
            warn!(backend = backend.id(), "health check timed out");
            mark_unreachable(backend);
            return;
        }
    };

    let status = response.status();
    // Drain the body so the connection can be reused.
    let _ = response.into_body().collect().await;

    let is_healthy = status == StatusCode::OK;
    let was_healthy = backend.is_healthy();
    backend.set_healthy(is_healthy);

    if was_healthy != is_healthy {
        if is_healthy {
            info!(backend = backend.id(), "backend became healthy");
        } else {
            warn!(
                backend = backend.id(),
                status_code = status.as_u16(),
                "backend became unhealthy"
            );
        }
    } else {
        debug!(backend = backend.id(), healthy = is_healthy, "health check completed");
    }
}

/// Flag a backend down after a transport failure, logging the transition.
fn mark_unreachable(backend: &Backend) {
    let was_healthy = backend.is_healthy();
    backend.set_healthy(false);

    if was_healthy {
        warn!(
            backend = backend.id(),
            "backend became unhealthy due to connection error"
        );
    }
}
