//! A single upstream backend and its in-flight request accounting.

use crate::proxy::{ProxyBody, ReverseProxy};
use hyper::body::Incoming;
use hyper::{Request, Response, Uri};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{PoisonError, RwLock};

/// One upstream backend in the pool.
///
/// The health flag is written only by the health checker and read under a
/// shared guard by the selection path. The active-connection counter is
/// lock-free so the hot path never contends with health updates.
#[derive(Debug)]
pub struct Backend {
    id: String,
    url: Uri,
    healthy: RwLock<bool>,
    active_connections: AtomicI64,
    proxy: ReverseProxy,
}

impl Backend {
    /// Create a backend that forwards through the given proxy handler.
    pub fn new(id: impl Into<String>, url: Uri, proxy: ReverseProxy) -> Self {
        Self {
            id: id.into(),
            url,
            healthy: RwLock::new(true),
            active_connections: AtomicI64::new(0),
            proxy,
        }
    }

    /// The backend's unique identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The backend's upstream base URL.
    pub fn url(&self) -> &Uri {
        &self.url
    }

    /// Whether the last health probe found this backend live.
    pub fn is_healthy(&self) -> bool {
        *self.healthy.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Update the health flag. Called only by the health checker.
    pub fn set_healthy(&self, healthy: bool) {
        *self.healthy.write().unwrap_or_else(PoisonError::into_inner) = healthy;
    }

    /// Number of requests currently being forwarded to this backend.
    pub fn active_connections(&self) -> i64 {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Record a request entering the backend.
    pub fn increment_connections(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a request leaving the backend.
    pub fn decrement_connections(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    /// Forward a request through this backend's proxy handler.
    ///
    /// The active counter is decremented on every exit path, including
    /// upstream errors and task cancellation.
    pub async fn serve(&self, req: Request<Incoming>, client_addr: SocketAddr) -> Response<ProxyBody> {
        let _guard = ConnectionGuard::enter(self);
        self.proxy.serve(req, client_addr).await
    }
}

/// Counter guard that pairs every increment with a decrement on drop.
struct ConnectionGuard<'a> {
    backend: &'a Backend,
}

impl<'a> ConnectionGuard<'a> {
    fn enter(backend: &'a Backend) -> Self {
        backend.increment_connections();
        Self { backend }
    }
}

impl Drop for ConnectionGuard<'_> {
    fn drop(&mut self) {
        self.backend.decrement_connections();
    }
}
