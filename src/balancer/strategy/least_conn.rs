//! Least-connections balancing strategy.

use super::Strategy;
use crate::balancer::{Backend, BalancerError};
use std::sync::Arc;

/// Least-connections strategy.
///
/// Picks the healthy backend with the fewest in-flight requests, breaking
/// ties by pool order. Stateless; the counters live on the backends.
#[derive(Debug)]
pub struct LeastConnections;

impl LeastConnections {
    /// Create a new least-connections strategy.
    pub fn new() -> Self {
        Self
    }
}

impl Default for LeastConnections {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for LeastConnections {
    fn next_backend(&self, backends: &[Arc<Backend>]) -> Result<Arc<Backend>, BalancerError> {
        if backends.is_empty() {
            return Err(BalancerError::NoBackends);
        }

        backends
            .iter()
            .filter(|b| b.is_healthy())
            .min_by_key(|b| b.active_connections())
            .cloned()
            .ok_or(BalancerError::NoHealthyBackends)
    }

    fn name(&self) -> &'static str {
        "LeastConnections"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::ReverseProxy;
    use hyper::Uri;
    use std::time::Duration;

    fn test_pool(size: usize) -> Vec<Arc<Backend>> {
        (0..size)
            .map(|i| {
                let id = format!("b{}", i + 1);
                let url: Uri = format!("http://127.0.0.1:{}", 9001 + i).parse().unwrap();
                let proxy = ReverseProxy::new(
                    id.as_str(),
                    url.clone(),
                    Duration::from_secs(1),
                    Duration::from_secs(1),
                    10,
                );
                Arc::new(Backend::new(id, url, proxy))
            })
            .collect()
    }

    #[test]
    fn test_selects_least_loaded() {
        let lc = LeastConnections::new();
        let pool = test_pool(3);

        pool[0].increment_connections();
        pool[0].increment_connections();
        pool[1].increment_connections();

        assert_eq!(lc.next_backend(&pool).unwrap().id(), "b3");
    }

    #[test]
    fn test_ties_break_by_pool_order() {
        let lc = LeastConnections::new();
        let pool = test_pool(3);

        assert_eq!(lc.next_backend(&pool).unwrap().id(), "b1");
    }

    #[test]
    fn test_skips_unhealthy() {
        let lc = LeastConnections::new();
        let pool = test_pool(2);

        pool[0].set_healthy(false);
        pool[1].increment_connections();

        // b1 has fewer connections but is unhealthy.
        assert_eq!(lc.next_backend(&pool).unwrap().id(), "b2");
    }

    #[test]
    fn test_all_unhealthy() {
        let lc = LeastConnections::new();
        let pool = test_pool(2);
        for backend in &pool {
            backend.set_healthy(false);
        }

        let err = lc.next_backend(&pool).unwrap_err();
        assert!(matches!(err, BalancerError::NoHealthyBackends));
    }

    #[test]
    fn test_empty_pool() {
        let lc = LeastConnections::new();
        let err = lc.next_backend(&[]).unwrap_err();
        assert!(matches!(err, BalancerError::NoBackends));
    }
}
