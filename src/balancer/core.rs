//! Load-balancer core: the backend pool and the active strategy.

use crate::balancer::strategy::{strategy_for, Strategy};
use crate::balancer::{Backend, BalancerError};
use crate::config::Config;
use crate::proxy::ReverseProxy;
use hyper::Uri;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::info;

/// Owns the backend pool and the currently-installed strategy.
///
/// The pool is fixed at startup; only the strategy can be swapped at
/// runtime. Selection and listing take shared access, a swap takes
/// exclusive access.
#[derive(Debug)]
pub struct LoadBalancer {
    backends: Vec<Arc<Backend>>,
    strategy: RwLock<Box<dyn Strategy>>,
}

impl LoadBalancer {
    /// Build the pool from configuration.
    ///
    /// Fails when the configured strategy is not registered, a backend URL
    /// does not parse, or no backend is enabled.
    pub fn new(config: &Config) -> Result<Self, BalancerError> {
        let strategy = strategy_for(&config.load_balancer.method)?;

        let mut backends = Vec::new();
        for backend_config in &config.backends {
            if !backend_config.enabled {
                continue;
            }

            let url: Uri = format!("http://{}:{}", backend_config.host, backend_config.port)
                .parse()
                .map_err(|source| BalancerError::InvalidBackendUrl {
                    id: backend_config.id.clone(),
                    source,
                })?;

            let proxy = ReverseProxy::new(
                backend_config.id.as_str(),
                url.clone(),
                backend_config.connect_timeout,
                backend_config.read_timeout,
                backend_config.max_connection,
            );

            backends.push(Arc::new(Backend::new(backend_config.id.as_str(), url, proxy)));
        }

        if backends.is_empty() {
            return Err(BalancerError::NoEnabledBackends);
        }

        info!(
            strategy = strategy.name(),
            backends = backends.len(),
            "load balancer initialized"
        );

        Ok(Self {
            backends,
            strategy: RwLock::new(strategy),
        })
    }

    /// Select the next backend using the current strategy.
    pub fn get_next(&self) -> Result<Arc<Backend>, BalancerError> {
        let strategy = self.strategy.read().unwrap_or_else(PoisonError::into_inner);
        strategy.next_backend(&self.backends)
    }

    /// A snapshot of the pool. Backend records are shared, not copied.
    pub fn get_backends(&self) -> Vec<Arc<Backend>> {
        self.backends.clone()
    }

    /// The name of the currently-installed strategy.
    pub fn strategy_name(&self) -> &'static str {
        self.strategy
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .name()
    }

    /// Install a new strategy. Selection state starts fresh.
    pub fn set_strategy(&self, strategy: Box<dyn Strategy>) {
        let name = strategy.name();
        *self.strategy.write().unwrap_or_else(PoisonError::into_inner) = strategy;
        info!(strategy = name, "load balancing strategy changed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        BackendConfig, Config, LoadBalancerConfig, LoggingConfig, RateLimitConfig, ServerConfig,
    };
    use std::time::Duration;

    fn backend_config(id: &str, port: u16, enabled: bool) -> BackendConfig {
        BackendConfig {
            id: id.to_string(),
            host: "127.0.0.1".to_string(),
            port,
            connect_timeout: Duration::from_secs(1),
            read_timeout: Duration::from_secs(1),
            max_connection: 10,
            enabled,
        }
    }

    fn test_config(backends: Vec<BackendConfig>) -> Config {
        Config {
            server: ServerConfig { port: 0 },
            load_balancer: LoadBalancerConfig::default(),
            backends,
            rate_limit: RateLimitConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    #[test]
    fn test_new_skips_disabled_backends() {
        let config = test_config(vec![
            backend_config("b1", 9001, true),
            backend_config("b2", 9002, false),
            backend_config("b3", 9003, true),
        ]);

        let lb = LoadBalancer::new(&config).unwrap();
        let ids: Vec<_> = lb.get_backends().iter().map(|b| b.id().to_string()).collect();
        assert_eq!(ids, ["b1", "b3"]);
    }

    #[test]
    fn test_new_fails_with_no_enabled_backends() {
        let config = test_config(vec![backend_config("b1", 9001, false)]);
        let err = LoadBalancer::new(&config).unwrap_err();
        assert!(matches!(err, BalancerError::NoEnabledBackends));
    }

    #[test]
    fn test_new_fails_with_unknown_strategy() {
        let mut config = test_config(vec![backend_config("b1", 9001, true)]);
        config.load_balancer.method = "Bogus".to_string();
        let err = LoadBalancer::new(&config).unwrap_err();
        assert!(matches!(err, BalancerError::UnknownStrategy(_)));
    }

    #[test]
    fn test_get_next_round_robins() {
        let config = test_config(vec![
            backend_config("b1", 9001, true),
            backend_config("b2", 9002, true),
        ]);

        let lb = LoadBalancer::new(&config).unwrap();
        assert_eq!(lb.get_next().unwrap().id(), "b1");
        assert_eq!(lb.get_next().unwrap().id(), "b2");
        assert_eq!(lb.get_next().unwrap().id(), "b1");
    }

    #[test]
    fn test_get_next_propagates_strategy_error() {
        let config = test_config(vec![backend_config("b1", 9001, true)]);
        let lb = LoadBalancer::new(&config).unwrap();

        lb.get_backends()[0].set_healthy(false);
        let err = lb.get_next().unwrap_err();
        assert!(matches!(err, BalancerError::NoHealthyBackends));
    }

    #[test]
    fn test_set_strategy_resets_selection_state() {
        let config = test_config(vec![
            backend_config("b1", 9001, true),
            backend_config("b2", 9002, true),
        ]);

        let lb = LoadBalancer::new(&config).unwrap();
        assert_eq!(lb.strategy_name(), "RoundRobin");

        // Advance the cursor, then install a fresh strategy.
        lb.get_next().unwrap();
        lb.set_strategy(strategy_for("RoundRobin").unwrap());

        assert_eq!(lb.get_next().unwrap().id(), "b1");
    }

    #[test]
    fn test_strategy_swap_changes_name() {
        let config = test_config(vec![backend_config("b1", 9001, true)]);
        let lb = LoadBalancer::new(&config).unwrap();

        lb.set_strategy(strategy_for("LeastConnections").unwrap());
        assert_eq!(lb.strategy_name(), "LeastConnections");
    }
}
