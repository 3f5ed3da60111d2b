//! Balancing strategies.

mod least_conn;
mod round_robin;

pub use least_conn::LeastConnections;
pub use round_robin::RoundRobin;

use crate::balancer::{Backend, BalancerError};
use std::sync::Arc;

/// Trait for balancing strategies.
///
/// Implementations must be safe under concurrent calls; any internal
/// selection state is guarded inside the strategy itself.
pub trait Strategy: Send + Sync + std::fmt::Debug {
    /// Select the next backend from the pool.
    ///
    /// Never returns an unhealthy backend; fails when the pool is empty or
    /// when every member is unhealthy.
    fn next_backend(&self, backends: &[Arc<Backend>]) -> Result<Arc<Backend>, BalancerError>;

    /// The strategy's registered name.
    fn name(&self) -> &'static str;
}

/// Names accepted by [`strategy_for`] and configuration validation.
pub fn registered_strategies() -> &'static [&'static str] {
    &["RoundRobin", "LeastConnections"]
}

/// Construct a freshly-initialised strategy by registered name.
///
/// A new instance starts from a clean selection state, so swapping
/// strategies at runtime resets the cursor.
pub fn strategy_for(name: &str) -> Result<Box<dyn Strategy>, BalancerError> {
    match name {
        "RoundRobin" => Ok(Box::new(RoundRobin::new())),
        "LeastConnections" => Ok(Box::new(LeastConnections::new())),
        _ => Err(BalancerError::UnknownStrategy(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_for_known_names() {
        for name in registered_strategies() {
            let strategy = strategy_for(name).unwrap();
            assert_eq!(strategy.name(), *name);
        }
    }

    #[test]
    fn test_strategy_for_unknown_name() {
        let err = strategy_for("Bogus").unwrap_err();
        assert!(err.to_string().contains("unknown balancing strategy: Bogus"));
    }
}
