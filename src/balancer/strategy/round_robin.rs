//! Round-robin balancing strategy.

use super::Strategy;
use crate::balancer::{Backend, BalancerError};
use std::sync::{Arc, Mutex, PoisonError};

/// Round-robin strategy.
///
/// Walks the pool in order, skipping unhealthy backends. The cursor is
/// shared across callers so consecutive selections advance in issue order.
#[derive(Debug)]
pub struct RoundRobin {
    current: Mutex<usize>,
}

impl RoundRobin {
    /// Create a new round-robin strategy starting at the head of the pool.
    pub fn new() -> Self {
        Self {
            current: Mutex::new(0),
        }
    }
}

impl Default for RoundRobin {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for RoundRobin {
    fn next_backend(&self, backends: &[Arc<Backend>]) -> Result<Arc<Backend>, BalancerError> {
        if backends.is_empty() {
            return Err(BalancerError::NoBackends);
        }

        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);

        // Keep the cursor in range even if the pool shrank between calls.
        if *current >= backends.len() {
            *current = 0;
        }

        let start = *current;
        loop {
            let candidate = Arc::clone(&backends[*current]);
            *current = (*current + 1) % backends.len();

            if candidate.is_healthy() {
                return Ok(candidate);
            }
            if *current == start {
                return Err(BalancerError::NoHealthyBackends);
            }
        }
    }

    fn name(&self) -> &'static str {
        "RoundRobin"
    }
}
