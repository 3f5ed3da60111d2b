//! Keyed rate limiter with per-client overrides.
//!
//! Two concurrent maps hold the per-client state: configured limits and
//! live buckets. The hot path (`allow`) touches only the bucket map; an
//! exclusive guard serialises the administrative operations that must
//! replace limits and bucket in lockstep.

use crate::ratelimit::TokenBucket;
use dashmap::DashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Errors produced by the rate limiter.
#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("rate and burst must be positive (rate={rate}, burst={burst})")]
    InvalidLimits { rate: f64, burst: u32 },

    #[error("wait cancelled by shutdown")]
    WaitCancelled,
}

/// Configured limits for one client.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClientLimits {
    pub rate: f64,
    pub burst: u32,
}

/// Token-bucket rate limiter keyed by client identity.
///
/// Buckets materialise lazily on first observation of a client, seeded
/// from the defaults or from that client's stored limits.
pub struct RateLimiter {
    default_rate: f64,
    default_burst: u32,
    limits: DashMap<String, ClientLimits>,
    buckets: DashMap<String, Mutex<TokenBucket>>,
    /// Serialises set/update/delete so limits and bucket move together.
    admin_guard: Mutex<()>,
}

impl RateLimiter {
    /// Create a limiter with the given defaults.
    pub fn new(default_rate: f64, default_burst: u32) -> Self {
        info!(
            default_rate,
            default_burst, "initializing token bucket rate limiter"
        );

        Self {
            default_rate,
            default_burst,
            limits: DashMap::new(),
            buckets: DashMap::new(),
            admin_guard: Mutex::new(()),
        }
    }

    /// Non-blocking admission check. Consumes one token when admitted.
    pub fn allow(&self, client_id: &str) -> bool {
        let allowed = self.with_bucket(client_id, TokenBucket::try_consume);

        if !allowed {
            let limits = self.get_client_limits(client_id);
            debug!(
                client_id,
                rate = limits.rate,
                burst = limits.burst,
                "rate limit exceeded"
            );
        }

        allowed
    }

    /// Block until a token is available or shutdown fires.
    ///
    /// Returns the elapsed wait on success.
    pub async fn wait(
        &self,
        client_id: &str,
        cancel: &mut broadcast::Receiver<()>,
    ) -> Result<Duration, RateLimitError> {
        let start = Instant::now();
        let delay = self.reserve(client_id);

        if !delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.recv() => return Err(RateLimitError::WaitCancelled),
            }
        }

        Ok(start.elapsed())
    }

    /// Reserve a token and return the delay until it is available.
    pub fn reserve(&self, client_id: &str) -> Duration {
        self.with_bucket(client_id, TokenBucket::reserve)
    }

    /// Current accumulated tokens for a client.
    pub fn get_tokens(&self, client_id: &str) -> f64 {
        self.with_bucket(client_id, TokenBucket::tokens)
    }

    /// Effective refill rate for a client.
    pub fn get_rate(&self, client_id: &str) -> f64 {
        self.get_client_limits(client_id).rate
    }

    /// Effective burst capacity for a client.
    pub fn get_burst(&self, client_id: &str) -> u32 {
        self.get_client_limits(client_id).burst
    }

    /// Stored limits for a client, or the defaults when none are stored.
    ///
    /// Never materialises storage for the client.
    pub fn get_client_limits(&self, client_id: &str) -> ClientLimits {
        self.limits
            .get(client_id)
            .map(|entry| *entry.value())
            .unwrap_or(ClientLimits {
                rate: self.default_rate,
                burst: self.default_burst,
            })
    }

    /// Store limits for a client and replace its bucket.
    pub fn set_client_limits(
        &self,
        client_id: &str,
        rate: f64,
        burst: u32,
    ) -> Result<(), RateLimitError> {
        validate_limits(rate, burst)?;

        let _guard = self.admin_guard.lock().unwrap_or_else(PoisonError::into_inner);

        self.limits
            .insert(client_id.to_string(), ClientLimits { rate, burst });
        self.buckets
            .insert(client_id.to_string(), Mutex::new(TokenBucket::new(rate, burst)));

        info!(client_id, rate, burst, "client rate limits set");
        Ok(())
    }

    /// Read the client's current (or default) limits, apply the mutator,
    /// store the result, and replace the bucket.
    pub fn update_client_limits<F>(&self, client_id: &str, update: F) -> Result<(), RateLimitError>
    where
        F: FnOnce(&mut ClientLimits),
    {
        let _guard = self.admin_guard.lock().unwrap_or_else(PoisonError::into_inner);

        let mut limits = self.get_client_limits(client_id);
        update(&mut limits);
        validate_limits(limits.rate, limits.burst)?;

        self.limits.insert(client_id.to_string(), limits);
        self.buckets.insert(
            client_id.to_string(),
            Mutex::new(TokenBucket::new(limits.rate, limits.burst)),
        );

        info!(
            client_id,
            rate = limits.rate,
            burst = limits.burst,
            "client rate limits updated"
        );
        Ok(())
    }

    /// Remove a client's limits and bucket. The next observation falls
    /// back to the defaults.
    pub fn delete_client_limits(&self, client_id: &str) {
        let _guard = self.admin_guard.lock().unwrap_or_else(PoisonError::into_inner);

        self.limits.remove(client_id);
        self.buckets.remove(client_id);

        info!(client_id, "client rate limits deleted");
    }

    /// Run an operation against the client's bucket, creating it on first
    /// use. Concurrent first observations race benignly: the map admits
    /// one bucket and every caller operates on the winner.
    fn with_bucket<T>(&self, client_id: &str, op: impl FnOnce(&mut TokenBucket) -> T) -> T {
        if let Some(entry) = self.buckets.get(client_id) {
            let mut bucket = entry.lock().unwrap_or_else(PoisonError::into_inner);
            return op(&mut bucket);
        }

        let entry = self.buckets.entry(client_id.to_string()).or_insert_with(|| {
            let limits = self.get_client_limits(client_id);
            debug!(
                client_id,
                rate = limits.rate,
                burst = limits.burst,
                "created rate limiter bucket for client"
            );
            Mutex::new(TokenBucket::new(limits.rate, limits.burst))
        });

        let mut bucket = entry.lock().unwrap_or_else(PoisonError::into_inner);
        op(&mut bucket)
    }
}

fn validate_limits(rate: f64, burst: u32) -> Result<(), RateLimitError> {
    if rate <= 0.0 || burst == 0 {
        return Err(RateLimitError::InvalidLimits { rate, burst });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_within_burst() {
        let limiter = RateLimiter::new(1.0, 3);

        assert!(limiter.allow("alice"));
        assert!(limiter.allow("alice"));
        assert!(limiter.allow("alice"));
        assert!(!limiter.allow("alice"));
    }

    #[test]
    fn test_clients_have_independent_buckets() {
        let limiter = RateLimiter::new(1.0, 1);

        assert!(limiter.allow("alice"));
        assert!(!limiter.allow("alice"));
        assert!(limiter.allow("bob"));
    }

    #[test]
    fn test_get_client_limits_defaults() {
        let limiter = RateLimiter::new(100.0, 50);

        let limits = limiter.get_client_limits("unknown");
        assert_eq!(limits.rate, 100.0);
        assert_eq!(limits.burst, 50);
    }

    #[test]
    fn test_get_client_limits_does_not_materialise() {
        let limiter = RateLimiter::new(100.0, 50);

        limiter.get_client_limits("peek");
        assert!(limiter.buckets.get("peek").is_none());
        assert!(limiter.limits.get("peek").is_none());
    }

    #[test]
    fn test_set_then_get_roundtrip() {
        let limiter = RateLimiter::new(100.0, 50);

        limiter.set_client_limits("alice", 5.0, 10).unwrap();

        let limits = limiter.get_client_limits("alice");
        assert_eq!(limits, ClientLimits { rate: 5.0, burst: 10 });
        assert_eq!(limiter.get_rate("alice"), 5.0);
        assert_eq!(limiter.get_burst("alice"), 10);
    }

    #[test]
    fn test_set_replaces_bucket() {
        let limiter = RateLimiter::new(100.0, 50);

        // Exhaust a small custom bucket, then replace it with a larger one.
        limiter.set_client_limits("alice", 1.0, 1).unwrap();
        assert!(limiter.allow("alice"));
        assert!(!limiter.allow("alice"));

        limiter.set_client_limits("alice", 1.0, 2).unwrap();
        assert!(limiter.allow("alice"));
        assert!(limiter.allow("alice"));
        assert!(!limiter.allow("alice"));
    }

    #[test]
    fn test_set_rejects_invalid_limits() {
        let limiter = RateLimiter::new(100.0, 50);

        assert!(limiter.set_client_limits("alice", 0.0, 10).is_err());
        assert!(limiter.set_client_limits("alice", 1.0, 0).is_err());
        assert!(limiter.limits.get("alice").is_none());
    }

    #[test]
    fn test_update_applies_mutator() {
        let limiter = RateLimiter::new(100.0, 50);

        limiter
            .update_client_limits("alice", |limits| {
                limits.rate = 2.0;
                limits.burst = 4;
            })
            .unwrap();

        let limits = limiter.get_client_limits("alice");
        assert_eq!(limits, ClientLimits { rate: 2.0, burst: 4 });
    }

    #[test]
    fn test_update_starts_from_defaults() {
        let limiter = RateLimiter::new(100.0, 50);

        limiter
            .update_client_limits("alice", |limits| {
                limits.burst = 7;
            })
            .unwrap();

        let limits = limiter.get_client_limits("alice");
        assert_eq!(limits.rate, 100.0);
        assert_eq!(limits.burst, 7);
    }

    #[test]
    fn test_delete_restores_defaults() {
        let limiter = RateLimiter::new(100.0, 50);

        limiter.set_client_limits("alice", 5.0, 10).unwrap();
        limiter.delete_client_limits("alice");

        let limits = limiter.get_client_limits("alice");
        assert_eq!(limits, ClientLimits { rate: 100.0, burst: 50 });
        assert!(limiter.buckets.get("alice").is_none());
    }

    #[test]
    fn test_get_tokens_reflects_consumption() {
        let limiter = RateLimiter::new(1.0, 5);

        assert!(limiter.allow("alice"));
        let tokens = limiter.get_tokens("alice");
        assert!(tokens >= 4.0 && tokens < 5.0);
    }

    #[test]
    fn test_reserve_borrows_ahead() {
        let limiter = RateLimiter::new(10.0, 1);

        assert_eq!(limiter.reserve("alice"), Duration::ZERO);
        let delay = limiter.reserve("alice");
        assert!(delay > Duration::ZERO);
    }

    #[tokio::test]
    async fn test_wait_returns_quickly_with_tokens() {
        let limiter = RateLimiter::new(1.0, 1);
        let (_tx, mut rx) = broadcast::channel(1);

        let waited = limiter.wait("alice", &mut rx).await.unwrap();
        assert!(waited < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_wait_blocks_until_refill() {
        let limiter = RateLimiter::new(100.0, 1);
        let (_tx, mut rx) = broadcast::channel(1);

        assert!(limiter.allow("alice"));
        let waited = limiter.wait("alice", &mut rx).await.unwrap();

        // One token at 100/s comes due in about 10ms.
        assert!(waited >= Duration::from_millis(5));
    }

    #[tokio::test]
    async fn test_wait_cancelled_by_shutdown() {
        let limiter = RateLimiter::new(0.001, 1);
        let (tx, mut rx) = broadcast::channel(1);

        // Exhaust the bucket so the next wait would block for a long time.
        assert!(limiter.allow("alice"));

        let _ = tx.send(());
        let result = limiter.wait("alice", &mut rx).await;
        assert!(matches!(result, Err(RateLimitError::WaitCancelled)));
    }

    #[test]
    fn test_concurrent_first_observation() {
        use std::sync::Arc;

        let limiter = Arc::new(RateLimiter::new(1000.0, 1000));
        let mut handles = Vec::new();

        for _ in 0..8 {
            let limiter = Arc::clone(&limiter);
            handles.push(std::thread::spawn(move || {
                for _ in 0..10 {
                    assert!(limiter.allow("shared"));
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        // 80 admissions against a single installed bucket of 1000.
        let tokens = limiter.get_tokens("shared");
        assert!(tokens <= 1000.0 - 80.0 + 1.0);
    }
}
