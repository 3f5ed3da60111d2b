//! Token bucket with continuous refill.

use std::time::{Duration, Instant};

/// A token bucket that allows controlled bursts while enforcing an average
/// rate.
///
/// Tokens accumulate at `rate` per second up to `burst`. Admission consumes
/// one token. Tokens are fractional internally; refill is computed lazily
/// from the elapsed time on each operation.
#[derive(Debug)]
pub struct TokenBucket {
    tokens: f64,
    rate: f64,
    burst: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a bucket starting at full capacity.
    pub fn new(rate: f64, burst: u32) -> Self {
        Self {
            tokens: f64::from(burst),
            rate,
            burst: f64::from(burst),
            last_refill: Instant::now(),
        }
    }

    /// Add tokens for the time elapsed since the last refill.
    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.burst);
        self.last_refill = now;
    }

    /// Consume one token if available. Never consumes on denial.
    pub fn try_consume(&mut self) -> bool {
        self.refill(Instant::now());

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Consume one token unconditionally, borrowing from future refill if
    /// necessary, and return the delay until the token is actually
    /// available.
    pub fn reserve(&mut self) -> Duration {
        self.refill(Instant::now());
        self.tokens -= 1.0;

        if self.tokens >= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(-self.tokens / self.rate)
        }
    }

    /// Current accumulated tokens, after refill.
    pub fn tokens(&mut self) -> f64 {
        self.refill(Instant::now());
        self.tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_then_denial() {
        let mut bucket = TokenBucket::new(1.0, 3);

        assert!(bucket.try_consume());
        assert!(bucket.try_consume());
        assert!(bucket.try_consume());
        assert!(!bucket.try_consume());
    }

    #[test]
    fn test_denial_does_not_consume() {
        let mut bucket = TokenBucket::new(100.0, 1);

        assert!(bucket.try_consume());
        assert!(!bucket.try_consume());

        // Fractional balance stays non-negative after a denial.
        assert!(bucket.tokens() >= 0.0);
    }

    #[test]
    fn test_refill_restores_tokens() {
        let mut bucket = TokenBucket::new(1000.0, 2);

        assert!(bucket.try_consume());
        assert!(bucket.try_consume());
        assert!(!bucket.try_consume());

        // At 1000 tokens/s one token is back within a few milliseconds.
        std::thread::sleep(Duration::from_millis(5));
        assert!(bucket.try_consume());
    }

    #[test]
    fn test_refill_caps_at_burst() {
        let mut bucket = TokenBucket::new(1000.0, 5);

        std::thread::sleep(Duration::from_millis(20));
        assert!(bucket.tokens() <= 5.0);
    }

    #[test]
    fn test_reserve_immediate_when_tokens_available() {
        let mut bucket = TokenBucket::new(1.0, 1);
        assert_eq!(bucket.reserve(), Duration::ZERO);
    }

    #[test]
    fn test_reserve_returns_delay_when_exhausted() {
        let mut bucket = TokenBucket::new(10.0, 1);

        assert!(bucket.try_consume());
        let delay = bucket.reserve();

        // One borrowed token at 10/s comes due in about 100ms.
        assert!(delay > Duration::from_millis(50));
        assert!(delay <= Duration::from_millis(150));
    }

    #[test]
    fn test_tokens_reports_fractional_balance() {
        let mut bucket = TokenBucket::new(1.0, 2);

        assert!(bucket.try_consume());
        let tokens = bucket.tokens();
        assert!(tokens >= 1.0 && tokens < 2.0);
    }
}
