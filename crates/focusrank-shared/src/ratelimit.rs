//! Per-actor token bucket.
//!
//! Buckets refill lazily on each check; there is no background timer. Bucket
//! state lives behind [`BucketStore`]. The default [`MemoryBuckets`] store is
//! process-local, so two server instances each enforce their own limit. A
//! deployment with several instances needs a shared store behind the same
//! trait.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::constants::{DEFAULT_CHAT_BURST, DEFAULT_CHAT_RATE_PER_SEC};

#[derive(Debug, Clone)]
pub struct TokenBucket {
    pub tokens: f64,
    pub last_refill: Instant,
}

impl TokenBucket {
    pub fn full(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_refill: now,
        }
    }

    fn try_consume(&mut self, now: Instant, rate: f64, capacity: f64) -> bool {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.last_refill = now;

        self.tokens = (self.tokens + elapsed * rate).min(capacity);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Storage backend for token buckets.
pub trait BucketStore: Send + Sync {
    /// Run `f` on the actor's bucket, inserting `init` first if the actor has
    /// none. The read-modify-write must be atomic per actor.
    fn update(
        &self,
        actor: &str,
        init: TokenBucket,
        f: &mut dyn FnMut(&mut TokenBucket) -> bool,
    ) -> bool;

    /// Drop buckets untouched for longer than `max_idle`. Returns how many
    /// were removed.
    fn purge_idle(&self, now: Instant, max_idle: Duration) -> usize;
}

#[derive(Default)]
pub struct MemoryBuckets {
    buckets: Mutex<HashMap<String, TokenBucket>>,
}

impl MemoryBuckets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buckets.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BucketStore for MemoryBuckets {
    fn update(
        &self,
        actor: &str,
        init: TokenBucket,
        f: &mut dyn FnMut(&mut TokenBucket) -> bool,
    ) -> bool {
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        let bucket = buckets.entry(actor.to_string()).or_insert(init);
        f(bucket)
    }

    fn purge_idle(&self, now: Instant, max_idle: Duration) -> usize {
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        let before = buckets.len();
        buckets.retain(|_, bucket| now.saturating_duration_since(bucket.last_refill) < max_idle);
        before - buckets.len()
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn BucketStore>,
    rate: f64,
    capacity: f64,
}

impl RateLimiter {
    pub fn new(rate: f64, capacity: f64) -> Self {
        Self::with_store(rate, capacity, Arc::new(MemoryBuckets::new()))
    }

    pub fn with_store(rate: f64, capacity: f64, store: Arc<dyn BucketStore>) -> Self {
        Self {
            store,
            rate,
            capacity,
        }
    }

    pub fn allow(&self, actor: &str) -> bool {
        self.allow_at(actor, Instant::now())
    }

    /// Check against an explicit clock reading.
    pub fn allow_at(&self, actor: &str, now: Instant) -> bool {
        let (rate, capacity) = (self.rate, self.capacity);
        self.store.update(
            actor,
            TokenBucket::full(capacity, now),
            &mut |bucket| bucket.try_consume(now, rate, capacity),
        )
    }

    pub fn purge_stale(&self, max_idle: Duration) -> usize {
        self.store.purge_idle(Instant::now(), max_idle)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_CHAT_RATE_PER_SEC, DEFAULT_CHAT_BURST)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_then_refill() {
        let limiter = RateLimiter::new(1.0, 5.0);
        let start = Instant::now();

        for i in 0..5 {
            let at = start + Duration::from_millis(i * 100);
            assert!(limiter.allow_at("alice", at), "call {i} should pass");
        }
        assert!(!limiter.allow_at("alice", start + Duration::from_millis(500)));

        // The denied call left 0.5 tokens; 900ms more brings it to 1.4.
        let later = start + Duration::from_millis(1400);
        assert!(limiter.allow_at("alice", later));
        assert!(!limiter.allow_at("alice", later));
    }

    #[test]
    fn test_exactly_one_more_after_one_second() {
        let limiter = RateLimiter::new(1.0, 5.0);
        let start = Instant::now();

        for _ in 0..5 {
            assert!(limiter.allow_at("bob", start));
        }
        assert!(!limiter.allow_at("bob", start));

        let later = start + Duration::from_secs(1);
        assert!(limiter.allow_at("bob", later));
        assert!(!limiter.allow_at("bob", later));
    }

    #[test]
    fn test_actors_are_isolated() {
        let limiter = RateLimiter::new(1.0, 2.0);
        let now = Instant::now();

        assert!(limiter.allow_at("a", now));
        assert!(limiter.allow_at("a", now));
        assert!(!limiter.allow_at("a", now));

        assert!(limiter.allow_at("b", now));
    }

    #[test]
    fn test_refill_is_capped() {
        let limiter = RateLimiter::new(10.0, 3.0);
        let start = Instant::now();
        assert!(limiter.allow_at("c", start));

        let much_later = start + Duration::from_secs(3600);
        for _ in 0..3 {
            assert!(limiter.allow_at("c", much_later));
        }
        assert!(!limiter.allow_at("c", much_later));
    }

    #[test]
    fn test_purge_stale() {
        let store = Arc::new(MemoryBuckets::new());
        let limiter = RateLimiter::with_store(1.0, 5.0, store.clone());
        assert!(limiter.allow("d"));
        assert_eq!(store.len(), 1);

        assert_eq!(limiter.purge_stale(Duration::ZERO), 1);
        assert!(store.is_empty());
    }
}
