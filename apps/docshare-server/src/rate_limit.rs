//! Per-client token bucket rate limiting
//!
//! Each client key gets a bucket holding up to `max_requests` tokens that
//! refills continuously over the configured window. A request takes one
//! token; an empty bucket means the request is refused.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use crate::config::RateLimitRule;

/// Bucket count above which idle (full) buckets are swept
const SWEEP_THRESHOLD: usize = 10_000;

struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: f64, now: Instant) -> Self {
        TokenBucket {
            tokens: capacity,
            last_refill: now,
        }
    }

    fn refill(&mut self, capacity: f64, refill_per_sec: f64, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * refill_per_sec).min(capacity);
        self.last_refill = now;
    }

    fn take(&mut self, capacity: f64, refill_per_sec: f64, now: Instant) -> bool {
        self.refill(capacity, refill_per_sec, now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Shared limiter; clones refer to the same set of buckets
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<RateLimiterInner>,
}

struct RateLimiterInner {
    capacity: f64,
    refill_per_sec: f64,
    buckets: Mutex<HashMap<String, TokenBucket>>,
}

impl RateLimiter {
    /// Build a limiter for `rule`, or `None` when the rule is disabled
    pub fn new(rule: RateLimitRule) -> Option<Self> {
        if !rule.is_enabled() {
            return None;
        }

        let capacity = f64::from(rule.max_requests);
        Some(Self {
            inner: Arc::new(RateLimiterInner {
                capacity,
                refill_per_sec: capacity / rule.window_secs as f64,
                buckets: Mutex::new(HashMap::new()),
            }),
        })
    }

    /// Take a token for `key`; `false` means the client is over its budget
    pub fn check(&self, key: &str) -> bool {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> bool {
        let inner = &*self.inner;
        let (capacity, refill_per_sec) = (inner.capacity, inner.refill_per_sec);
        let mut buckets = inner.buckets.lock().unwrap_or_else(PoisonError::into_inner);

        if buckets.len() >= SWEEP_THRESHOLD && !buckets.contains_key(key) {
            buckets.retain(|_, bucket| {
                bucket.refill(capacity, refill_per_sec, now);
                bucket.tokens < capacity
            });
        }

        buckets
            .entry(key.to_string())
            .or_insert_with(|| TokenBucket::new(capacity, now))
            .take(capacity, refill_per_sec, now)
    }

    #[cfg(test)]
    fn tracked_clients(&self) -> usize {
        self.inner
            .buckets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
