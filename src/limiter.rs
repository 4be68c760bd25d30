//! Per-provider admission control
//!
//! Token buckets sized from each provider's configured budget, refilled
//! continuously. A denied request never reaches the network; the fallback
//! loop treats it as an immediate local failure, which is cheaper than
//! waiting for the provider to return HTTP 429.

use crate::registry::Registry;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    capacity: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(capacity: u32, period: Duration) -> Self {
        let capacity = f64::from(capacity);
        Self {
            tokens: capacity,
            capacity,
            refill_per_sec: capacity / period.as_secs_f64(),
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
    }

    fn try_take(&mut self, now: Instant) -> bool {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn peek(&mut self, now: Instant) -> bool {
        self.refill(now);
        self.tokens >= 1.0
    }
}

#[derive(Debug)]
struct ProviderBuckets {
    minute: Bucket,
    day: Option<Bucket>,
}

/// Non-blocking token-bucket limiter, one bucket pair per provider.
///
/// Each provider's buckets sit behind their own mutex so unrelated
/// providers never serialize on each other, and a check-and-spend is
/// atomic under that lock: concurrent callers cannot double-spend a
/// token.
#[derive(Debug)]
pub struct RateLimiter {
    buckets: HashMap<String, Mutex<ProviderBuckets>>,
}

impl RateLimiter {
    /// Build buckets for every registered provider
    #[must_use]
    pub fn from_registry(registry: &Registry) -> Self {
        let buckets = registry
            .list()
            .iter()
            .map(|descriptor| {
                let pair = ProviderBuckets {
                    minute: Bucket::new(descriptor.requests_per_minute, Duration::from_secs(60)),
                    day: descriptor
                        .requests_per_day
                        .map(|quota| Bucket::new(quota, Duration::from_secs(86_400))),
                };
                (descriptor.name.clone(), Mutex::new(pair))
            })
            .collect();
        Self { buckets }
    }

    /// Admit or deny a request for `provider`. Never blocks; spends one
    /// token from each configured budget on admission. Unknown providers
    /// are denied.
    #[must_use]
    pub fn allow(&self, provider: &str) -> bool {
        let Some(pair) = self.buckets.get(provider) else {
            return false;
        };
        let mut pair = pair.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let now = Instant::now();

        // The minute token must not be spent when the day budget is empty.
        if let Some(day) = pair.day.as_mut() {
            if !day.peek(now) {
                return false;
            }
        }
        if !pair.minute.try_take(now) {
            return false;
        }
        if let Some(day) = pair.day.as_mut() {
            day.tokens -= 1.0;
        }
        true
    }
}
