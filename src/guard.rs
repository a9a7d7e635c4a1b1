//! Inbound rate-limit guard
//!
//! Each connection's reader owns one token bucket.

use std::time::Instant;

use crate::config::RateLimitConfig;

#[derive(Debug, Clone)]
pub struct RateLimiter {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last: Instant,
}

impl RateLimiter {
    /// Build a limiter, or None when the config disables limiting
    pub fn new(config: RateLimitConfig) -> Option<Self> {
        if config.burst == 0 || config.per_second == 0 {
            return None;
        }
        Some(Self {
            capacity: f64::from(config.burst),
            tokens: f64::from(config.burst),
            refill_per_sec: f64::from(config.per_second),
            last: Instant::now(),
        })
    }

    /// Take one token if available
    pub fn allow(&mut self) -> bool {
        self.allow_at(Instant::now())
    }

    fn allow_at(&mut self, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last).as_secs_f64();
        if elapsed > 0.0 {
            self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
            self.last = now;
        }
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}
