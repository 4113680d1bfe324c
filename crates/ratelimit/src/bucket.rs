//! Token-bucket arithmetic. Pure state transitions; the store layer owns
//! atomicity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Steady rate and burst capacity for one bucket.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BucketSettings {
    pub rate_per_sec: f64,
    pub burst_capacity: f64,
}

impl BucketSettings {
    pub fn new(rate_per_sec: f64, burst_capacity: f64) -> Self {
        Self {
            rate_per_sec,
            burst_capacity,
        }
    }
}

/// Result of one acquisition attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Acquisition {
    pub allowed: bool,
    /// When denied, how long until enough tokens will have refilled.
    pub retry_after: Option<Duration>,
}

impl Acquisition {
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            retry_after: None,
        }
    }

    pub fn denied(retry_after: Duration) -> Self {
        Self {
            allowed: false,
            retry_after: Some(retry_after),
        }
    }
}

/// One channel's bucket state. Tokens refill continuously at
/// `rate_per_sec` since `last_refill`, capped at `burst_capacity`;
/// the token count never leaves `[0, burst_capacity]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenBucket {
    pub tokens: f64,
    pub last_refill: DateTime<Utc>,
}

impl TokenBucket {
    /// A fresh bucket starts full.
    pub fn full(settings: &BucketSettings, now: DateTime<Utc>) -> Self {
        Self {
            tokens: settings.burst_capacity,
            last_refill: now,
        }
    }

    /// Apply continuous refill up to `now`.
    pub fn refill(&mut self, settings: &BucketSettings, now: DateTime<Utc>) {
        let elapsed = (now - self.last_refill).num_milliseconds().max(0) as f64 / 1000.0;
        self.tokens = (self.tokens + elapsed * settings.rate_per_sec).min(settings.burst_capacity);
        self.last_refill = now;
    }

    /// Refill, then consume `n` tokens if available. Denies with the time
    /// needed for the shortfall to refill otherwise.
    pub fn try_consume(
        &mut self,
        settings: &BucketSettings,
        n: f64,
        now: DateTime<Utc>,
    ) -> Acquisition {
        self.refill(settings, now);

        if self.tokens >= n {
            self.tokens -= n;
            Acquisition::allowed()
        } else {
            let shortfall = n - self.tokens;
            let retry_after = if settings.rate_per_sec > 0.0 {
                Duration::from_secs_f64(shortfall / settings.rate_per_sec)
            } else {
                Duration::from_secs(1)
            };
            Acquisition::denied(retry_after)
        }
    }
}
