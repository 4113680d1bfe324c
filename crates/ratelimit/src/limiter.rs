//! Per-channel admission control. Wraps the bucket store behind the
//! `try_acquire` contract and fails closed when the store is unreachable.

use crate::bucket::{Acquisition, BucketSettings};
use crate::store::BucketStore;
use chrono::Utc;
use courier_core::config::RateLimitConfig;
use courier_core::types::Channel;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Throughput snapshot for one channel.
#[derive(Debug, Clone, Serialize)]
pub struct ThroughputStats {
    pub channel: Channel,
    pub available_tokens: f64,
    pub burst_capacity: f64,
    pub rate_per_sec: f64,
    pub utilization_percent: f64,
}

/// Token-bucket admission control shared by all dispatch workers.
pub struct RateLimiter {
    store: Arc<dyn BucketStore>,
    sms: BucketSettings,
    whatsapp: BucketSettings,
    email: BucketSettings,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig, store: Arc<dyn BucketStore>) -> Self {
        tracing::info!(
            sms_rate = config.sms.rate_per_sec,
            whatsapp_rate = config.whatsapp.rate_per_sec,
            email_rate = config.email.rate_per_sec,
            "rate limiter initialized"
        );
        Self {
            store,
            sms: BucketSettings::new(config.sms.rate_per_sec, config.sms.burst_capacity),
            whatsapp: BucketSettings::new(
                config.whatsapp.rate_per_sec,
                config.whatsapp.burst_capacity,
            ),
            email: BucketSettings::new(config.email.rate_per_sec, config.email.burst_capacity),
        }
    }

    fn settings(&self, channel: Channel) -> &BucketSettings {
        match channel {
            Channel::Sms => &self.sms,
            Channel::WhatsApp => &self.whatsapp,
            Channel::Email => &self.email,
        }
    }

    fn key(channel: Channel) -> &'static str {
        match channel {
            Channel::Sms => "sms",
            Channel::WhatsApp => "whatsapp",
            Channel::Email => "email",
        }
    }

    /// Try to acquire `n` tokens for a channel. A store failure denies the
    /// acquisition: an unreachable store must bound sends, never allow
    /// unbounded ones. No internal retries; callers decide whether to wait.
    pub fn try_acquire(&self, channel: Channel, n: u32) -> Acquisition {
        let settings = self.settings(channel);
        match self
            .store
            .try_consume(Self::key(channel), settings, f64::from(n), Utc::now())
        {
            Ok(acq) => {
                if !acq.allowed {
                    tracing::warn!(
                        channel = channel.display_name(),
                        retry_after_ms = acq.retry_after.map(|d| d.as_millis() as u64),
                        "rate limit reached"
                    );
                    metrics::counter!(
                        "ratelimit.denied",
                        "channel" => channel.display_name()
                    )
                    .increment(1);
                }
                acq
            }
            Err(err) => {
                tracing::error!(
                    channel = channel.display_name(),
                    error = %err,
                    "bucket store unreachable, failing closed"
                );
                metrics::counter!(
                    "ratelimit.store_errors",
                    "channel" => channel.display_name()
                )
                .increment(1);
                let retry_after = if settings.rate_per_sec > 0.0 {
                    Duration::from_secs_f64(f64::from(n) / settings.rate_per_sec)
                } else {
                    Duration::from_secs(1)
                };
                Acquisition::denied(retry_after)
            }
        }
    }

    /// Tokens currently available for a channel (0 if the store is down).
    pub fn available_tokens(&self, channel: Channel) -> f64 {
        self.store
            .available(Self::key(channel), self.settings(channel), Utc::now())
            .unwrap_or(0.0)
    }

    pub fn stats(&self, channel: Channel) -> ThroughputStats {
        let settings = self.settings(channel);
        let available = self.available_tokens(channel);
        ThroughputStats {
            channel,
            available_tokens: available,
            burst_capacity: settings.burst_capacity,
            rate_per_sec: settings.rate_per_sec,
            utilization_percent: ((settings.burst_capacity - available)
                / settings.burst_capacity)
                * 100.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryBucketStore, UnavailableBucketStore};
    use courier_core::config::ChannelLimit;

    fn limiter_with(rate: f64, burst: f64) -> RateLimiter {
        let config = RateLimitConfig {
            sms: ChannelLimit {
                rate_per_sec: rate,
                burst_capacity: burst,
            },
            whatsapp: ChannelLimit {
                rate_per_sec: rate,
                burst_capacity: burst,
            },
            email: ChannelLimit {
                rate_per_sec: rate,
                burst_capacity: burst,
            },
            default_burst_multiplier: 5.0,
        };
        RateLimiter::new(&config, Arc::new(MemoryBucketStore::new()))
    }

    #[test]
    fn test_burst_of_five_then_denied() {
        let limiter = limiter_with(1.0, 5.0);
        for _ in 0..5 {
            assert!(limiter.try_acquire(Channel::Sms, 1).allowed);
        }
        let denied = limiter.try_acquire(Channel::Sms, 1);
        assert!(!denied.allowed);
        let retry = denied.retry_after.unwrap().as_secs_f64();
        assert!(retry > 0.9 && retry < 1.1, "retry_after was {retry}");
    }

    #[test]
    fn test_channels_do_not_share_budget() {
        let limiter = limiter_with(1.0, 1.0);
        assert!(limiter.try_acquire(Channel::WhatsApp, 1).allowed);
        assert!(!limiter.try_acquire(Channel::WhatsApp, 1).allowed);
        assert!(limiter.try_acquire(Channel::Sms, 1).allowed);
        assert!(limiter.try_acquire(Channel::Email, 1).allowed);
    }

    #[test]
    fn test_fails_closed_when_store_unreachable() {
        let config = RateLimitConfig::default();
        let limiter = RateLimiter::new(&config, Arc::new(UnavailableBucketStore));
        let acq = limiter.try_acquire(Channel::Sms, 1);
        assert!(!acq.allowed);
        assert!(acq.retry_after.is_some());
        assert_eq!(limiter.available_tokens(Channel::Sms), 0.0);
    }

    #[test]
    fn test_stats_report_utilization() {
        let limiter = limiter_with(10.0, 10.0);
        for _ in 0..5 {
            limiter.try_acquire(Channel::Email, 1);
        }
        let stats = limiter.stats(Channel::Email);
        assert_eq!(stats.burst_capacity, 10.0);
        assert!(stats.available_tokens <= 5.1);
        assert!(stats.utilization_percent >= 48.0);
    }
}
