//! Fatigue suppression — rolling-window cap on how often a customer is
//! contacted. Attempted contact is what drives fatigue, so timestamps are
//! appended per dispatch attempt regardless of the eventual delivery
//! outcome. Transactional overrides are asserted by the caller; this
//! engine never infers them.

use chrono::{DateTime, Duration, Utc};
use courier_core::config::FatigueConfig;
use courier_core::error::CourierResult;
use courier_core::types::CustomerChannelProfile;
use courier_gateways::ProfileStore;
use std::sync::Arc;

pub struct FatigueEngine {
    store: Arc<dyn ProfileStore>,
    window: Duration,
    max_sends: u32,
}

impl FatigueEngine {
    pub fn new(config: &FatigueConfig, store: Arc<dyn ProfileStore>) -> Self {
        Self {
            store,
            window: Duration::hours(i64::from(config.window_hours)),
            max_sends: config.max_sends_in_window,
        }
    }

    /// Check against the profile snapshot taken by the caller at decision
    /// time. Later writes may race this read; the worst case is one extra
    /// message before the window catches up, which is accepted.
    pub fn is_fatigued(&self, profile: &CustomerChannelProfile, now: DateTime<Utc>) -> bool {
        let count = self.count_in_window(profile, now);
        if count >= self.max_sends {
            tracing::info!(
                customer_id = %profile.customer_id,
                count,
                cap = self.max_sends,
                "customer fatigued"
            );
            return true;
        }
        false
    }

    /// Sends inside the rolling window for this snapshot.
    pub fn count_in_window(&self, profile: &CustomerChannelProfile, now: DateTime<Utc>) -> u32 {
        let window_start = now - self.window;
        profile
            .recent_sends
            .iter()
            .filter(|ts| **ts >= window_start)
            .count() as u32
    }

    /// Record one dispatch attempt. Prunes timestamps that have aged out
    /// of the window so the profile list stays bounded.
    pub fn record_attempt(&self, customer_id: &str, now: DateTime<Utc>) -> CourierResult<()> {
        let window_start = now - self.window;
        self.store.update_profile(customer_id, &mut |profile| {
            profile.recent_sends.retain(|ts| *ts >= window_start);
            profile.recent_sends.push(now);
        })?;
        metrics::counter!("fatigue.attempts_recorded").increment(1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_gateways::MemoryProfileStore;

    fn engine(store: Arc<MemoryProfileStore>) -> FatigueEngine {
        FatigueEngine::new(&FatigueConfig::default(), store)
    }

    #[test]
    fn test_under_cap_not_fatigued() {
        let store = Arc::new(MemoryProfileStore::new());
        let engine = engine(Arc::clone(&store));
        let now = Utc::now();

        engine.record_attempt("cust-1", now - Duration::hours(2)).unwrap();
        engine.record_attempt("cust-1", now - Duration::hours(1)).unwrap();

        let profile = store.get_profile("cust-1").unwrap();
        assert_eq!(engine.count_in_window(&profile, now), 2);
        assert!(!engine.is_fatigued(&profile, now));
    }

    #[test]
    fn test_at_cap_is_fatigued() {
        let store = Arc::new(MemoryProfileStore::new());
        let engine = engine(Arc::clone(&store));
        let now = Utc::now();

        for hours in 1..=3 {
            engine
                .record_attempt("cust-1", now - Duration::hours(hours))
                .unwrap();
        }

        let profile = store.get_profile("cust-1").unwrap();
        assert!(engine.is_fatigued(&profile, now));
    }

    #[test]
    fn test_old_sends_age_out_of_window() {
        let store = Arc::new(MemoryProfileStore::new());
        let engine = engine(Arc::clone(&store));
        let now = Utc::now();

        // Three sends yesterday-and-older, one recent.
        for hours in [25, 30, 48, 1] {
            engine
                .record_attempt("cust-1", now - Duration::hours(hours))
                .unwrap();
        }

        let profile = store.get_profile("cust-1").unwrap();
        assert_eq!(engine.count_in_window(&profile, now), 1);
        assert!(!engine.is_fatigued(&profile, now));
    }

    #[test]
    fn test_record_attempt_prunes_stale_timestamps() {
        let store = Arc::new(MemoryProfileStore::new());
        let engine = engine(Arc::clone(&store));
        let now = Utc::now();

        engine.record_attempt("cust-1", now - Duration::hours(48)).unwrap();
        engine.record_attempt("cust-1", now).unwrap();

        let profile = store.get_profile("cust-1").unwrap();
        assert_eq!(profile.recent_sends.len(), 1);
    }

    #[test]
    fn test_custom_cap() {
        let store = Arc::new(MemoryProfileStore::new());
        let config = FatigueConfig {
            window_hours: 24,
            max_sends_in_window: 1,
        };
        let engine = FatigueEngine::new(&config, Arc::clone(&store) as Arc<dyn ProfileStore>);
        let now = Utc::now();

        engine.record_attempt("cust-1", now).unwrap();
        let profile = store.get_profile("cust-1").unwrap();
        assert!(engine.is_fatigued(&profile, now));
    }
}
