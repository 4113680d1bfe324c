//! Customer profile store seam. Reads return a snapshot; writes go through
//! `update_profile` so each mutation is applied under the store's per-key
//! serialization. Sentiment freshness is the data store's responsibility.

use courier_core::error::{CourierError, CourierResult};
use courier_core::types::{Channel, CustomerChannelProfile};
use chrono::Utc;
use dashmap::DashMap;

/// Access to customer channel profiles. Engagement scores are written only
/// by the delivery tracker and send timestamps only by the fatigue engine;
/// this trait does not enforce that split, the callers do.
pub trait ProfileStore: Send + Sync {
    /// Snapshot of the profile at call time. Unknown customers get a fresh
    /// default profile.
    fn get_profile(&self, customer_id: &str) -> CourierResult<CustomerChannelProfile>;

    /// Apply a mutation to the stored profile. The closure runs against
    /// current store state, not against any snapshot the caller holds.
    fn update_profile(
        &self,
        customer_id: &str,
        update: &mut dyn FnMut(&mut CustomerChannelProfile),
    ) -> CourierResult<()>;

    fn save_profile(&self, profile: CustomerChannelProfile) -> CourierResult<()>;

    /// Mark a channel unreachable for a customer.
    fn set_do_not_send(&self, customer_id: &str, channel: Channel) -> CourierResult<()> {
        self.update_profile(customer_id, &mut |profile| {
            if !profile.do_not_send.contains(&channel) {
                profile.do_not_send.push(channel);
            }
        })
    }

    /// Explicit external override — the only way a do-not-send flag is
    /// ever cleared.
    fn clear_do_not_send(&self, customer_id: &str, channel: Channel) -> CourierResult<()> {
        self.update_profile(customer_id, &mut |profile| {
            profile.do_not_send.retain(|c| *c != channel);
        })
    }
}

/// In-process profile store backed by `DashMap`.
#[derive(Default)]
pub struct MemoryProfileStore {
    profiles: DashMap<String, CustomerChannelProfile>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self {
            profiles: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

impl ProfileStore for MemoryProfileStore {
    fn get_profile(&self, customer_id: &str) -> CourierResult<CustomerChannelProfile> {
        Ok(self
            .profiles
            .entry(customer_id.to_string())
            .or_insert_with(|| CustomerChannelProfile::new(customer_id))
            .clone())
    }

    fn update_profile(
        &self,
        customer_id: &str,
        update: &mut dyn FnMut(&mut CustomerChannelProfile),
    ) -> CourierResult<()> {
        let mut entry = self
            .profiles
            .entry(customer_id.to_string())
            .or_insert_with(|| CustomerChannelProfile::new(customer_id));
        update(entry.value_mut());
        entry.updated_at = Utc::now();
        Ok(())
    }

    fn save_profile(&self, profile: CustomerChannelProfile) -> CourierResult<()> {
        self.profiles.insert(profile.customer_id.clone(), profile);
        Ok(())
    }
}

/// Store double that reports every operation as unavailable, for
/// exercising the `infra-unavailable` dispatch path.
pub struct FailingProfileStore;

impl ProfileStore for FailingProfileStore {
    fn get_profile(&self, _customer_id: &str) -> CourierResult<CustomerChannelProfile> {
        Err(CourierError::ProfileStore("store offline".into()))
    }

    fn update_profile(
        &self,
        _customer_id: &str,
        _update: &mut dyn FnMut(&mut CustomerChannelProfile),
    ) -> CourierResult<()> {
        Err(CourierError::ProfileStore("store offline".into()))
    }

    fn save_profile(&self, _profile: CustomerChannelProfile) -> CourierResult<()> {
        Err(CourierError::ProfileStore("store offline".into()))
    }
}
