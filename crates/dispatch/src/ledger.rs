//! Delivery ledger — the authoritative store of delivery records. Records
//! are created by the dispatcher and transitioned by the tracker; a record
//! in a terminal state never changes again, which is what makes outcome
//! replays safe.

use chrono::Utc;
use courier_core::types::{
    Channel, ChannelStats, DeliveryRecord, DeliveryStatus, OutcomeStatus,
};
use dashmap::DashMap;
use std::collections::HashMap;
use uuid::Uuid;

/// Result of attempting a status transition.
#[derive(Debug, Clone)]
pub struct TransitionResult {
    /// False when the record was already terminal (replayed event).
    pub applied: bool,
    pub record: DeliveryRecord,
}

pub struct DeliveryLedger {
    records: DashMap<Uuid, DeliveryRecord>,
    by_campaign: DashMap<Uuid, Vec<Uuid>>,
    by_customer: DashMap<String, Vec<Uuid>>,
    suppression_samples: DashMap<Uuid, Vec<String>>,
    channel_stats: DashMap<Channel, ChannelStats>,
    suppression_sample_cap: usize,
}

impl DeliveryLedger {
    pub fn new(suppression_sample_cap: usize) -> Self {
        Self {
            records: DashMap::new(),
            by_campaign: DashMap::new(),
            by_customer: DashMap::new(),
            suppression_samples: DashMap::new(),
            channel_stats: DashMap::new(),
            suppression_sample_cap,
        }
    }

    fn index(&self, record: &DeliveryRecord) {
        self.by_campaign
            .entry(record.campaign_id)
            .or_default()
            .push(record.message_id);
        self.by_customer
            .entry(record.customer_id.clone())
            .or_default()
            .push(record.message_id);
    }

    /// Record a message handed to a gateway. Status starts at `Sent`.
    pub fn record_sent(&self, record: DeliveryRecord) {
        debug_assert_eq!(record.status, DeliveryStatus::Sent);
        if let Some(channel) = record.channel {
            self.channel_stats
                .entry(channel)
                .or_default()
                .total_sent += 1;
        }
        self.index(&record);
        self.records.insert(record.message_id, record);
    }

    /// Record a dispatch that terminated without a send.
    pub fn record_suppressed(
        &self,
        campaign_id: Uuid,
        customer_id: &str,
        channel: Option<Channel>,
        reason: &str,
    ) -> DeliveryRecord {
        let now = Utc::now();
        let record = DeliveryRecord {
            message_id: Uuid::new_v4(),
            campaign_id,
            customer_id: customer_id.to_string(),
            channel,
            status: DeliveryStatus::Suppressed,
            cost: 0.0,
            retry_count: 0,
            failure_reason: Some(reason.to_string()),
            queued_at: now,
            sent_at: None,
            terminal_at: Some(now),
            updated_at: now,
        };

        let mut samples = self.suppression_samples.entry(campaign_id).or_default();
        if samples.len() < self.suppression_sample_cap {
            samples.push(reason.to_string());
        }
        drop(samples);

        self.index(&record);
        self.records.insert(record.message_id, record.clone());
        record
    }

    /// Apply a delivery outcome to a record. Terminal records are left
    /// untouched and reported as not-applied; unknown ids return `None`.
    pub fn apply_outcome(
        &self,
        message_id: Uuid,
        status: OutcomeStatus,
        reason: Option<&str>,
        cost: f64,
    ) -> Option<TransitionResult> {
        let mut entry = self.records.get_mut(&message_id)?;

        if entry.status.is_terminal() {
            return Some(TransitionResult {
                applied: false,
                record: entry.clone(),
            });
        }

        let now = Utc::now();
        entry.status = match status {
            OutcomeStatus::Delivered => DeliveryStatus::Delivered,
            OutcomeStatus::Bounced => DeliveryStatus::Bounced,
            OutcomeStatus::Failed => DeliveryStatus::Failed,
        };
        entry.failure_reason = reason.map(|r| r.to_string());
        if cost > 0.0 {
            entry.cost = cost;
        }
        entry.terminal_at = Some(now);
        entry.updated_at = now;

        if let Some(channel) = entry.channel {
            let mut stats = self.channel_stats.entry(channel).or_default();
            match entry.status {
                DeliveryStatus::Delivered => stats.total_delivered += 1,
                DeliveryStatus::Bounced => stats.total_bounced += 1,
                DeliveryStatus::Failed => stats.total_failed += 1,
                _ => {}
            }
        }

        Some(TransitionResult {
            applied: true,
            record: entry.clone(),
        })
    }

    pub fn get(&self, message_id: Uuid) -> Option<DeliveryRecord> {
        self.records.get(&message_id).map(|r| r.clone())
    }

    /// Counts by status for one campaign.
    pub fn campaign_counts(&self, campaign_id: Uuid) -> HashMap<DeliveryStatus, usize> {
        let mut counts = HashMap::new();
        if let Some(ids) = self.by_campaign.get(&campaign_id) {
            for id in ids.iter() {
                if let Some(record) = self.records.get(id) {
                    *counts.entry(record.status).or_insert(0) += 1;
                }
            }
        }
        counts
    }

    pub fn campaign_records(&self, campaign_id: Uuid) -> Vec<DeliveryRecord> {
        self.by_campaign
            .get(&campaign_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.records.get(id).map(|r| r.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Sampled suppression reasons retained for audit.
    pub fn suppression_sample(&self, campaign_id: Uuid) -> Vec<String> {
        self.suppression_samples
            .get(&campaign_id)
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Delivery history for a customer, most recent first.
    pub fn customer_history(&self, customer_id: &str, limit: usize) -> Vec<DeliveryRecord> {
        let mut records: Vec<DeliveryRecord> = self
            .by_customer
            .get(customer_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.records.get(id).map(|r| r.clone()))
                    .collect()
            })
            .unwrap_or_default();
        records.sort_by(|a, b| b.queued_at.cmp(&a.queued_at));
        records.truncate(limit);
        records
    }

    pub fn channel_stats(&self, channel: Channel) -> ChannelStats {
        self.channel_stats
            .get(&channel)
            .map(|s| s.clone())
            .unwrap_or_default()
    }
}
