//! Campaign submission surface — the orchestrator's API toward campaign
//! front ends: submit, query status, cancel.

use chrono::{DateTime, Utc};
use courier_core::error::{CourierError, CourierResult};
use courier_core::event_bus::{make_event, EventSink, EventType};
use courier_core::types::{Channel, DeliveryStatus, DispatchRequest, MessageClass};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::ledger::DeliveryLedger;
use crate::worker::DispatchQueue;

#[derive(Debug, Clone)]
pub struct CampaignMeta {
    pub candidates: Vec<Channel>,
    pub class: MessageClass,
    pub cancelled: bool,
    pub submitted: usize,
    pub submitted_at: DateTime<Utc>,
}

/// Registry of known campaigns and their cancellation state.
#[derive(Default)]
pub struct CampaignRegistry {
    campaigns: DashMap<Uuid, CampaignMeta>,
}

impl CampaignRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        campaign_id: Uuid,
        candidates: Vec<Channel>,
        class: MessageClass,
        submitted: usize,
    ) -> CourierResult<()> {
        if self.campaigns.contains_key(&campaign_id) {
            return Err(CourierError::Campaign(format!(
                "campaign {campaign_id} already submitted"
            )));
        }
        self.campaigns.insert(
            campaign_id,
            CampaignMeta {
                candidates,
                class,
                cancelled: false,
                submitted,
                submitted_at: Utc::now(),
            },
        );
        Ok(())
    }

    pub fn get(&self, campaign_id: Uuid) -> Option<CampaignMeta> {
        self.campaigns.get(&campaign_id).map(|m| m.clone())
    }

    pub fn is_cancelled(&self, campaign_id: Uuid) -> bool {
        self.campaigns
            .get(&campaign_id)
            .map(|m| m.cancelled)
            .unwrap_or(false)
    }

    pub fn cancel(&self, campaign_id: Uuid) -> CourierResult<()> {
        let mut meta = self.campaigns.get_mut(&campaign_id).ok_or_else(|| {
            CourierError::Campaign(format!("campaign {campaign_id} not found"))
        })?;
        meta.cancelled = true;
        Ok(())
    }
}

/// Per-campaign aggregate visible to the submitter: counts by terminal
/// status plus a sampled list of suppression reasons for audit.
#[derive(Debug, Clone, Serialize)]
pub struct CampaignStatusReport {
    pub campaign_id: Uuid,
    pub submitted: usize,
    pub cancelled: bool,
    pub counts: HashMap<DeliveryStatus, usize>,
    pub suppression_sample: Vec<String>,
}

pub struct CampaignService {
    queue: Arc<DispatchQueue>,
    ledger: Arc<DeliveryLedger>,
    registry: Arc<CampaignRegistry>,
    event_sink: Arc<dyn EventSink>,
}

impl CampaignService {
    pub fn new(
        queue: Arc<DispatchQueue>,
        ledger: Arc<DeliveryLedger>,
        registry: Arc<CampaignRegistry>,
        event_sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            queue,
            ledger,
            registry,
            event_sink,
        }
    }

    /// Accept a campaign: one dispatch request per customer is queued for
    /// the worker pool. Returns the number of requests accepted.
    pub fn submit_campaign(
        &self,
        campaign_id: Uuid,
        customer_ids: &[String],
        channel_candidates: Vec<Channel>,
        class: MessageClass,
    ) -> CourierResult<usize> {
        if channel_candidates.is_empty() {
            return Err(CourierError::Campaign(
                "campaign has no candidate channels".into(),
            ));
        }
        if customer_ids.is_empty() {
            return Err(CourierError::Campaign("campaign has no customers".into()));
        }

        self.registry.register(
            campaign_id,
            channel_candidates.clone(),
            class,
            customer_ids.len(),
        )?;

        let mut accepted = 0usize;
        for customer_id in customer_ids {
            let queued = self.queue.push(DispatchRequest {
                campaign_id,
                customer_id: customer_id.clone(),
                candidates: channel_candidates.clone(),
                class,
                retry_attempt: 0,
            });
            if queued {
                accepted += 1;
                self.event_sink.emit(make_event(
                    EventType::DispatchQueued,
                    Some(campaign_id),
                    Some(customer_id.clone()),
                    None,
                ));
            }
        }

        tracing::info!(
            campaign_id = %campaign_id,
            customers = customer_ids.len(),
            accepted,
            ?class,
            "campaign submitted"
        );
        metrics::counter!("campaign.submitted").increment(1);

        Ok(accepted)
    }

    pub fn campaign_status(&self, campaign_id: Uuid) -> CourierResult<CampaignStatusReport> {
        let meta = self.registry.get(campaign_id).ok_or_else(|| {
            CourierError::Campaign(format!("campaign {campaign_id} not found"))
        })?;

        Ok(CampaignStatusReport {
            campaign_id,
            submitted: meta.submitted,
            cancelled: meta.cancelled,
            counts: self.ledger.campaign_counts(campaign_id),
            suppression_sample: self.ledger.suppression_sample(campaign_id),
        })
    }

    /// Cancel a campaign mid-flight. Requests still queued are dropped at
    /// dequeue; dispatches already past rate-limit acquisition complete.
    pub fn cancel_campaign(&self, campaign_id: Uuid) -> CourierResult<()> {
        self.registry.cancel(campaign_id)?;
        tracing::info!(campaign_id = %campaign_id, "campaign cancelled");
        self.event_sink
            .emit(make_event(EventType::CampaignCancelled, Some(campaign_id), None, None));
        metrics::counter!("campaign.cancelled").increment(1);
        Ok(())
    }
}
