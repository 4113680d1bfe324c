//! Delivery tracker — consumes the gateways' asynchronous outcome feed,
//! transitions delivery records, schedules fallback retries, and closes
//! the feedback loop into the engagement scores the channel ranker reads.
//!
//! Outcomes arrive at-least-once. Idempotency comes from the ledger's
//! terminal-state rule: a replayed event for a terminal record applies
//! nothing, so the engagement update cannot double-fire. This is the only
//! place engagement scores are mutated.

use courier_core::config::TrackerConfig;
use courier_core::event_bus::{make_event, EventSink, EventType};
use courier_core::types::{
    Channel, DeliveryRecord, DispatchRequest, FailureKind, OutcomeEvent, OutcomeStatus,
};
use courier_gateways::ProfileStore;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::campaign::CampaignRegistry;
use crate::ledger::DeliveryLedger;
use crate::worker::DispatchQueue;

pub struct DeliveryTracker {
    ledger: Arc<DeliveryLedger>,
    profiles: Arc<dyn ProfileStore>,
    queue: Arc<DispatchQueue>,
    registry: Arc<CampaignRegistry>,
    config: TrackerConfig,
    event_sink: Arc<dyn EventSink>,
}

impl DeliveryTracker {
    pub fn new(
        ledger: Arc<DeliveryLedger>,
        profiles: Arc<dyn ProfileStore>,
        queue: Arc<DispatchQueue>,
        registry: Arc<CampaignRegistry>,
        config: TrackerConfig,
        event_sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            ledger,
            profiles,
            queue,
            registry,
            config,
            event_sink,
        }
    }

    /// Run the tracker loop over the inbound outcome feed.
    pub fn spawn(
        self: Arc<Self>,
        mut outcomes: mpsc::UnboundedReceiver<OutcomeEvent>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::debug!("delivery tracker started");
            while let Some(event) = outcomes.recv().await {
                self.handle_outcome(&event);
            }
            tracing::debug!("delivery tracker stopped");
        })
    }

    /// Apply one outcome event. Safe to call with replays.
    pub fn handle_outcome(&self, event: &OutcomeEvent) {
        let reason_text = event.reason.as_ref().map(|r| r.detail.as_str());
        let Some(result) =
            self.ledger
                .apply_outcome(event.message_id, event.status, reason_text, event.cost)
        else {
            tracing::warn!(message_id = %event.message_id, "outcome for unknown message");
            metrics::counter!("tracker.unknown_message").increment(1);
            return;
        };

        if !result.applied {
            tracing::debug!(
                message_id = %event.message_id,
                "replayed outcome for terminal record ignored"
            );
            metrics::counter!("tracker.replays_ignored").increment(1);
            return;
        }

        let record = result.record;
        let Some(channel) = record.channel else {
            return;
        };

        match event.status {
            OutcomeStatus::Delivered => {
                self.update_engagement(&record.customer_id, channel, true, event);
                self.event_sink.emit(
                    make_event(
                        EventType::MessageDelivered,
                        Some(record.campaign_id),
                        Some(record.customer_id.clone()),
                        Some(channel),
                    )
                    .with_message_id(record.message_id),
                );
                metrics::counter!(
                    "tracker.delivered",
                    "channel" => channel.display_name()
                )
                .increment(1);
            }
            OutcomeStatus::Bounced | OutcomeStatus::Failed => {
                self.update_engagement(&record.customer_id, channel, false, event);

                let event_type = if event.status == OutcomeStatus::Bounced {
                    EventType::MessageBounced
                } else {
                    EventType::MessageFailed
                };
                let mut emitted = make_event(
                    event_type,
                    Some(record.campaign_id),
                    Some(record.customer_id.clone()),
                    Some(channel),
                )
                .with_message_id(record.message_id);
                if let Some(reason) = reason_text {
                    emitted = emitted.with_reason(reason);
                }
                self.event_sink.emit(emitted);
                metrics::counter!(
                    "tracker.failed",
                    "channel" => channel.display_name()
                )
                .increment(1);

                match event.reason.as_ref().map(|r| r.kind) {
                    Some(FailureKind::Transient) => {
                        self.maybe_schedule_retry(&record, channel);
                    }
                    Some(FailureKind::Permanent) => {
                        self.flag_do_not_send(&record, channel);
                    }
                    // No stated reason: nothing to act on beyond the record.
                    None => {}
                }
            }
        }
    }

    /// Engagement feedback: delivered moves the score toward 1 by alpha,
    /// terminal failure moves it toward 0 by alpha. Scores stay in [0, 1].
    fn update_engagement(
        &self,
        customer_id: &str,
        channel: Channel,
        delivered: bool,
        event: &OutcomeEvent,
    ) {
        let alpha = self.config.feedback_alpha;
        let timestamp = event.timestamp;
        let update = self.profiles.update_profile(customer_id, &mut |profile| {
            let engagement = profile.channels.entry(channel).or_default();
            if delivered {
                engagement.score += alpha * (1.0 - engagement.score);
                engagement.last_engaged = Some(timestamp);
            } else {
                engagement.score -= alpha * engagement.score;
            }
            engagement.score = engagement.score.clamp(0.0, 1.0);
        });

        if let Err(err) = update {
            tracing::error!(
                customer_id = %customer_id,
                error = %err,
                "failed to apply engagement feedback"
            );
        }
    }

    /// One retry per original send, routed through the dispatcher's normal
    /// fallback path so it spends a fresh rate-limiter token.
    fn maybe_schedule_retry(&self, record: &DeliveryRecord, failed_channel: Channel) {
        if record.retry_count >= 1 {
            tracing::debug!(
                message_id = %record.message_id,
                "retry budget exhausted, not rescheduling"
            );
            return;
        }

        let Some(meta) = self.registry.get(record.campaign_id) else {
            tracing::warn!(
                campaign_id = %record.campaign_id,
                "retry skipped, campaign unknown"
            );
            return;
        };
        if meta.cancelled {
            return;
        }

        let candidates: Vec<Channel> = meta
            .candidates
            .iter()
            .copied()
            .filter(|c| *c != failed_channel)
            .collect();
        if candidates.is_empty() {
            tracing::debug!(
                message_id = %record.message_id,
                "no alternate channel available for retry"
            );
            return;
        }

        self.queue.push(DispatchRequest {
            campaign_id: record.campaign_id,
            customer_id: record.customer_id.clone(),
            candidates,
            class: meta.class,
            retry_attempt: record.retry_count + 1,
        });

        tracing::info!(
            message_id = %record.message_id,
            customer_id = %record.customer_id,
            failed_channel = failed_channel.display_name(),
            "retry scheduled on alternate channel"
        );
        self.event_sink.emit(
            make_event(
                EventType::RetryScheduled,
                Some(record.campaign_id),
                Some(record.customer_id.clone()),
                Some(failed_channel),
            )
            .with_message_id(record.message_id),
        );
        metrics::counter!("tracker.retries_scheduled").increment(1);
    }

    fn flag_do_not_send(&self, record: &DeliveryRecord, channel: Channel) {
        if let Err(err) = self.profiles.set_do_not_send(&record.customer_id, channel) {
            tracing::error!(
                customer_id = %record.customer_id,
                error = %err,
                "failed to set do-not-send flag"
            );
            return;
        }
        tracing::info!(
            customer_id = %record.customer_id,
            channel = channel.display_name(),
            "channel flagged do-not-send after permanent failure"
        );
        self.event_sink.emit(
            make_event(
                EventType::DoNotSendFlagged,
                Some(record.campaign_id),
                Some(record.customer_id.clone()),
                Some(channel),
            )
            .with_message_id(record.message_id),
        );
        metrics::counter!(
            "tracker.do_not_send_flagged",
            "channel" => channel.display_name()
        )
        .increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use courier_core::event_bus::capture_sink;
    use courier_core::types::{DeliveryStatus, MessageClass, OutcomeReason};
    use courier_gateways::MemoryProfileStore;
    use uuid::Uuid;

    struct Fixture {
        tracker: DeliveryTracker,
        ledger: Arc<DeliveryLedger>,
        profiles: Arc<MemoryProfileStore>,
        queue: Arc<DispatchQueue>,
        registry: Arc<CampaignRegistry>,
    }

    fn fixture() -> Fixture {
        let ledger = Arc::new(DeliveryLedger::new(10));
        let profiles = Arc::new(MemoryProfileStore::new());
        let queue = Arc::new(DispatchQueue::new());
        let registry = Arc::new(CampaignRegistry::new());
        let tracker = DeliveryTracker::new(
            Arc::clone(&ledger),
            Arc::clone(&profiles) as Arc<dyn ProfileStore>,
            Arc::clone(&queue),
            Arc::clone(&registry),
            TrackerConfig::default(),
            capture_sink(),
        );
        Fixture {
            tracker,
            ledger,
            profiles,
            queue,
            registry,
        }
    }

    fn sent_record(fix: &Fixture, channel: Channel, retry_count: u32) -> DeliveryRecord {
        let now = Utc::now();
        let record = DeliveryRecord {
            message_id: Uuid::new_v4(),
            campaign_id: Uuid::new_v4(),
            customer_id: "cust-1".into(),
            channel: Some(channel),
            status: DeliveryStatus::Sent,
            cost: channel.default_unit_cost(),
            retry_count,
            failure_reason: None,
            queued_at: now,
            sent_at: Some(now),
            terminal_at: None,
            updated_at: now,
        };
        fix.ledger.record_sent(record.clone());
        record
    }

    fn outcome(
        message_id: Uuid,
        status: OutcomeStatus,
        kind: Option<FailureKind>,
    ) -> OutcomeEvent {
        OutcomeEvent {
            message_id,
            status,
            reason: kind.map(|kind| OutcomeReason {
                kind,
                detail: "test reason".into(),
            }),
            cost: 0.0,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_delivered_updates_record_and_engagement() {
        let fix = fixture();
        let record = sent_record(&fix, Channel::WhatsApp, 0);

        fix.tracker
            .handle_outcome(&outcome(record.message_id, OutcomeStatus::Delivered, None));

        let stored = fix.ledger.get(record.message_id).unwrap();
        assert_eq!(stored.status, DeliveryStatus::Delivered);

        let profile = fix.profiles.get_profile("cust-1").unwrap();
        let engagement = profile.engagement(Channel::WhatsApp).unwrap();
        assert!((engagement.score - 0.1).abs() < 1e-9);
        assert!(engagement.last_engaged.is_some());
    }

    #[test]
    fn test_replayed_delivered_is_idempotent() {
        let fix = fixture();
        let record = sent_record(&fix, Channel::WhatsApp, 0);
        let event = outcome(record.message_id, OutcomeStatus::Delivered, None);

        fix.tracker.handle_outcome(&event);
        fix.tracker.handle_outcome(&event);

        let stored = fix.ledger.get(record.message_id).unwrap();
        assert_eq!(stored.status, DeliveryStatus::Delivered);

        // Engagement moved once, not twice.
        let profile = fix.profiles.get_profile("cust-1").unwrap();
        let engagement = profile.engagement(Channel::WhatsApp).unwrap();
        assert!((engagement.score - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_transient_failure_schedules_one_retry() {
        let fix = fixture();
        let record = sent_record(&fix, Channel::Sms, 0);
        fix.registry
            .register(
                record.campaign_id,
                vec![Channel::Sms, Channel::Email],
                MessageClass::Promotional,
                1,
            )
            .unwrap();

        fix.tracker.handle_outcome(&outcome(
            record.message_id,
            OutcomeStatus::Failed,
            Some(FailureKind::Transient),
        ));

        assert_eq!(fix.queue.len(), 1);
        // The failed channel is excluded from the retry candidates.
        let retry = futures_pop(&fix.queue);
        assert_eq!(retry.candidates, vec![Channel::Email]);
        assert_eq!(retry.retry_attempt, 1);

        // Engagement moved down.
        let profile = fix.profiles.get_profile("cust-1").unwrap();
        assert!(profile.engagement(Channel::Sms).unwrap().score <= 0.0 + 1e-9);
    }

    fn futures_pop(queue: &Arc<DispatchQueue>) -> DispatchRequest {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(queue.pop())
            .unwrap()
    }

    #[test]
    fn test_retried_send_does_not_retry_again() {
        let fix = fixture();
        let record = sent_record(&fix, Channel::Sms, 1);
        fix.registry
            .register(
                record.campaign_id,
                vec![Channel::Sms, Channel::Email],
                MessageClass::Promotional,
                1,
            )
            .unwrap();

        fix.tracker.handle_outcome(&outcome(
            record.message_id,
            OutcomeStatus::Failed,
            Some(FailureKind::Transient),
        ));

        assert!(fix.queue.is_empty());
    }

    #[test]
    fn test_permanent_failure_sets_do_not_send_and_no_retry() {
        let fix = fixture();
        let record = sent_record(&fix, Channel::Sms, 0);
        fix.registry
            .register(
                record.campaign_id,
                vec![Channel::Sms, Channel::Email],
                MessageClass::Promotional,
                1,
            )
            .unwrap();

        fix.tracker.handle_outcome(&outcome(
            record.message_id,
            OutcomeStatus::Bounced,
            Some(FailureKind::Permanent),
        ));

        let profile = fix.profiles.get_profile("cust-1").unwrap();
        assert!(profile.is_do_not_send(Channel::Sms));
        assert!(!profile.is_do_not_send(Channel::Email));
        assert!(fix.queue.is_empty());

        let stored = fix.ledger.get(record.message_id).unwrap();
        assert_eq!(stored.status, DeliveryStatus::Bounced);
    }

    #[test]
    fn test_no_retry_for_cancelled_campaign() {
        let fix = fixture();
        let record = sent_record(&fix, Channel::Sms, 0);
        fix.registry
            .register(
                record.campaign_id,
                vec![Channel::Sms, Channel::Email],
                MessageClass::Promotional,
                1,
            )
            .unwrap();
        fix.registry.cancel(record.campaign_id).unwrap();

        fix.tracker.handle_outcome(&outcome(
            record.message_id,
            OutcomeStatus::Failed,
            Some(FailureKind::Transient),
        ));

        assert!(fix.queue.is_empty());
    }

    #[test]
    fn test_unknown_message_is_dropped() {
        let fix = fixture();
        fix.tracker
            .handle_outcome(&outcome(Uuid::new_v4(), OutcomeStatus::Delivered, None));
        assert!(fix.queue.is_empty());
    }
}
