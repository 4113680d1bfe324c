//! Dispatcher — drives one request through guardrail, fatigue, and
//! rate-limit gates, then hands it to a delivery gateway with bounded
//! channel fallback. Check failures terminate the request before any
//! token is spent or fatigue timestamp written; a failure for one
//! customer never propagates out of its own record.

use chrono::Utc;
use courier_core::config::DispatchConfig;
use courier_core::event_bus::{make_event, EventSink, EventType};
use courier_core::types::{
    suppression, Channel, DeliveryRecord, DeliveryStatus, DispatchRequest,
};
use courier_decisioning::{ChannelRanker, FatigueEngine, GuardrailEngine, RankedChannel};
use courier_gateways::{ContentGenerator, DeliveryGateway, ProfileStore, SendFailure};
use courier_ratelimit::RateLimiter;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::ledger::DeliveryLedger;

/// Terminal result of processing one dispatch request.
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    Sent { message_id: Uuid, channel: Channel },
    Suppressed { reason: String },
}

pub struct Dispatcher {
    config: DispatchConfig,
    ranker: ChannelRanker,
    guardrail: GuardrailEngine,
    fatigue: FatigueEngine,
    limiter: Arc<RateLimiter>,
    profiles: Arc<dyn ProfileStore>,
    content: Arc<dyn ContentGenerator>,
    gateways: HashMap<Channel, Arc<dyn DeliveryGateway>>,
    ledger: Arc<DeliveryLedger>,
    event_sink: Arc<dyn EventSink>,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: DispatchConfig,
        ranker: ChannelRanker,
        guardrail: GuardrailEngine,
        fatigue: FatigueEngine,
        limiter: Arc<RateLimiter>,
        profiles: Arc<dyn ProfileStore>,
        content: Arc<dyn ContentGenerator>,
        gateways: HashMap<Channel, Arc<dyn DeliveryGateway>>,
        ledger: Arc<DeliveryLedger>,
        event_sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            config,
            ranker,
            guardrail,
            fatigue,
            limiter,
            profiles,
            content,
            gateways,
            ledger,
            event_sink,
        }
    }

    pub fn ledger(&self) -> &Arc<DeliveryLedger> {
        &self.ledger
    }

    /// Process one request to a terminal outcome.
    pub async fn process(&self, request: &DispatchRequest) -> DispatchOutcome {
        let now = Utc::now();

        // One profile snapshot feeds all checks (read-then-decide).
        let profile = match self.profiles.get_profile(&request.customer_id) {
            Ok(profile) => profile,
            Err(err) => {
                tracing::error!(
                    customer_id = %request.customer_id,
                    error = %err,
                    "profile store unreachable"
                );
                return self.suppress(request, None, suppression::INFRA_UNAVAILABLE, None);
            }
        };

        let decision = self.guardrail.evaluate(&profile, request.class);
        if decision.blocked {
            return self.suppress(
                request,
                None,
                suppression::GUARDRAIL,
                Some(EventType::GuardrailBlocked),
            );
        }

        if !request.class.is_transactional() && self.fatigue.is_fatigued(&profile, now) {
            return self.suppress(
                request,
                None,
                suppression::FATIGUE,
                Some(EventType::FatigueSuppressed),
            );
        }

        let eligible: Vec<Channel> = request
            .candidates
            .iter()
            .copied()
            .filter(|channel| !profile.is_do_not_send(*channel))
            .collect();
        let ranked = self.ranker.rank(&profile, &eligible, now);
        if ranked.is_empty() {
            return self.suppress(request, None, suppression::NO_ELIGIBLE_CHANNEL, None);
        }

        let max_attempts = self.config.max_channel_fallback as usize + 1;
        let mut fatigue_recorded = false;

        for (attempt, candidate) in ranked.iter().take(max_attempts).enumerate() {
            let channel = candidate.channel;

            if !self.acquire_with_backoff(request, channel).await {
                return self.suppress(
                    request,
                    Some(channel),
                    suppression::RATE_LIMIT_EXHAUSTED,
                    None,
                );
            }

            // Attempted contact drives fatigue: recorded once per request,
            // at the send stage, regardless of the delivery outcome.
            if !fatigue_recorded {
                if let Err(err) = self.fatigue.record_attempt(&request.customer_id, Utc::now()) {
                    tracing::warn!(
                        customer_id = %request.customer_id,
                        error = %err,
                        "failed to record fatigue timestamp"
                    );
                }
                fatigue_recorded = true;
            }

            match self.attempt_send(request, &profile, candidate).await {
                SendAttempt::Accepted { message_id } => {
                    return DispatchOutcome::Sent {
                        message_id,
                        channel,
                    };
                }
                SendAttempt::Transient(detail) => {
                    tracing::warn!(
                        customer_id = %request.customer_id,
                        channel = channel.display_name(),
                        attempt,
                        detail = %detail,
                        "send failed, trying next-ranked channel"
                    );
                    self.event_sink.emit(
                        make_event(
                            EventType::ChannelFallback,
                            Some(request.campaign_id),
                            Some(request.customer_id.clone()),
                            Some(channel),
                        )
                        .with_reason(detail),
                    );
                }
                SendAttempt::Permanent(detail) => {
                    // Unreachable destination: flag this channel only,
                    // then walk down the ranking.
                    if let Err(err) = self.profiles.set_do_not_send(&request.customer_id, channel)
                    {
                        tracing::error!(
                            customer_id = %request.customer_id,
                            error = %err,
                            "failed to set do-not-send flag"
                        );
                    }
                    self.event_sink.emit(
                        make_event(
                            EventType::DoNotSendFlagged,
                            Some(request.campaign_id),
                            Some(request.customer_id.clone()),
                            Some(channel),
                        )
                        .with_reason(detail),
                    );
                    metrics::counter!(
                        "dispatch.do_not_send_flagged",
                        "channel" => channel.display_name()
                    )
                    .increment(1);
                }
                SendAttempt::Infra(reason) => {
                    return self.suppress(request, Some(channel), reason, None);
                }
            }
        }

        self.suppress(request, None, suppression::FALLBACK_EXHAUSTED, None)
    }

    /// Record a queued request that was dropped because its campaign was
    /// cancelled. No rate-limit budget is consumed.
    pub fn suppress_cancelled(&self, request: &DispatchRequest) -> DispatchOutcome {
        self.suppress(
            request,
            None,
            suppression::CAMPAIGN_CANCELLED,
            Some(EventType::CampaignCancelled),
        )
    }

    /// Acquire one token, rescheduling with exponential backoff on the
    /// reported retry-after. Bounded by the configured reschedule count;
    /// the wait is an async sleep, not a held thread.
    async fn acquire_with_backoff(&self, request: &DispatchRequest, channel: Channel) -> bool {
        let max_reschedules = self.config.max_rate_limit_reschedules;
        let cap = Duration::from_secs(self.config.reschedule_backoff_cap_secs);

        for attempt in 0..=max_reschedules {
            let acquisition = self.limiter.try_acquire(channel, 1);
            if acquisition.allowed {
                return true;
            }
            if attempt == max_reschedules {
                break;
            }

            let base = acquisition
                .retry_after
                .unwrap_or_else(|| Duration::from_secs(1));
            let backoff = base
                .saturating_mul(2u32.saturating_pow(attempt))
                .min(cap);

            self.event_sink.emit(
                make_event(
                    EventType::RateLimitDeferred,
                    Some(request.campaign_id),
                    Some(request.customer_id.clone()),
                    Some(channel),
                )
                .with_reason(format!("reschedule {} in {:?}", attempt + 1, backoff)),
            );
            metrics::counter!(
                "dispatch.rate_limit_reschedules",
                "channel" => channel.display_name()
            )
            .increment(1);

            tokio::time::sleep(backoff).await;
        }
        false
    }

    async fn attempt_send(
        &self,
        request: &DispatchRequest,
        profile: &courier_core::types::CustomerChannelProfile,
        candidate: &RankedChannel,
    ) -> SendAttempt {
        let channel = candidate.channel;

        let payload = match self
            .content
            .payload(&request.customer_id, channel, request.campaign_id)
        {
            Ok(payload) => payload,
            Err(err) => {
                tracing::error!(
                    customer_id = %request.customer_id,
                    error = %err,
                    "content generator unavailable"
                );
                return SendAttempt::Infra(suppression::INFRA_UNAVAILABLE);
            }
        };

        let destination = match profile.destinations.get(&channel) {
            Some(destination) => destination.clone(),
            None => {
                return SendAttempt::Permanent(format!(
                    "no {} destination on profile",
                    channel.display_name()
                ))
            }
        };

        let gateway = match self.gateways.get(&channel) {
            Some(gateway) => Arc::clone(gateway),
            None => {
                tracing::error!(
                    channel = channel.display_name(),
                    "no gateway registered for channel"
                );
                return SendAttempt::Transient("gateway not registered".into());
            }
        };

        let timeout = Duration::from_secs(self.config.gateway_timeout_secs);
        let sent = tokio::time::timeout(timeout, gateway.send(&destination, &payload)).await;

        match sent {
            Err(_) => SendAttempt::Transient(format!(
                "gateway call exceeded {}s timeout",
                self.config.gateway_timeout_secs
            )),
            Ok(Err(SendFailure::Transient(detail))) => SendAttempt::Transient(detail),
            Ok(Err(SendFailure::Permanent(detail))) => SendAttempt::Permanent(detail),
            Ok(Ok(ack)) => {
                let now = Utc::now();
                let record = DeliveryRecord {
                    message_id: ack.message_id,
                    campaign_id: request.campaign_id,
                    customer_id: request.customer_id.clone(),
                    channel: Some(channel),
                    status: DeliveryStatus::Sent,
                    cost: candidate.unit_cost,
                    retry_count: request.retry_attempt,
                    failure_reason: None,
                    queued_at: now,
                    sent_at: Some(now),
                    terminal_at: None,
                    updated_at: now,
                };
                self.ledger.record_sent(record);

                tracing::info!(
                    customer_id = %request.customer_id,
                    campaign_id = %request.campaign_id,
                    channel = channel.display_name(),
                    message_id = %ack.message_id,
                    "message sent"
                );
                self.event_sink.emit(
                    make_event(
                        EventType::MessageSent,
                        Some(request.campaign_id),
                        Some(request.customer_id.clone()),
                        Some(channel),
                    )
                    .with_message_id(ack.message_id),
                );
                metrics::counter!(
                    "dispatch.sent",
                    "channel" => channel.display_name()
                )
                .increment(1);

                SendAttempt::Accepted {
                    message_id: ack.message_id,
                }
            }
        }
    }

    fn suppress(
        &self,
        request: &DispatchRequest,
        channel: Option<Channel>,
        reason: &str,
        event: Option<EventType>,
    ) -> DispatchOutcome {
        self.ledger
            .record_suppressed(request.campaign_id, &request.customer_id, channel, reason);

        if let Some(event_type) = event {
            self.event_sink.emit(
                make_event(
                    event_type,
                    Some(request.campaign_id),
                    Some(request.customer_id.clone()),
                    channel,
                )
                .with_reason(reason),
            );
        }

        tracing::info!(
            customer_id = %request.customer_id,
            campaign_id = %request.campaign_id,
            reason,
            "dispatch suppressed"
        );
        metrics::counter!("dispatch.suppressed", "reason" => reason.to_string()).increment(1);

        DispatchOutcome::Suppressed {
            reason: reason.to_string(),
        }
    }
}

enum SendAttempt {
    Accepted { message_id: Uuid },
    Transient(String),
    Permanent(String),
    Infra(&'static str),
}
