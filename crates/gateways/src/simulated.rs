//! Simulated delivery gateway — scripted per-destination behavior with
//! provider-id generation, accepted-message bookkeeping, and an outcome
//! feed the tests (or a demo loop) drive.

use crate::content::MessagePayload;
use crate::gateway::{DeliveryGateway, SendAck, SendFailure};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use courier_core::types::{Channel, FailureKind, OutcomeEvent, OutcomeReason, OutcomeStatus};
use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

/// What the simulated provider does when asked to send to a destination.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SendBehavior {
    #[default]
    Accept,
    FailTransient,
    FailPermanent,
    /// Never resolves within any sane timeout; exercises the dispatcher's
    /// per-call deadline.
    Hang,
}

/// A message the simulated provider accepted.
#[derive(Debug, Clone)]
pub struct AcceptedMessage {
    pub message_id: Uuid,
    pub provider_message_id: String,
    pub destination: String,
    pub body: String,
    pub accepted_at: DateTime<Utc>,
}

/// In-process stand-in for a per-channel transport (Twilio-style SMS,
/// WhatsApp Business, SES email). Outcomes are pushed into the feed
/// explicitly via [`SimulatedGateway::emit_outcome`].
pub struct SimulatedGateway {
    channel: Channel,
    behaviors: DashMap<String, SendBehavior>,
    accepted: DashMap<Uuid, AcceptedMessage>,
    outcome_tx: mpsc::UnboundedSender<OutcomeEvent>,
}

impl SimulatedGateway {
    pub fn new(channel: Channel, outcome_tx: mpsc::UnboundedSender<OutcomeEvent>) -> Self {
        tracing::info!(channel = channel.display_name(), "simulated gateway initialized");
        Self {
            channel,
            behaviors: DashMap::new(),
            accepted: DashMap::new(),
            outcome_tx,
        }
    }

    /// Script the behavior for a destination. Unscripted destinations accept.
    pub fn script(&self, destination: impl Into<String>, behavior: SendBehavior) {
        self.behaviors.insert(destination.into(), behavior);
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn accepted_count(&self) -> usize {
        self.accepted.len()
    }

    pub fn accepted_messages(&self) -> Vec<AcceptedMessage> {
        self.accepted.iter().map(|e| e.value().clone()).collect()
    }

    /// Push a delivery outcome into the feed for an accepted message.
    pub fn emit_outcome(
        &self,
        message_id: Uuid,
        status: OutcomeStatus,
        reason: Option<OutcomeReason>,
        cost: f64,
    ) {
        let event = OutcomeEvent {
            message_id,
            status,
            reason,
            cost,
            timestamp: Utc::now(),
        };
        if self.outcome_tx.send(event).is_err() {
            tracing::warn!(
                channel = self.channel.display_name(),
                message_id = %message_id,
                "outcome feed closed, event dropped"
            );
        }
    }

    /// Convenience: report an accepted message as delivered.
    pub fn emit_delivered(&self, message_id: Uuid, cost: f64) {
        self.emit_outcome(message_id, OutcomeStatus::Delivered, None, cost);
    }

    /// Convenience: report a failure with the given kind.
    pub fn emit_failed(&self, message_id: Uuid, kind: FailureKind, detail: impl Into<String>) {
        self.emit_outcome(
            message_id,
            OutcomeStatus::Failed,
            Some(OutcomeReason {
                kind,
                detail: detail.into(),
            }),
            0.0,
        );
    }
}

#[async_trait]
impl DeliveryGateway for SimulatedGateway {
    async fn send(
        &self,
        destination: &str,
        payload: &MessagePayload,
    ) -> Result<SendAck, SendFailure> {
        if destination.is_empty() {
            return Err(SendFailure::Permanent("empty destination".into()));
        }

        let behavior = self
            .behaviors
            .get(destination)
            .map(|b| b.clone())
            .unwrap_or_default();

        match behavior {
            SendBehavior::FailTransient => {
                Err(SendFailure::Transient("simulated carrier error".into()))
            }
            SendBehavior::FailPermanent => {
                Err(SendFailure::Permanent("simulated invalid destination".into()))
            }
            SendBehavior::Hang => {
                std::future::pending::<()>().await;
                unreachable!("pending future never resolves")
            }
            SendBehavior::Accept => {
                let message_id = Uuid::new_v4();
                let provider_message_id =
                    format!("SM{}", Uuid::new_v4().to_string().replace('-', ""));

                self.accepted.insert(
                    message_id,
                    AcceptedMessage {
                        message_id,
                        provider_message_id: provider_message_id.clone(),
                        destination: destination.to_string(),
                        body: payload.body.clone(),
                        accepted_at: Utc::now(),
                    },
                );

                tracing::debug!(
                    channel = self.channel.display_name(),
                    message_id = %message_id,
                    destination = %destination,
                    "message accepted"
                );
                metrics::counter!(
                    "gateway.accepted",
                    "channel" => self.channel.display_name()
                )
                .increment(1);

                Ok(SendAck {
                    message_id,
                    provider_message_id,
                })
            }
        }
    }
}
