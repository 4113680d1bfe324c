//! Sentiment guardrail — blocks promotional contact to customers in a
//! known-negative state. Sentiment arrives cached on the profile from the
//! external sentiment service; this engine only consumes it.
//!
//! The asymmetry is deliberate: unknown sentiment fails open (an unscored
//! customer is not punished for missing data) while known-negative fails
//! closed (a confirmed-negative customer is always protected).

use courier_core::types::{suppression, CustomerChannelProfile, MessageClass, SentimentState};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct GuardrailDecision {
    pub blocked: bool,
    pub reason: Option<String>,
}

impl GuardrailDecision {
    fn allow() -> Self {
        Self {
            blocked: false,
            reason: None,
        }
    }

    fn block(reason: impl Into<String>) -> Self {
        Self {
            blocked: true,
            reason: Some(reason.into()),
        }
    }
}

#[derive(Default)]
pub struct GuardrailEngine;

impl GuardrailEngine {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate against the profile snapshot taken at decision time.
    /// Transactional messages always pass; the override capability is
    /// asserted by the caller through `class`.
    pub fn evaluate(
        &self,
        profile: &CustomerChannelProfile,
        class: MessageClass,
    ) -> GuardrailDecision {
        if class.is_transactional() {
            return GuardrailDecision::allow();
        }

        match profile.sentiment {
            SentimentState::Negative => {
                tracing::info!(
                    customer_id = %profile.customer_id,
                    "guardrail blocked promotional message"
                );
                metrics::counter!("guardrail.blocked").increment(1);
                GuardrailDecision::block(suppression::GUARDRAIL)
            }
            SentimentState::Positive | SentimentState::Neutral | SentimentState::Unknown => {
                GuardrailDecision::allow()
            }
        }
    }
}
