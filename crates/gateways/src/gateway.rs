//! Delivery gateway seam. `send` acknowledges acceptance only — actual
//! delivery is reported later through the gateway's asynchronous outcome
//! feed, keyed by the message id returned here.

use crate::content::MessagePayload;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Synchronous acceptance acknowledgment from a gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendAck {
    /// Unique message id, generated at send time. Outcome events carry it.
    pub message_id: Uuid,
    /// Provider-side reference for support lookups.
    pub provider_message_id: String,
}

/// Send-time failure, split by whether another attempt can succeed.
#[derive(Debug, Clone, Error)]
pub enum SendFailure {
    /// Carrier hiccup, timeout, throttling on the provider side. Eligible
    /// for channel fallback.
    #[error("transient send failure: {0}")]
    Transient(String),
    /// Invalid destination or unsupported channel for this customer.
    /// Marks the channel do-not-send; never retried.
    #[error("permanent send failure: {0}")]
    Permanent(String),
}

#[async_trait]
pub trait DeliveryGateway: Send + Sync {
    /// Hand one message to the underlying transport.
    async fn send(
        &self,
        destination: &str,
        payload: &MessagePayload,
    ) -> Result<SendAck, SendFailure>;
}
