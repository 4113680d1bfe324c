//! Content generator seam. The orchestrator treats message bodies as
//! opaque — what to say is an external system's problem; this core only
//! routes and delivers it.

use courier_core::error::CourierResult;
use courier_core::types::{Channel, PayloadRef};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque message body plus the reference recorded on dispatch requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagePayload {
    pub reference: PayloadRef,
    pub body: String,
}

pub trait ContentGenerator: Send + Sync {
    fn payload(
        &self,
        customer_id: &str,
        channel: Channel,
        campaign_id: Uuid,
    ) -> CourierResult<MessagePayload>;
}

/// Fixed-body generator for tests and local runs.
pub struct StaticContentGenerator {
    body: String,
}

impl StaticContentGenerator {
    pub fn new(body: impl Into<String>) -> Self {
        Self { body: body.into() }
    }
}

impl Default for StaticContentGenerator {
    fn default() -> Self {
        Self::new("campaign message")
    }
}

impl ContentGenerator for StaticContentGenerator {
    fn payload(
        &self,
        customer_id: &str,
        channel: Channel,
        campaign_id: Uuid,
    ) -> CourierResult<MessagePayload> {
        Ok(MessagePayload {
            reference: PayloadRef(format!(
                "{}:{}:{}",
                campaign_id,
                customer_id,
                channel.display_name()
            )),
            body: self.body.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_generator_reference_is_stable() {
        let generator = StaticContentGenerator::new("hello");
        let campaign = Uuid::new_v4();
        let a = generator.payload("cust-1", Channel::Sms, campaign).unwrap();
        let b = generator.payload("cust-1", Channel::Sms, campaign).unwrap();
        assert_eq!(a.reference, b.reference);
        assert_eq!(a.body, "hello");
    }
}
