//! Domain types for campaign delivery orchestration.
//!
//! Profiles are owned by the orchestration core: engagement scores are
//! mutated only by the delivery tracker (outcome feedback) and send
//! timestamps only by the dispatcher at send time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

// ─── Channels ───────────────────────────────────────────────────────────

/// Outbound messaging channels handled by the orchestrator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Sms,
    WhatsApp,
    Email,
}

impl Channel {
    pub fn display_name(&self) -> &'static str {
        match self {
            Channel::Sms => "SMS",
            Channel::WhatsApp => "WhatsApp",
            Channel::Email => "Email",
        }
    }

    /// Fixed tie-break order for ranking (lower = preferred). Ordered
    /// cheapest-first so equal-scored channels resolve deterministically.
    pub fn priority(&self) -> u8 {
        match self {
            Channel::Email => 0,
            Channel::WhatsApp => 1,
            Channel::Sms => 2,
        }
    }

    /// Default per-message unit cost in USD.
    pub fn default_unit_cost(&self) -> f64 {
        match self {
            Channel::Sms => 0.0075,
            Channel::WhatsApp => 0.005,
            Channel::Email => 0.0001,
        }
    }

    pub fn all() -> [Channel; 3] {
        [Channel::Sms, Channel::WhatsApp, Channel::Email]
    }
}

// ─── Customer profile ───────────────────────────────────────────────────

/// Customer sentiment as cached from the external sentiment service.
/// The orchestrator consumes this state; it never computes sentiment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SentimentState {
    Positive,
    Neutral,
    Negative,
    #[default]
    Unknown,
}

/// Message classification. `Transactional` is a capability the caller
/// asserts explicitly; it bypasses fatigue and guardrail checks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageClass {
    #[default]
    Promotional,
    Transactional,
}

impl MessageClass {
    pub fn is_transactional(&self) -> bool {
        matches!(self, MessageClass::Transactional)
    }
}

/// Per-channel engagement state for one customer.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChannelEngagement {
    /// Engagement score in [0, 1], updated only by the delivery tracker.
    pub score: f64,
    pub last_engaged: Option<DateTime<Utc>>,
}

/// Per-customer channel profile: engagement history, cached sentiment,
/// rolling send timestamps for the fatigue window, and do-not-send flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerChannelProfile {
    pub customer_id: String,
    pub channels: HashMap<Channel, ChannelEngagement>,
    /// Destination address per channel (phone number or email address).
    pub destinations: HashMap<Channel, String>,
    pub sentiment: SentimentState,
    /// Rolling send timestamps; appended at send time, pruned to the
    /// fatigue window on read.
    #[serde(default)]
    pub recent_sends: Vec<DateTime<Utc>>,
    /// Channels marked unreachable after a permanent failure. Cleared only
    /// by an explicit external override, never automatically.
    #[serde(default)]
    pub do_not_send: Vec<Channel>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CustomerChannelProfile {
    pub fn new(customer_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            customer_id: customer_id.into(),
            channels: HashMap::new(),
            destinations: HashMap::new(),
            sentiment: SentimentState::Unknown,
            recent_sends: Vec::new(),
            do_not_send: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn engagement(&self, channel: Channel) -> Option<&ChannelEngagement> {
        self.channels.get(&channel)
    }

    pub fn is_do_not_send(&self, channel: Channel) -> bool {
        self.do_not_send.contains(&channel)
    }
}

// ─── Dispatch requests ──────────────────────────────────────────────────

/// Opaque reference to a message body produced by the external content
/// generator. The orchestrator never inspects it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PayloadRef(pub String);

/// A single unit of dispatch work: one customer within one campaign.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchRequest {
    pub campaign_id: Uuid,
    pub customer_id: String,
    /// Candidate channels, in submission order; the decision engine
    /// produces the actual ranking.
    pub candidates: Vec<Channel>,
    pub class: MessageClass,
    /// 0 for the original dispatch; incremented when the tracker schedules
    /// a retry through the fallback path.
    #[serde(default)]
    pub retry_attempt: u32,
}

// ─── Delivery records ───────────────────────────────────────────────────

/// Lifecycle of a delivery record. `Queued → Sent` is the dispatcher's
/// transition; everything after `Sent` belongs to the tracker. Terminal
/// states are never left.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Queued,
    Sent,
    Delivered,
    Bounced,
    Failed,
    Suppressed,
}

impl DeliveryStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeliveryStatus::Delivered
                | DeliveryStatus::Bounced
                | DeliveryStatus::Failed
                | DeliveryStatus::Suppressed
        )
    }
}

/// Record of one delivery attempt, created by the dispatcher at send time
/// and transitioned only by the delivery tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub message_id: Uuid,
    pub campaign_id: Uuid,
    pub customer_id: String,
    /// `None` for dispatches suppressed before a channel was chosen.
    pub channel: Option<Channel>,
    pub status: DeliveryStatus,
    pub cost: f64,
    pub retry_count: u32,
    pub failure_reason: Option<String>,
    pub queued_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub terminal_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

// ─── Outcome events ─────────────────────────────────────────────────────

/// Delivery outcome reported by a gateway's event feed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Delivered,
    Bounced,
    Failed,
}

/// Whether a failure is worth retrying on another channel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Transient,
    Permanent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeReason {
    pub kind: FailureKind,
    pub detail: String,
}

/// Asynchronous, at-least-once delivery outcome keyed by message id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeEvent {
    pub message_id: Uuid,
    pub status: OutcomeStatus,
    pub reason: Option<OutcomeReason>,
    pub cost: f64,
    pub timestamp: DateTime<Utc>,
}

// ─── Suppression reasons ────────────────────────────────────────────────

/// Audit vocabulary for suppressed dispatches.
pub mod suppression {
    pub const GUARDRAIL: &str = "guardrail:negative-sentiment";
    pub const FATIGUE: &str = "fatigue";
    pub const RATE_LIMIT_EXHAUSTED: &str = "rate-limit-exhausted";
    pub const INFRA_UNAVAILABLE: &str = "infra-unavailable";
    pub const CAMPAIGN_CANCELLED: &str = "campaign-cancelled";
    pub const NO_ELIGIBLE_CHANNEL: &str = "no-eligible-channel";
    pub const FALLBACK_EXHAUSTED: &str = "fallback-exhausted";
}

// ─── Channel statistics ─────────────────────────────────────────────────

/// Per-channel delivery counters maintained by the tracker.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChannelStats {
    pub total_sent: u64,
    pub total_delivered: u64,
    pub total_bounced: u64,
    pub total_failed: u64,
}

impl ChannelStats {
    /// Delivered as a percentage of sent; 0 when nothing was sent.
    pub fn delivery_rate(&self) -> f64 {
        if self.total_sent == 0 {
            0.0
        } else {
            (self.total_delivered as f64 / self.total_sent as f64) * 100.0
        }
    }
}
