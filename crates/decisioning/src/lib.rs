//! Channel decisioning — engagement-based channel ranking, rolling-window
//! fatigue suppression, and the sentiment guardrail.

pub mod fatigue;
pub mod guardrail;
pub mod ranking;

pub use fatigue::FatigueEngine;
pub use guardrail::{GuardrailDecision, GuardrailEngine};
pub use ranking::{ChannelRanker, RankedChannel};
