//! Channel ranking — scores candidate channels per customer from
//! historical engagement and recency, with unit cost as a tie-break only.
//! The full ranked list is returned so the dispatcher can fall back.

use chrono::{DateTime, Utc};
use courier_core::config::{CostPolicy, DecisionConfig};
use courier_core::types::{Channel, CustomerChannelProfile};
use serde::Serialize;

/// Engagement score assumed for channels the customer has no history on.
/// An unscored channel is neither favored nor punished.
const NEUTRAL_ENGAGEMENT: f64 = 0.5;

/// Scores within this distance count as tied and fall through to the
/// deterministic tie-break chain.
const SCORE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Serialize)]
pub struct RankedChannel {
    pub channel: Channel,
    pub score: f64,
    pub unit_cost: f64,
}

pub struct ChannelRanker {
    config: DecisionConfig,
}

impl ChannelRanker {
    pub fn new(config: DecisionConfig) -> Self {
        Self { config }
    }

    /// Rank `candidates` for this customer, best first. Score is a
    /// weighted blend of the stored engagement score and an exponential
    /// recency decay on time since last engagement. Ties resolve by the
    /// configured cost policy, then the fixed channel priority order, so
    /// outcomes are reproducible.
    pub fn rank(
        &self,
        profile: &CustomerChannelProfile,
        candidates: &[Channel],
        now: DateTime<Utc>,
    ) -> Vec<RankedChannel> {
        let mut ranked: Vec<RankedChannel> = candidates
            .iter()
            .map(|&channel| RankedChannel {
                channel,
                score: self.score(profile, channel, now),
                unit_cost: channel.default_unit_cost(),
            })
            .collect();

        let policy = self.config.cost_policy;
        ranked.sort_by(|a, b| {
            if (a.score - b.score).abs() > SCORE_EPSILON {
                return b
                    .score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal);
            }
            if policy == CostPolicy::CheapestFirst {
                match a.unit_cost.partial_cmp(&b.unit_cost) {
                    Some(std::cmp::Ordering::Equal) | None => {}
                    Some(order) => return order,
                }
            }
            a.channel.priority().cmp(&b.channel.priority())
        });

        tracing::debug!(
            customer_id = %profile.customer_id,
            ranking = ?ranked.iter().map(|r| r.channel.display_name()).collect::<Vec<_>>(),
            "channels ranked"
        );

        ranked
    }

    fn score(&self, profile: &CustomerChannelProfile, channel: Channel, now: DateTime<Utc>) -> f64 {
        let (engagement, last_engaged) = match profile.engagement(channel) {
            Some(e) => (e.score, e.last_engaged),
            None => (NEUTRAL_ENGAGEMENT, None),
        };

        let recency = match last_engaged {
            Some(ts) => {
                let age_hours = (now - ts).num_minutes().max(0) as f64 / 60.0;
                let half_life = self.config.recency_half_life_hours.max(f64::EPSILON);
                (-age_hours * std::f64::consts::LN_2 / half_life).exp()
            }
            None => 0.0,
        };

        self.config.engagement_weight * engagement + self.config.recency_weight * recency
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use courier_core::types::ChannelEngagement;

    fn profile_with_scores(scores: &[(Channel, f64)]) -> CustomerChannelProfile {
        let mut profile = CustomerChannelProfile::new("cust-1");
        for &(channel, score) in scores {
            profile.channels.insert(
                channel,
                ChannelEngagement {
                    score,
                    last_engaged: None,
                },
            );
        }
        profile
    }

    #[test]
    fn test_engagement_dominates() {
        let ranker = ChannelRanker::new(DecisionConfig::default());
        let profile =
            profile_with_scores(&[(Channel::Sms, 0.2), (Channel::WhatsApp, 0.8)]);

        let ranked = ranker.rank(
            &profile,
            &[Channel::Sms, Channel::WhatsApp],
            Utc::now(),
        );

        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].channel, Channel::WhatsApp);
        assert_eq!(ranked[1].channel, Channel::Sms);
    }

    #[test]
    fn test_recency_breaks_equal_engagement() {
        let ranker = ChannelRanker::new(DecisionConfig::default());
        let now = Utc::now();

        let mut profile = profile_with_scores(&[(Channel::Sms, 0.5), (Channel::Email, 0.5)]);
        profile
            .channels
            .get_mut(&Channel::Sms)
            .unwrap()
            .last_engaged = Some(now - Duration::hours(1));
        profile
            .channels
            .get_mut(&Channel::Email)
            .unwrap()
            .last_engaged = Some(now - Duration::days(30));

        let ranked = ranker.rank(&profile, &[Channel::Email, Channel::Sms], now);
        assert_eq!(ranked[0].channel, Channel::Sms);
    }

    #[test]
    fn test_cost_breaks_exact_ties_cheapest_first() {
        let ranker = ChannelRanker::new(DecisionConfig::default());
        // No history on any channel: identical neutral scores.
        let profile = CustomerChannelProfile::new("cust-1");

        let ranked = ranker.rank(&profile, &[Channel::Sms, Channel::WhatsApp, Channel::Email], Utc::now());
        assert_eq!(ranked[0].channel, Channel::Email);
        assert_eq!(ranked[1].channel, Channel::WhatsApp);
        assert_eq!(ranked[2].channel, Channel::Sms);
    }

    #[test]
    fn test_cost_never_overrides_engagement() {
        let ranker = ChannelRanker::new(DecisionConfig::default());
        // SMS is the most expensive channel but clearly the most engaged.
        let profile =
            profile_with_scores(&[(Channel::Sms, 0.9), (Channel::Email, 0.3)]);

        let ranked = ranker.rank(&profile, &[Channel::Email, Channel::Sms], Utc::now());
        assert_eq!(ranked[0].channel, Channel::Sms);
    }

    #[test]
    fn test_engagement_only_policy_uses_priority_order() {
        let config = DecisionConfig {
            cost_policy: CostPolicy::EngagementOnly,
            ..DecisionConfig::default()
        };
        let ranker = ChannelRanker::new(config);
        let profile = CustomerChannelProfile::new("cust-1");

        let ranked = ranker.rank(&profile, &[Channel::Sms, Channel::WhatsApp], Utc::now());
        // Tied scores fall through to the fixed priority order.
        assert_eq!(ranked[0].channel, Channel::WhatsApp);
        assert_eq!(ranked[1].channel, Channel::Sms);
    }

    #[test]
    fn test_ranking_is_deterministic() {
        let ranker = ChannelRanker::new(DecisionConfig::default());
        let profile = profile_with_scores(&[
            (Channel::Sms, 0.4),
            (Channel::WhatsApp, 0.4),
            (Channel::Email, 0.4),
        ]);
        let now = Utc::now();

        let first = ranker.rank(&profile, &[Channel::WhatsApp, Channel::Email, Channel::Sms], now);
        for _ in 0..10 {
            let again =
                ranker.rank(&profile, &[Channel::Sms, Channel::WhatsApp, Channel::Email], now);
            let order: Vec<Channel> = again.iter().map(|r| r.channel).collect();
            let expected: Vec<Channel> = first.iter().map(|r| r.channel).collect();
            assert_eq!(order, expected);
        }
    }
}
