use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `COURIER__`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub fatigue: FatigueConfig,
    #[serde(default)]
    pub decision: DecisionConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub tracker: TrackerConfig,
}

// ─── Rate Limit Config ──────────────────────────────────────────────────

/// Per-channel steady rate and burst capacity. Defaults mirror the
/// provider limits the gateways operate under.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelLimit {
    pub rate_per_sec: f64,
    pub burst_capacity: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_sms_limit")]
    pub sms: ChannelLimit,
    #[serde(default = "default_whatsapp_limit")]
    pub whatsapp: ChannelLimit,
    #[serde(default = "default_email_limit")]
    pub email: ChannelLimit,
    /// Burst = multiplier × rate for channels without an explicit limit.
    #[serde(default = "default_burst_multiplier")]
    pub default_burst_multiplier: f64,
}

fn default_sms_limit() -> ChannelLimit {
    ChannelLimit {
        rate_per_sec: 20.0,
        burst_capacity: 100.0,
    }
}
fn default_whatsapp_limit() -> ChannelLimit {
    ChannelLimit {
        rate_per_sec: 80.0,
        burst_capacity: 1000.0,
    }
}
fn default_email_limit() -> ChannelLimit {
    ChannelLimit {
        rate_per_sec: 14.0,
        burst_capacity: 100.0,
    }
}
fn default_burst_multiplier() -> f64 {
    5.0
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            sms: default_sms_limit(),
            whatsapp: default_whatsapp_limit(),
            email: default_email_limit(),
            default_burst_multiplier: default_burst_multiplier(),
        }
    }
}

// ─── Fatigue Config ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct FatigueConfig {
    #[serde(default = "default_window_hours")]
    pub window_hours: u32,
    #[serde(default = "default_max_sends")]
    pub max_sends_in_window: u32,
}

fn default_window_hours() -> u32 {
    24
}
fn default_max_sends() -> u32 {
    3
}

impl Default for FatigueConfig {
    fn default() -> Self {
        Self {
            window_hours: default_window_hours(),
            max_sends_in_window: default_max_sends(),
        }
    }
}

// ─── Decision Config ────────────────────────────────────────────────────

/// Tie-break policy when channel scores are equal. Cost preference is a
/// policy choice, not fixed behavior.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CostPolicy {
    #[default]
    CheapestFirst,
    EngagementOnly,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DecisionConfig {
    #[serde(default = "default_engagement_weight")]
    pub engagement_weight: f64,
    #[serde(default = "default_recency_weight")]
    pub recency_weight: f64,
    #[serde(default = "default_recency_half_life_hours")]
    pub recency_half_life_hours: f64,
    #[serde(default)]
    pub cost_policy: CostPolicy,
}

fn default_engagement_weight() -> f64 {
    0.7
}
fn default_recency_weight() -> f64 {
    0.3
}
fn default_recency_half_life_hours() -> f64 {
    72.0
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            engagement_weight: default_engagement_weight(),
            recency_weight: default_recency_weight(),
            recency_half_life_hours: default_recency_half_life_hours(),
            cost_policy: CostPolicy::default(),
        }
    }
}

// ─── Dispatch Config ────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Additional channels tried after a send-time failure on the top pick.
    #[serde(default = "default_max_channel_fallback")]
    pub max_channel_fallback: u32,
    #[serde(default = "default_max_reschedules")]
    pub max_rate_limit_reschedules: u32,
    #[serde(default = "default_backoff_cap_secs")]
    pub reschedule_backoff_cap_secs: u64,
    #[serde(default = "default_gateway_timeout_secs")]
    pub gateway_timeout_secs: u64,
}

fn default_workers() -> usize {
    4
}
fn default_max_channel_fallback() -> u32 {
    2
}
fn default_max_reschedules() -> u32 {
    5
}
fn default_backoff_cap_secs() -> u64 {
    30
}
fn default_gateway_timeout_secs() -> u64 {
    10
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_channel_fallback: default_max_channel_fallback(),
            max_rate_limit_reschedules: default_max_reschedules(),
            reschedule_backoff_cap_secs: default_backoff_cap_secs(),
            gateway_timeout_secs: default_gateway_timeout_secs(),
        }
    }
}

// ─── Tracker Config ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct TrackerConfig {
    /// Step size for engagement-score feedback updates.
    #[serde(default = "default_feedback_alpha")]
    pub feedback_alpha: f64,
    /// How many suppression reasons to retain per campaign for audit.
    #[serde(default = "default_suppression_sample_size")]
    pub suppression_sample_size: usize,
}

fn default_feedback_alpha() -> f64 {
    0.1
}
fn default_suppression_sample_size() -> usize {
    10
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            feedback_alpha: default_feedback_alpha(),
            suppression_sample_size: default_suppression_sample_size(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("COURIER")
                .separator("__")
                .try_parsing(true)
                .list_separator(","),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}
