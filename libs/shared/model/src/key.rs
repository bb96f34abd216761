// [libs/shared/model/src/key.rs]
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

pub const MAX_CREDITS: i64 = 1_000_000_000;
pub const DEFAULT_NAMESPACE: &str = "default";

/// Per-tool pricing and rate-limit override, keyed by tool name in
/// `ApiKeyRecord::tool_pricing` and `KeyGroup::tool_pricing`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ToolPricing {
    #[serde(default)]
    pub credits_per_call: i64,
    #[serde(default)]
    pub rate_limit_per_min: u32,
}

/// Per-key daily/monthly ceilings; `0` (or a missing field) means
/// "no override at this level" — resolution walks key -> group -> global.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QuotaOverride {
    #[serde(default)]
    pub daily_call_limit: u64,
    #[serde(default)]
    pub monthly_call_limit: u64,
    #[serde(default)]
    pub daily_credit_limit: i64,
    #[serde(default)]
    pub monthly_credit_limit: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AutoTopup {
    pub threshold: i64,
    pub amount: i64,
    /// `0` means unlimited top-ups per day.
    #[serde(default)]
    pub max_daily: u32,
}

/// Defaults shared by every key assigned to a group; per-key settings
/// always take precedence on conflict (spec §4.2 step 7).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct KeyGroup {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub global_rate_limit_per_min: u32,
    #[serde(default)]
    pub tool_pricing: HashMap<String, ToolPricing>,
    #[serde(default)]
    pub ip_allowlist: Vec<String>,
    #[serde(default)]
    pub quota: Option<QuotaOverride>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiKeyRecord {
    /// Immutable, CSPRNG-derived bearer secret (`<prefix>_<48 hex chars>`).
    pub fingerprint: String,
    pub name: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default = "default_namespace")]
    pub namespace: String,

    pub credits: i64,
    #[serde(default)]
    pub total_spent: i64,
    #[serde(default)]
    pub total_calls: u64,

    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub suspended: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_used_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub allowed_tools: HashSet<String>,
    #[serde(default)]
    pub denied_tools: HashSet<String>,
    #[serde(default)]
    pub ip_allowlist: Vec<String>,
    /// `0` = unlimited cumulative spend.
    #[serde(default)]
    pub spending_limit: i64,

    #[serde(default)]
    pub tool_pricing: HashMap<String, ToolPricing>,
    #[serde(default)]
    pub default_credits_per_call: i64,
    #[serde(default)]
    pub global_rate_limit_per_min: u32,

    #[serde(default)]
    pub quota_override: Option<QuotaOverride>,
    #[serde(default)]
    pub quota_daily_calls: u64,
    #[serde(default)]
    pub quota_monthly_calls: u64,
    #[serde(default)]
    pub quota_daily_credits: i64,
    #[serde(default)]
    pub quota_monthly_credits: i64,
    #[serde(default)]
    pub quota_last_reset_day: String,
    #[serde(default)]
    pub quota_last_reset_month: String,

    #[serde(default)]
    pub auto_topup: Option<AutoTopup>,
    #[serde(default)]
    pub auto_topup_today_count: u32,
    #[serde(default)]
    pub auto_topup_last_reset_day: String,

    #[serde(default)]
    pub tags: HashMap<String, String>,
    #[serde(default)]
    pub group: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

impl ApiKeyRecord {
    /// `true` iff the record is currently usable at request time (spec
    /// §4.1 `getKey`): active and not past wall-clock expiry. A missing
    /// `expires_at` never expires.
    pub fn is_currently_usable(&self, now: DateTime<Utc>) -> bool {
        self.active && !self.is_expired(now)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expiry) => expiry <= now,
            None => false,
        }
    }
}
