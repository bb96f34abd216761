// [libs/shared/model/src/usage.rs]
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Append-only record of one admission decision, retained by the
/// `UsageMeter` ring buffer (spec §3, §4.4).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UsageEvent {
    pub timestamp: DateTime<Utc>,
    pub api_key_fingerprint: String,
    pub key_name: String,
    pub tool: String,
    pub credits_charged: i64,
    pub allowed: bool,
    /// The originating JSON-RPC method (`tools/call`, `tasks/send`, ...)
    /// or synthetic payment action (`payment:topup`) that produced this
    /// event, distinct from `tool` which names the specific tool charged.
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub deny_reason: Option<String>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub key_namespace: Option<String>,
}
