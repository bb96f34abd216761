// [libs/shared/model/src/approval.rs]
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::JsonValue;

/// One condition of an `ApprovalRule` (spec §4.2 step 13). A rule is
/// satisfied when all of its conditions match a given call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApprovalCondition {
    CostThreshold { min_credits: i64 },
    /// `*` glob against the tool name.
    ToolMatch { pattern: String },
    /// Prefix match against the key fingerprint.
    KeyMatch { prefix: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApprovalRule {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub conditions: Vec<ApprovalCondition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalRequestStatus {
    Pending,
    Approved,
    Denied,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: String,
    pub rule_id: String,
    pub key_fingerprint: String,
    pub tool: String,
    pub args: JsonValue,
    pub price: i64,
    pub status: ApprovalRequestStatus,
    pub created_at: DateTime<Utc>,
}
