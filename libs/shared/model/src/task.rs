// [libs/shared/model/src/task.rs]
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::JsonValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled)
    }
}

/// An async tool invocation tracked by `TaskManager` (spec §3, §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub status: TaskStatus,
    pub tool_name: String,
    pub arguments: JsonValue,
    /// Truncated key prefix only — never the raw fingerprint (spec §7).
    pub api_key_prefix: String,
    #[serde(default)]
    pub session_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub credits_charged: i64,
    #[serde(default)]
    pub outcome_credits: Option<i64>,
    #[serde(default)]
    pub result: Option<JsonValue>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
}

impl Task {
    pub fn new(id: String, tool_name: String, arguments: JsonValue, api_key_prefix: String, session_id: Option<String>) -> Self {
        Self {
            id,
            status: TaskStatus::Pending,
            tool_name,
            arguments,
            api_key_prefix,
            session_id,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            progress: 0,
            message: None,
            credits_charged: 0,
            outcome_credits: None,
            result: None,
            error: None,
            duration_ms: None,
        }
    }
}
