// [libs/shared/model/src/grant.rs]
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Time-bounded credit tranche, independent of `ApiKeyRecord::credits`,
/// consumed FIFO by expiry (spec §3, §4.5).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreditGrant {
    pub id: String,
    pub key: String,
    pub original_amount: i64,
    pub remaining_amount: i64,
    pub granted_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub expired: bool,
    pub source: String,
}
