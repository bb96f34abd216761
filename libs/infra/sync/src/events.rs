// [libs/infra/sync/src/events.rs]
/*!
 * Pub/sub event envelope published/consumed on `<prefix>:events`
 * (spec §4.7 "Event stream"). Every publication carries the publisher's
 * `instanceId`; `DistributedSync` drops messages whose `instanceId`
 * matches its own.
 */

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncEventKind {
    KeyUpdated { fingerprint: String },
    KeyCreated { fingerprint: String },
    KeyRevoked { fingerprint: String },
    CreditsChanged { fingerprint: String, credits: i64, total_spent: i64, total_calls: u64 },
    TokenRevoked { token: String },
    GroupUpdated { id: String },
    GroupDeleted { id: String },
    GroupAssignmentChanged { fingerprint: String, group: Option<String> },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncEvent {
    pub instance_id: String,
    #[serde(flatten)]
    pub kind: SyncEventKind,
}

impl SyncEvent {
    pub fn new(instance_id: &str, kind: SyncEventKind) -> Self {
        Self { instance_id: instance_id.to_string(), kind }
    }

    pub fn to_payload(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_payload(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let event = SyncEvent::new("inst-1", SyncEventKind::KeyRevoked { fingerprint: "pg_abc".into() });
        let payload = event.to_payload().unwrap();
        let parsed = SyncEvent::from_payload(&payload).unwrap();
        assert_eq!(parsed, event);
    }
}
