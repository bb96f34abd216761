// [apps/gateway/src/state/webhook_filters.rs]
/*!
 * Outbound-webhook routing rules (spec §6, `/webhooks/filters`). Not a
 * core-domain concept — just which event kinds get delivered to which
 * admin-configured URL — so it lives here rather than in
 * `paygate-webhook`, which only knows how to *deliver* to a URL once
 * one has been chosen.
 */

use serde::{Deserialize, Serialize};
use std::sync::RwLock;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WebhookFilterRule {
    pub event_type: String,
    pub url: String,
}

#[derive(Default)]
pub struct WebhookFilterStore {
    rules: RwLock<Vec<WebhookFilterRule>>,
}

impl WebhookFilterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn list(&self) -> Vec<WebhookFilterRule> {
        self.rules.read().expect("webhook filter lock poisoned").clone()
    }

    pub fn replace(&self, rules: Vec<WebhookFilterRule>) {
        *self.rules.write().expect("webhook filter lock poisoned") = rules;
    }

    pub fn matching(&self, event_type: &str) -> Vec<String> {
        self.rules
            .read()
            .expect("webhook filter lock poisoned")
            .iter()
            .filter(|rule| rule.event_type == event_type)
            .map(|rule| rule.url.clone())
            .collect()
    }
}
