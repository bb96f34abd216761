// [libs/core/metering/src/usage_meter.rs]
/*!
 * Bounded ring of `UsageEvent`s (spec §3, §4.4). On overflow the oldest
 * 25% are dropped in one amortized-constant sweep rather than one pop
 * per insert, matching the spec's explicit overflow policy.
 */

use chrono::{DateTime, Utc};
use paygate_model::UsageEvent;
use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

pub const DEFAULT_CAPACITY: usize = 100_000;

pub struct UsageMeter {
    capacity: usize,
    events: RwLock<VecDeque<UsageEvent>>,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ToolSummary {
    pub calls: u64,
    pub credits: i64,
    pub denied: u64,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct UsageSummary {
    pub total_calls: u64,
    pub total_credits_spent: i64,
    pub total_denied: u64,
    pub per_tool: HashMap<String, ToolSummary>,
    pub per_key: HashMap<String, ToolSummary>,
    pub deny_reasons: HashMap<String, u64>,
}

#[derive(Debug, Clone, Default)]
pub struct UsageQuery {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub tool: Option<String>,
    pub key_name: Option<String>,
    pub allowed: Option<bool>,
    pub action: Option<String>,
}

impl UsageMeter {
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), events: RwLock::new(VecDeque::new()) }
    }

    pub fn record(&self, event: UsageEvent) {
        let mut guard = self.events.write().expect("usage meter lock poisoned");
        guard.push_back(event);

        if guard.len() > self.capacity {
            let drop_count = (self.capacity as f64 * 0.25).ceil() as usize;
            for _ in 0..drop_count.min(guard.len()) {
                guard.pop_front();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.events.read().expect("usage meter lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get_summary(&self) -> UsageSummary {
        let guard = self.events.read().expect("usage meter lock poisoned");
        let mut summary = UsageSummary::default();

        for event in guard.iter() {
            summary.total_calls += 1;
            if event.allowed {
                summary.total_credits_spent += event.credits_charged;
            } else {
                summary.total_denied += 1;
                if let Some(reason) = &event.deny_reason {
                    *summary.deny_reasons.entry(reason.clone()).or_default() += 1;
                }
            }

            let per_tool = summary.per_tool.entry(event.tool.clone()).or_default();
            per_tool.calls += 1;
            if event.allowed {
                per_tool.credits += event.credits_charged;
            } else {
                per_tool.denied += 1;
            }

            let per_key = summary.per_key.entry(event.key_name.clone()).or_default();
            per_key.calls += 1;
            if event.allowed {
                per_key.credits += event.credits_charged;
            } else {
                per_key.denied += 1;
            }
        }

        summary
    }

    pub fn query(&self, query: &UsageQuery) -> Vec<UsageEvent> {
        let guard = self.events.read().expect("usage meter lock poisoned");
        guard
            .iter()
            .filter(|event| {
                if let Some(since) = query.since {
                    if event.timestamp < since {
                        return false;
                    }
                }
                if let Some(until) = query.until {
                    if event.timestamp > until {
                        return false;
                    }
                }
                if let Some(tool) = &query.tool {
                    if &event.tool != tool {
                        return false;
                    }
                }
                if let Some(key_name) = &query.key_name {
                    if &event.key_name != key_name {
                        return false;
                    }
                }
                if let Some(allowed) = query.allowed {
                    if event.allowed != allowed {
                        return false;
                    }
                }
                if let Some(action) = &query.action {
                    if event.action.as_deref() != Some(action.as_str()) {
                        return false;
                    }
                }
                true
            })
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event(tool: &str, allowed: bool) -> UsageEvent {
        UsageEvent {
            timestamp: Utc::now(),
            api_key_fingerprint: "pg_abc".into(),
            key_name: "tester".into(),
            tool: tool.into(),
            credits_charged: if allowed { 1 } else { 0 },
            allowed,
            action: Some("tools/call".into()),
            deny_reason: if allowed { None } else { Some("rate_limited".into()) },
            duration_ms: Some(5),
            key_namespace: Some("default".into()),
        }
    }

    #[test]
    fn overflow_drops_oldest_twenty_five_percent() {
        let meter = UsageMeter::new(4);
        for i in 0..5 {
            meter.record(sample_event(&format!("tool{i}"), true));
        }
        assert!(meter.len() <= 4);
    }

    #[test]
    fn summary_counts_denials_and_reasons() {
        let meter = UsageMeter::new(100);
        meter.record(sample_event("search", true));
        meter.record(sample_event("search", false));
        let summary = meter.get_summary();
        assert_eq!(summary.total_calls, 2);
        assert_eq!(summary.total_denied, 1);
        assert_eq!(summary.deny_reasons.get("rate_limited"), Some(&1));
    }

    #[test]
    fn query_filters_by_action() {
        let meter = UsageMeter::new(100);
        meter.record(sample_event("search", true));
        let mut topup = sample_event("payment:stripe", true);
        topup.action = Some("payment:topup".into());
        meter.record(topup);

        let results = meter.query(&UsageQuery { action: Some("payment:topup".into()), ..Default::default() });
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].tool, "payment:stripe");
    }
}
