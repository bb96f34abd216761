// [libs/core/gate/src/approval.rs]
/*!
 * Approval gate (spec §4.2 step 13). Rules are configured out of band
 * (admin API, not modeled here); this registry matches a call against
 * the enabled rule set and tracks pending requests until an operator
 * resolves them.
 */

use chrono::Utc;
use paygate_model::{ApprovalCondition, ApprovalRequest, ApprovalRequestStatus, ApprovalRule, JsonValue};
use std::collections::HashMap;
use std::sync::RwLock;

pub struct ApprovalRegistry {
    rules: RwLock<Vec<ApprovalRule>>,
    requests: RwLock<HashMap<String, ApprovalRequest>>,
}

impl Default for ApprovalRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ApprovalRegistry {
    pub fn new() -> Self {
        Self { rules: RwLock::new(Vec::new()), requests: RwLock::new(HashMap::new()) }
    }

    pub fn set_rules(&self, rules: Vec<ApprovalRule>) {
        *self.rules.write().expect("approval rules lock poisoned") = rules;
    }

    pub fn rules(&self) -> Vec<ApprovalRule> {
        self.rules.read().expect("approval rules lock poisoned").clone()
    }

    /// First enabled rule whose every condition matches, or `None`.
    pub fn match_rule(&self, tool: &str, price: i64, key_fingerprint: &str) -> Option<ApprovalRule> {
        let guard = self.rules.read().expect("approval rules lock poisoned");
        guard.iter().find(|rule| rule.enabled && rule.conditions.iter().all(|c| condition_matches(c, tool, price, key_fingerprint))).cloned()
    }

    pub fn create_request(&self, rule_id: &str, key_fingerprint: &str, tool: &str, args: JsonValue, price: i64) -> ApprovalRequest {
        let request = ApprovalRequest {
            id: format!("appr_{}", uuid::Uuid::new_v4()),
            rule_id: rule_id.to_string(),
            key_fingerprint: key_fingerprint.to_string(),
            tool: tool.to_string(),
            args,
            price,
            status: ApprovalRequestStatus::Pending,
            created_at: Utc::now(),
        };
        self.requests.write().expect("approval requests lock poisoned").insert(request.id.clone(), request.clone());
        request
    }

    pub fn get_request(&self, id: &str) -> Option<ApprovalRequest> {
        self.requests.read().expect("approval requests lock poisoned").get(id).cloned()
    }

    pub fn resolve(&self, id: &str, approve: bool) -> Option<ApprovalRequest> {
        let mut guard = self.requests.write().expect("approval requests lock poisoned");
        let request = guard.get_mut(id)?;
        if request.status != ApprovalRequestStatus::Pending {
            return None;
        }
        request.status = if approve { ApprovalRequestStatus::Approved } else { ApprovalRequestStatus::Denied };
        Some(request.clone())
    }
}

fn condition_matches(condition: &ApprovalCondition, tool: &str, price: i64, key_fingerprint: &str) -> bool {
    match condition {
        ApprovalCondition::CostThreshold { min_credits } => price >= *min_credits,
        ApprovalCondition::ToolMatch { pattern } => glob_match(pattern, tool),
        ApprovalCondition::KeyMatch { prefix } => key_fingerprint.starts_with(prefix.as_str()),
    }
}

/// Minimal `*`-glob matcher: `*` matches any run of characters (including
/// none), everything else is literal. No `?`/character-class support —
/// the spec only names the `*` wildcard.
fn glob_match(pattern: &str, candidate: &str) -> bool {
    let segments: Vec<&str> = pattern.split('*').collect();
    if segments.len() == 1 {
        return pattern == candidate;
    }

    let mut rest = candidate;
    for (i, segment) in segments.iter().enumerate() {
        if segment.is_empty() {
            continue;
        }
        if i == 0 {
            if !rest.starts_with(segment) {
                return false;
            }
            rest = &rest[segment.len()..];
        } else if i == segments.len() - 1 {
            return rest.ends_with(segment);
        } else {
            match rest.find(segment) {
                Some(pos) => rest = &rest[pos + segment.len()..],
                None => return false,
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rule(pattern: &str) -> ApprovalRule {
        ApprovalRule {
            id: "r1".into(),
            name: "big tool calls".into(),
            enabled: true,
            conditions: vec![ApprovalCondition::ToolMatch { pattern: pattern.to_string() }],
        }
    }

    #[test]
    fn glob_star_matches_prefix() {
        assert!(glob_match("admin_*", "admin_delete"));
        assert!(!glob_match("admin_*", "search"));
    }

    #[test]
    fn disabled_rules_never_match() {
        let registry = ApprovalRegistry::new();
        let mut r = rule("*");
        r.enabled = false;
        registry.set_rules(vec![r]);
        assert!(registry.match_rule("search", 1, "pg_abc").is_none());
    }

    #[test]
    fn request_lifecycle_resolves_once() {
        let registry = ApprovalRegistry::new();
        let request = registry.create_request("r1", "pg_abc", "search", json!({}), 10);
        assert!(registry.resolve(&request.id, true).is_some());
        assert!(registry.resolve(&request.id, true).is_none());
    }
}
