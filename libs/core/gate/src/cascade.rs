// [libs/core/gate/src/cascade.rs]
/*!
 * The admission cascade (spec §4.2). `Gate::admit` is the single entry
 * point every inbound call passes through; it never suspends — the only
 * I/O is the in-memory KeyStore/RateLimiter/UsageMeter it owns. Shadow
 * mode still runs the full cascade but forces `allowed=true`, prefixing
 * the real reason with `shadow:`.
 */

use crate::approval::ApprovalRegistry;
use crate::ip;
use crate::reason::DenyReason;
use chrono::Utc;
use paygate_keystore::KeyStore;
use paygate_metering::{quota, GlobalQuotaDefaults, RateLimiter, UsageMeter};
use paygate_model::{ApiKeyRecord, JsonValue, UsageEvent};
use paygate_sync::{DeductOutcome, DistributedSync};
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Methods that bypass the entire cascade at zero cost (spec §4.2 step 1).
const FREE_METHODS: &[&str] = &["initialize", "tools/list", "ping", "logging/setLevel"];

fn is_free_method(method: &str) -> bool {
    FREE_METHODS.contains(&method) || method.starts_with("notifications/")
}

#[derive(Debug, Clone, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub allowed: bool,
    pub credits_charged: i64,
    pub reason: Option<String>,
    pub remaining_credits: i64,
    pub approval_request_id: Option<String>,
}

impl Decision {
    fn allow(credits_charged: i64, remaining_credits: i64) -> Self {
        Self { allowed: true, credits_charged, reason: None, remaining_credits, approval_request_id: None }
    }

    fn deny(reason: DenyReason, remaining_credits: i64) -> Self {
        Self { allowed: false, credits_charged: 0, reason: Some(reason.to_string()), remaining_credits, approval_request_id: None }
    }
}

pub struct BatchCall {
    pub tool: String,
    pub args: JsonValue,
}

/// Internal carrier for a failed cascade step; never surfaced directly.
struct Denial {
    reason: DenyReason,
    remaining_credits: i64,
    approval_request_id: Option<String>,
}

impl Denial {
    fn new(reason: DenyReason, remaining_credits: i64) -> Self {
        Self { reason, remaining_credits, approval_request_id: None }
    }
}

pub struct Gate {
    keystore: Arc<KeyStore>,
    rate_limiter: RateLimiter,
    usage_meter: Arc<UsageMeter>,
    approvals: ApprovalRegistry,
    global_quota_defaults: GlobalQuotaDefaults,
    shadow_mode: AtomicBool,
    sync: Option<Arc<Mutex<DistributedSync>>>,
}

impl Gate {
    pub fn new(keystore: Arc<KeyStore>, usage_meter: Arc<UsageMeter>, global_quota_defaults: GlobalQuotaDefaults) -> Self {
        Self {
            keystore,
            rate_limiter: RateLimiter::with_default_window(),
            usage_meter,
            approvals: ApprovalRegistry::new(),
            global_quota_defaults,
            shadow_mode: AtomicBool::new(false),
            sync: None,
        }
    }

    /// Wires the shared-cache mirror in as the authoritative debit path
    /// (spec §4.7 "Atomic deduction"). Left unset, `commit` only ever
    /// touches the local `KeyStore`.
    pub fn with_distributed_sync(mut self, sync: Arc<Mutex<DistributedSync>>) -> Self {
        self.sync = Some(sync);
        self
    }

    pub fn set_shadow_mode(&self, enabled: bool) {
        self.shadow_mode.store(enabled, Ordering::Relaxed);
    }

    pub fn shadow_mode(&self) -> bool {
        self.shadow_mode.load(Ordering::Relaxed)
    }

    pub fn approvals(&self) -> &ApprovalRegistry {
        &self.approvals
    }

    pub async fn admit(&self, method: &str, key: Option<&str>, tool: &str, args: JsonValue, client_ip: Option<IpAddr>) -> Decision {
        if is_free_method(method) {
            return Decision::allow(0, 0);
        }

        let shadow = self.shadow_mode();
        let outcome = self.evaluate(method, key, tool, &args, client_ip).await;

        match outcome {
            Ok(decision) => decision,
            Err(denial) if shadow => {
                let mut decision = Decision::allow(0, denial.remaining_credits);
                decision.reason = Some(denial.reason.shadowed());
                decision
            }
            Err(denial) => {
                self.record_denial(method, key, tool, &denial.reason, denial.remaining_credits);
                let mut decision = Decision::deny(denial.reason, denial.remaining_credits);
                decision.approval_request_id = denial.approval_request_id;
                decision
            }
        }
    }

    /// Runs the full cascade and returns either the allow-decision or a
    /// `Denial` describing the first failed check.
    async fn evaluate(&self, method: &str, key: Option<&str>, tool: &str, args: &JsonValue, client_ip: Option<IpAddr>) -> Result<Decision, Denial> {
        let fingerprint = key.ok_or_else(|| Denial::new(DenyReason::MissingApiKey, 0))?;

        let raw = self.keystore.get_key_raw(fingerprint);
        let now = Utc::now();
        let record = match &raw {
            None => return Err(Denial::new(DenyReason::InvalidApiKey, 0)),
            Some(r) if !r.active => return Err(Denial::new(DenyReason::InvalidApiKey, r.credits)),
            Some(r) if r.is_expired(now) => return Err(Denial::new(DenyReason::ApiKeyExpired, r.credits)),
            Some(r) => r,
        };

        if record.suspended {
            return Err(Denial::new(DenyReason::KeySuspended, record.credits));
        }

        let group = record.group.as_deref().and_then(|g| self.keystore.group(g));

        let effective_ip_allowlist = if !record.ip_allowlist.is_empty() {
            record.ip_allowlist.clone()
        } else {
            group.as_ref().map(|g| g.ip_allowlist.clone()).unwrap_or_default()
        };
        if !effective_ip_allowlist.is_empty() {
            match client_ip {
                Some(addr) if ip::matches(&effective_ip_allowlist, &addr) => {}
                _ => return Err(Denial::new(DenyReason::IpNotAllowed, record.credits)),
            }
        }

        if !record.allowed_tools.is_empty() && !record.allowed_tools.contains(tool) {
            return Err(Denial::new(DenyReason::ToolNotAllowed, record.credits));
        }
        if record.denied_tools.contains(tool) {
            return Err(Denial::new(DenyReason::ToolDenied, record.credits));
        }

        let effective_global_rate_limit = if record.global_rate_limit_per_min > 0 {
            record.global_rate_limit_per_min
        } else {
            group.as_ref().map(|g| g.global_rate_limit_per_min).unwrap_or(0)
        };
        let effective_tool_pricing = record
            .tool_pricing
            .get(tool)
            .cloned()
            .or_else(|| group.as_ref().and_then(|g| g.tool_pricing.get(tool).cloned()));

        let global_outcome = self.rate_limiter.admit(fingerprint, effective_global_rate_limit);
        if !global_outcome.allowed {
            return Err(Denial::new(DenyReason::RateLimited, record.credits));
        }
        if let Some(pricing) = &effective_tool_pricing {
            if pricing.rate_limit_per_min > 0 {
                let scope = format!("{fingerprint}:tool:{tool}");
                let tool_outcome = self.rate_limiter.admit(&scope, pricing.rate_limit_per_min);
                if !tool_outcome.allowed {
                    return Err(Denial::new(DenyReason::ToolRateLimited, record.credits));
                }
            }
        }

        self.keystore.roll_quota_window(fingerprint, now);
        // Re-fetch: roll_quota_window may have reset the counters we check below.
        let record = self.keystore.get_key_raw(fingerprint).unwrap_or_else(|| record.clone());

        let price = effective_tool_pricing.as_ref().map(|p| p.credits_per_call).unwrap_or(record.default_credits_per_call);

        let effective_quota = quota::resolve(
            record.quota_override.as_ref(),
            group.as_ref().and_then(|g| g.quota.as_ref()),
            self.global_quota_defaults,
        );
        if let Some(dimension) = quota::check(
            effective_quota,
            record.quota_daily_calls,
            record.quota_monthly_calls,
            record.quota_daily_credits,
            record.quota_monthly_credits,
            price,
        ) {
            return Err(Denial::new(DenyReason::QuotaExceeded(dimension), record.credits));
        }

        if record.spending_limit > 0 && record.total_spent + price > record.spending_limit {
            return Err(Denial::new(DenyReason::SpendingLimitExceeded, record.credits));
        }

        if record.credits < price {
            return Err(Denial::new(DenyReason::InsufficientCredits, record.credits));
        }

        if let Some(rule) = self.approvals.match_rule(tool, price, fingerprint) {
            let request = self.approvals.create_request(&rule.id, fingerprint, tool, args.clone(), price);
            let mut denial = Denial::new(DenyReason::ApprovalRequired, record.credits);
            denial.approval_request_id = Some(request.id);
            return Err(denial);
        }

        let remaining = self.commit(&record, price).await?;
        self.emit_usage_event(&record, method, tool, price, true, None, now);
        self.maybe_auto_topup(fingerprint, remaining, now);

        Ok(Decision::allow(price, remaining))
    }

    /// Debits `price` from `record`. When a distributed mirror is wired
    /// in, `DistributedSync::atomic_deduct` is the single authoritative
    /// path (spec §4.7 "Atomic deduction"); the local `KeyStore` is only
    /// touched directly when no mirror is configured or the script call
    /// itself fails to reach the cache.
    async fn commit(&self, record: &ApiKeyRecord, price: i64) -> Result<i64, Denial> {
        if price == 0 {
            self.keystore.bump_quota_counters(&record.fingerprint, 0);
            return Ok(record.credits);
        }

        if let Some(sync) = &self.sync {
            let mut guard = sync.lock().await;
            match guard.atomic_deduct(&record.fingerprint, price).await {
                Ok(DeductOutcome::Debited { credits, .. }) => {
                    drop(guard);
                    self.keystore.bump_quota_counters(&record.fingerprint, price);
                    return Ok(credits);
                }
                Ok(DeductOutcome::InsufficientCredits) => {
                    return Err(Denial::new(DenyReason::InsufficientCredits, record.credits));
                }
                Ok(DeductOutcome::Inactive) => {
                    return Err(Denial::new(DenyReason::InvalidApiKey, record.credits));
                }
                Err(err) => {
                    guard.note_fallback();
                    tracing::warn!(error = %err, "atomic deduct unreachable, falling back to local KeyStore");
                }
            }
        }

        match self.keystore.deduct_credits(&record.fingerprint, price) {
            Ok(remaining) => {
                self.keystore.bump_quota_counters(&record.fingerprint, price);
                Ok(remaining)
            }
            Err(_) => Err(Denial::new(DenyReason::InsufficientCredits, record.credits)),
        }
    }

    fn maybe_auto_topup(&self, fingerprint: &str, remaining_credits: i64, now: chrono::DateTime<Utc>) {
        let Some(record) = self.keystore.get_key_raw(fingerprint) else { return };
        let Some(topup) = &record.auto_topup else { return };
        if remaining_credits >= topup.threshold {
            return;
        }
        if topup.max_daily != 0 && record.auto_topup_today_count >= topup.max_daily {
            return;
        }
        self.keystore.apply_auto_topup(fingerprint, topup.amount, now);
        tracing::info!(fingerprint = %truncate_fingerprint(fingerprint), amount = topup.amount, "auto_topped_up");
    }

    fn record_denial(&self, method: &str, key: Option<&str>, tool: &str, reason: &DenyReason, _remaining: i64) {
        let (fingerprint, key_name, namespace) = match key.and_then(|k| self.keystore.get_key_raw(k)) {
            Some(record) => (record.fingerprint, record.name, Some(record.namespace)),
            None => (key.unwrap_or("unknown").to_string(), "unknown".to_string(), None),
        };
        self.usage_meter.record(UsageEvent {
            timestamp: Utc::now(),
            api_key_fingerprint: fingerprint,
            key_name,
            tool: tool.to_string(),
            credits_charged: 0,
            allowed: false,
            action: Some(method.to_string()),
            deny_reason: Some(reason.to_string()),
            duration_ms: None,
            key_namespace: namespace,
        });
    }

    fn emit_usage_event(&self, record: &ApiKeyRecord, method: &str, tool: &str, price: i64, allowed: bool, deny_reason: Option<String>, timestamp: chrono::DateTime<Utc>) {
        self.usage_meter.record(UsageEvent {
            timestamp,
            api_key_fingerprint: record.fingerprint.clone(),
            key_name: record.name.clone(),
            tool: tool.to_string(),
            credits_charged: price,
            allowed,
            action: Some(method.to_string()),
            deny_reason,
            duration_ms: None,
            key_namespace: Some(record.namespace.clone()),
        });
    }

    /// Charges the sum of all prices atomically against the provisional
    /// post-batch state (spec §4.2 "Batch admission"): if any call would
    /// fail, nothing in the batch is applied. No server-side script
    /// covers a whole batch (spec §4.7 only names single-call deduct/
    /// top-up/rate-check scripts), so this always settles against the
    /// local `KeyStore` even when a distributed mirror is configured.
    pub fn admit_batch(&self, key: &str, calls: &[BatchCall]) -> Decision {
        if calls.is_empty() {
            return Decision::deny(DenyReason::InsufficientCredits, 0);
        }

        let Some(record) = self.keystore.get_key_raw(key) else {
            return Decision::deny(DenyReason::InvalidApiKey, 0);
        };
        let now = Utc::now();
        if !record.active {
            return Decision::deny(DenyReason::InvalidApiKey, record.credits);
        }
        if record.is_expired(now) {
            return Decision::deny(DenyReason::ApiKeyExpired, record.credits);
        }
        if record.suspended {
            return Decision::deny(DenyReason::KeySuspended, record.credits);
        }

        let group = record.group.as_deref().and_then(|g| self.keystore.group(g));
        let mut provisional_credits = record.credits;
        let mut total_price = 0i64;

        for call in calls {
            if !record.allowed_tools.is_empty() && !record.allowed_tools.contains(&call.tool) {
                return Decision::deny(DenyReason::ToolNotAllowed, record.credits);
            }
            if record.denied_tools.contains(&call.tool) {
                return Decision::deny(DenyReason::ToolDenied, record.credits);
            }
            let price = record
                .tool_pricing
                .get(&call.tool)
                .cloned()
                .or_else(|| group.as_ref().and_then(|g| g.tool_pricing.get(&call.tool).cloned()))
                .map(|p| p.credits_per_call)
                .unwrap_or(record.default_credits_per_call);

            provisional_credits -= price;
            total_price += price;
            if provisional_credits < 0 {
                return Decision::deny(DenyReason::InsufficientCredits, record.credits);
            }
        }

        if record.spending_limit > 0 && record.total_spent + total_price > record.spending_limit {
            return Decision::deny(DenyReason::SpendingLimitExceeded, record.credits);
        }

        match self.keystore.deduct_credits(&record.fingerprint, total_price.max(0)) {
            Ok(remaining) => {
                if total_price > 0 {
                    self.keystore.bump_quota_counters(&record.fingerprint, total_price);
                }
                for call in calls {
                    self.emit_usage_event(&record, "tasks/send", &call.tool, 0, true, None, now);
                }
                Decision::allow(total_price, remaining)
            }
            Err(_) => Decision::deny(DenyReason::InsufficientCredits, record.credits),
        }
    }

    /// Restores credits after a downstream failure (spec §4.2 "Refund").
    pub fn refund(&self, key: &str, amount: i64) {
        self.keystore.refund(key, amount);
    }
}

fn truncate_fingerprint(fingerprint: &str) -> String {
    fingerprint.chars().take(12).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use paygate_keystore::{CreateKeyOptions, KeyStore};
    use paygate_metering::UsageMeter;
    use paygate_model::key::ToolPricing;
    use std::collections::HashMap;

    fn gate() -> (Gate, Arc<KeyStore>) {
        let keystore = Arc::new(KeyStore::new("pg", None));
        let usage = Arc::new(UsageMeter::new(1_000));
        let gate = Gate::new(keystore.clone(), usage, GlobalQuotaDefaults::default());
        (gate, keystore)
    }

    #[tokio::test]
    async fn scenario_a_happy_path() {
        let (gate, keystore) = gate();
        let mut options = CreateKeyOptions::default();
        options.default_credits_per_call = 1;
        let record = keystore.create_key("alice", 100, options);

        for expected in [99, 98, 97] {
            let decision = gate.admit("tools/call", Some(&record.fingerprint), "search", serde_json::json!({}), None).await;
            assert!(decision.allowed);
            assert_eq!(decision.remaining_credits, expected);
        }
    }

    #[tokio::test]
    async fn scenario_b_global_rate_limit() {
        let (gate, keystore) = gate();
        let mut options = CreateKeyOptions::default();
        options.global_rate_limit_per_min = 10;
        let record = keystore.create_key("bob", 1000, options);

        let mut allowed = 0;
        for _ in 0..11 {
            let decision = gate.admit("tools/call", Some(&record.fingerprint), "search", serde_json::json!({}), None).await;
            if decision.allowed {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 10);
        assert_eq!(keystore.get_key(&record.fingerprint).unwrap().credits, 990);
    }

    #[tokio::test]
    async fn scenario_c_per_tool_limit_is_independent() {
        let (gate, keystore) = gate();
        let mut options = CreateKeyOptions::default();
        let mut pricing = HashMap::new();
        pricing.insert("tool_a".to_string(), ToolPricing { credits_per_call: 1, rate_limit_per_min: 2 });
        options.tool_pricing = pricing;
        let record = keystore.create_key("carol", 1000, options);

        let mut allowed_a = 0;
        for _ in 0..3 {
            if gate.admit("tools/call", Some(&record.fingerprint), "tool_a", serde_json::json!({}), None).await.allowed {
                allowed_a += 1;
            }
        }
        let mut allowed_b = 0;
        for _ in 0..3 {
            if gate.admit("tools/call", Some(&record.fingerprint), "tool_b", serde_json::json!({}), None).await.allowed {
                allowed_b += 1;
            }
        }
        assert_eq!(allowed_a, 2);
        assert_eq!(allowed_b, 3);
    }

    #[tokio::test]
    async fn scenario_d_suspension_then_resume() {
        let (gate, keystore) = gate();
        let record = keystore.create_key("dave", 10, CreateKeyOptions::default());
        keystore.suspend_key(&record.fingerprint);
        let decision = gate.admit("tools/call", Some(&record.fingerprint), "search", serde_json::json!({}), None).await;
        assert!(!decision.allowed);
        assert_eq!(decision.reason.as_deref(), Some("key_suspended"));

        keystore.resume_key(&record.fingerprint);
        let decision = gate.admit("tools/call", Some(&record.fingerprint), "search", serde_json::json!({}), None).await;
        assert!(decision.allowed);
    }

    #[tokio::test]
    async fn scenario_e_shadow_mode_forces_allow() {
        let (gate, keystore) = gate();
        let record = keystore.create_key("erin", 10, CreateKeyOptions::default());
        keystore.revoke_key(&record.fingerprint);
        gate.set_shadow_mode(true);

        let decision = gate.admit("tools/call", Some(&record.fingerprint), "search", serde_json::json!({}), None).await;
        assert!(decision.allowed);
        assert_eq!(decision.reason.as_deref(), Some("shadow:invalid_api_key"));
    }

    #[tokio::test]
    async fn free_methods_bypass_the_cascade() {
        let (gate, _keystore) = gate();
        let decision = gate.admit("ping", None, "n/a", serde_json::json!({}), None).await;
        assert!(decision.allowed);
        assert_eq!(decision.credits_charged, 0);
    }

    #[tokio::test]
    async fn missing_key_is_denied() {
        let (gate, _keystore) = gate();
        let decision = gate.admit("tools/call", None, "search", serde_json::json!({}), None).await;
        assert!(!decision.allowed);
        assert_eq!(decision.reason.as_deref(), Some("missing_api_key"));
    }

    #[test]
    fn scenario_j_batch_atomicity() {
        let (gate, keystore) = gate();
        let mut options = CreateKeyOptions::default();
        let mut pricing = HashMap::new();
        pricing.insert("pay".to_string(), ToolPricing { credits_per_call: 10, rate_limit_per_min: 0 });
        options.tool_pricing = pricing;
        let record = keystore.create_key("frank", 30, options);

        let calls = vec![
            BatchCall { tool: "pay".into(), args: serde_json::json!({}) },
            BatchCall { tool: "pay".into(), args: serde_json::json!({}) },
            BatchCall { tool: "pay".into(), args: serde_json::json!({}) },
        ];
        let decision = gate.admit_batch(&record.fingerprint, &calls);
        assert!(decision.allowed);
        assert_eq!(decision.remaining_credits, 0);
    }

    #[test]
    fn scenario_j_batch_denies_entirely_on_insufficient_credits() {
        let (gate, keystore) = gate();
        let mut options = CreateKeyOptions::default();
        let mut pricing = HashMap::new();
        pricing.insert("pay".to_string(), ToolPricing { credits_per_call: 10, rate_limit_per_min: 0 });
        options.tool_pricing = pricing;
        let record = keystore.create_key("gina", 29, options);

        let calls = vec![
            BatchCall { tool: "pay".into(), args: serde_json::json!({}) },
            BatchCall { tool: "pay".into(), args: serde_json::json!({}) },
            BatchCall { tool: "pay".into(), args: serde_json::json!({}) },
        ];
        let decision = gate.admit_batch(&record.fingerprint, &calls);
        assert!(!decision.allowed);
        assert_eq!(keystore.get_key(&record.fingerprint).unwrap().credits, 29);
    }

    #[tokio::test]
    async fn approval_required_short_circuits_debit() {
        let (gate, keystore) = gate();
        let mut options = CreateKeyOptions::default();
        options.default_credits_per_call = 50;
        let record = keystore.create_key("henry", 1000, options);

        gate.approvals().set_rules(vec![paygate_model::ApprovalRule {
            id: "big".into(),
            name: "big spend".into(),
            enabled: true,
            conditions: vec![paygate_model::ApprovalCondition::CostThreshold { min_credits: 10 }],
        }]);

        let decision = gate.admit("tools/call", Some(&record.fingerprint), "search", serde_json::json!({}), None).await;
        assert!(!decision.allowed);
        assert!(decision.approval_request_id.is_some());
        assert_eq!(keystore.get_key(&record.fingerprint).unwrap().credits, 1000);
    }
}
