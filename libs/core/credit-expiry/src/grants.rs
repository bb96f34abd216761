// [libs/core/credit-expiry/src/grants.rs]
/*!
 * CreditExpirationManager (spec §4.5): an independent pool of
 * time-bounded credit tranches per key, consumed FIFO by ascending
 * `expires_at`. Bounded per spec §3: at most `M` grants per key, `K`
 * tracked keys total.
 */

use chrono::{DateTime, Utc};
use paygate_model::CreditGrant;
use std::collections::HashMap;
use std::sync::RwLock;

pub const MAX_GRANTS_PER_KEY: usize = 100;
pub const MAX_TRACKED_KEYS: usize = 10_000;

pub struct ConsumeOutcome {
    pub consumed: i64,
    pub remaining: i64,
    pub grants_used: usize,
}

pub struct CreditExpirationManager {
    grants_by_key: RwLock<HashMap<String, Vec<CreditGrant>>>,
    total_expired: RwLock<HashMap<String, i64>>,
}

impl CreditExpirationManager {
    pub fn new() -> Self {
        Self { grants_by_key: RwLock::new(HashMap::new()), total_expired: RwLock::new(HashMap::new()) }
    }

    pub fn grant(&self, key: &str, amount: i64, expires_at: DateTime<Utc>, source: &str) -> Option<CreditGrant> {
        if amount <= 0 {
            return None;
        }

        let mut guard = self.grants_by_key.write().expect("credit expiry lock poisoned");
        if !guard.contains_key(key) && guard.len() >= MAX_TRACKED_KEYS {
            tracing::warn!("[L1_CREDIT_EXPIRY_FAULT]: tracked key cap reached, dropping grant for {key}");
            return None;
        }

        let grants = guard.entry(key.to_string()).or_insert_with(Vec::new);
        if grants.len() >= MAX_GRANTS_PER_KEY {
            tracing::warn!("[L1_CREDIT_EXPIRY_FAULT]: grant cap reached for {key}, dropping new grant");
            return None;
        }

        let grant = CreditGrant {
            id: format!("grant_{}", uuid::Uuid::new_v4()),
            key: key.to_string(),
            original_amount: amount,
            remaining_amount: amount,
            granted_at: Utc::now(),
            expires_at,
            expired: false,
            source: source.to_string(),
        };

        grants.push(grant.clone());
        Some(grant)
    }

    /// Sweeps and marks all grants whose `expires_at <= now` as expired,
    /// debiting their remaining amount to the key's `total_expired` tally.
    pub fn prune_expired(&self, key: &str, now: DateTime<Utc>) {
        let mut guard = self.grants_by_key.write().expect("credit expiry lock poisoned");
        let Some(grants) = guard.get_mut(key) else { return };

        let mut newly_expired = 0i64;
        for grant in grants.iter_mut() {
            if !grant.expired && grant.expires_at <= now {
                grant.expired = true;
                newly_expired += grant.remaining_amount;
                grant.remaining_amount = 0;
            }
        }

        if newly_expired > 0 {
            let mut totals = self.total_expired.write().expect("credit expiry lock poisoned");
            *totals.entry(key.to_string()).or_insert(0) += newly_expired;
        }
    }

    /// Consumes `amount` from `key`'s active grants, earliest-expiring first.
    pub fn consume(&self, key: &str, amount: i64, now: DateTime<Utc>) -> ConsumeOutcome {
        self.prune_expired(key, now);

        let mut guard = self.grants_by_key.write().expect("credit expiry lock poisoned");
        let Some(grants) = guard.get_mut(key) else {
            return ConsumeOutcome { consumed: 0, remaining: amount, grants_used: 0 };
        };

        let mut active_indices: Vec<usize> = (0..grants.len()).filter(|&i| !grants[i].expired && grants[i].remaining_amount > 0).collect();
        active_indices.sort_by_key(|&i| grants[i].expires_at);

        let mut to_consume = amount;
        let mut grants_used = 0;

        for idx in active_indices {
            if to_consume <= 0 {
                break;
            }
            let grant = &mut grants[idx];
            let take = to_consume.min(grant.remaining_amount);
            grant.remaining_amount -= take;
            to_consume -= take;
            if take > 0 {
                grants_used += 1;
            }
        }

        ConsumeOutcome { consumed: amount - to_consume, remaining: to_consume, grants_used }
    }

    /// Active grants expiring within `(now, now + within_ms]`, ascending.
    pub fn expiring_soon(&self, key: &str, within_ms: i64, now: DateTime<Utc>) -> Vec<CreditGrant> {
        let guard = self.grants_by_key.read().expect("credit expiry lock poisoned");
        let Some(grants) = guard.get(key) else { return Vec::new() };

        let deadline = now + chrono::Duration::milliseconds(within_ms);
        let mut matching: Vec<CreditGrant> = grants
            .iter()
            .filter(|g| !g.expired && g.expires_at > now && g.expires_at <= deadline)
            .cloned()
            .collect();
        matching.sort_by_key(|g| g.expires_at);
        matching
    }

    pub fn total_expired_for(&self, key: &str) -> i64 {
        self.total_expired.read().expect("credit expiry lock poisoned").get(key).copied().unwrap_or(0)
    }
}

impl Default for CreditExpirationManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_consumption_drains_earliest_expiring_grant_first() {
        let mgr = CreditExpirationManager::new();
        let now = Utc::now();
        mgr.grant("pg_a", 100, now + chrono::Duration::hours(24), "topup");
        mgr.grant("pg_a", 50, now + chrono::Duration::hours(48), "topup");

        let outcome = mgr.consume("pg_a", 120, now);
        assert_eq!(outcome.consumed, 120);
        assert_eq!(outcome.remaining, 30);
        assert_eq!(outcome.grants_used, 2);

        let grants = mgr.grants_by_key.read().unwrap();
        let key_grants = &grants["pg_a"];
        assert_eq!(key_grants[0].remaining_amount, 0);
        assert_eq!(key_grants[1].remaining_amount, 20);
    }

    #[test]
    fn prune_expired_debits_total_expired() {
        let mgr = CreditExpirationManager::new();
        let now = Utc::now();
        mgr.grant("pg_b", 40, now - chrono::Duration::seconds(1), "topup");
        mgr.prune_expired("pg_b", now);
        assert_eq!(mgr.total_expired_for("pg_b"), 40);

        let outcome = mgr.consume("pg_b", 10, now);
        assert_eq!(outcome.consumed, 0);
        assert_eq!(outcome.remaining, 10);
    }

    #[test]
    fn expiring_soon_is_sorted_ascending() {
        let mgr = CreditExpirationManager::new();
        let now = Utc::now();
        mgr.grant("pg_c", 10, now + chrono::Duration::minutes(30), "topup");
        mgr.grant("pg_c", 20, now + chrono::Duration::minutes(10), "topup");

        let soon = mgr.expiring_soon("pg_c", chrono::Duration::hours(1).num_milliseconds(), now);
        assert_eq!(soon.len(), 2);
        assert!(soon[0].expires_at < soon[1].expires_at);
    }
}
