// [libs/core/keystore/src/lib.rs]
/*!
 * =================================================================
 * APARATO: KEYSTORE (V1.0)
 * CLASIFICACIÓN: CORE STATE (ESTRATO L1)
 * RESPONSABILIDAD: ALMACENAMIENTO AUTORITATIVO DE ApiKeyRecord
 *
 * The KeyStore exclusively owns the fingerprint -> record map (spec §3
 * "Ownership"). No other component mutates a record directly; every
 * mutation goes through a method here, which also triggers the atomic
 * snapshot write. Store methods never throw for policy reasons — they
 * return `bool`/`Option` and log I/O failures rather than propagate
 * them (spec §4.1 failure semantics).
 * =================================================================
 */

pub mod errors;
pub mod fingerprint;
pub mod query;
pub mod sanitize;
pub mod snapshot;

use chrono::{DateTime, Utc};
use paygate_model::key::{KeyGroup, QuotaOverride, ToolPricing};
use paygate_model::ApiKeyRecord;
use query::ListKeysQuery;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::RwLock;

pub use errors::KeyStoreError;

#[derive(Debug, Clone, Default)]
pub struct CreateKeyOptions {
    pub alias: Option<String>,
    pub namespace: Option<String>,
    pub allowed_tools: Vec<String>,
    pub denied_tools: Vec<String>,
    pub ip_allowlist: Vec<String>,
    pub spending_limit: i64,
    pub tool_pricing: HashMap<String, ToolPricing>,
    pub default_credits_per_call: i64,
    pub global_rate_limit_per_min: u32,
    pub quota_override: Option<QuotaOverride>,
    pub auto_topup: Option<AutoTopupSpec>,
    pub tags: HashMap<String, String>,
    pub group: Option<String>,
}

pub type AutoTopupSpec = paygate_model::key::AutoTopup;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    Skip,
    Overwrite,
    Error,
}

struct Inner {
    records: HashMap<String, ApiKeyRecord>,
    alias_index: HashMap<String, String>,
    groups: HashMap<String, KeyGroup>,
}

/// Authoritative in-memory KeyStore with optional atomic file snapshot.
pub struct KeyStore {
    inner: RwLock<Inner>,
    state_path: Option<PathBuf>,
    fingerprint_prefix: String,
}

impl KeyStore {
    pub fn new(fingerprint_prefix: impl Into<String>, state_path: Option<PathBuf>) -> Self {
        let fingerprint_prefix = fingerprint_prefix.into();
        let records = match &state_path {
            Some(path) => snapshot::load(path),
            None => HashMap::new(),
        };
        let alias_index = rebuild_alias_index(&records);

        Self {
            inner: RwLock::new(Inner { records, alias_index, groups: HashMap::new() }),
            state_path,
            fingerprint_prefix,
        }
    }

    fn persist(&self, inner: &Inner) {
        if let Some(path) = &self.state_path {
            snapshot::save(path, &inner.records);
        }
    }

    // ---- creation ----------------------------------------------------

    pub fn create_key(&self, name: &str, initial_credits: i64, options: CreateKeyOptions) -> ApiKeyRecord {
        let fingerprint = fingerprint::generate_fingerprint(&self.fingerprint_prefix);
        self.import_key(&fingerprint, name, initial_credits, options)
    }

    /// Same sanitization as `create_key` but the caller supplies the
    /// fingerprint (config-seeding, cross-instance hydration, spec §4.1).
    pub fn import_key(&self, fingerprint: &str, name: &str, initial_credits: i64, options: CreateKeyOptions) -> ApiKeyRecord {
        let now = Utc::now();
        let today = now.format("%Y-%m-%d").to_string();
        let month = now.format("%Y-%m").to_string();

        let record = ApiKeyRecord {
            fingerprint: fingerprint.to_string(),
            name: sanitize::sanitize_name(name),
            alias: options.alias.map(|a| sanitize::sanitize_name(&a)),
            namespace: options.namespace.as_deref().map(sanitize::sanitize_namespace).unwrap_or_else(|| paygate_model::key::DEFAULT_NAMESPACE.to_string()),
            credits: sanitize::sanitize_credits(initial_credits),
            total_spent: 0,
            total_calls: 0,
            active: true,
            suspended: false,
            created_at: now,
            last_used_at: None,
            expires_at: None,
            allowed_tools: sanitize::sanitize_string_set(&options.allowed_tools, 100, 100),
            denied_tools: sanitize::sanitize_string_set(&options.denied_tools, 100, 100),
            ip_allowlist: sanitize::sanitize_string_list(&options.ip_allowlist, 100, 100),
            spending_limit: options.spending_limit.max(0),
            tool_pricing: options.tool_pricing,
            default_credits_per_call: options.default_credits_per_call.max(0),
            global_rate_limit_per_min: options.global_rate_limit_per_min,
            quota_override: options.quota_override,
            quota_daily_calls: 0,
            quota_monthly_calls: 0,
            quota_daily_credits: 0,
            quota_monthly_credits: 0,
            quota_last_reset_day: today.clone(),
            quota_last_reset_month: month,
            auto_topup: options.auto_topup,
            auto_topup_today_count: 0,
            auto_topup_last_reset_day: today,
            tags: sanitize::sanitize_tags(&options.tags),
            group: options.group,
        };

        let mut guard = self.inner.write().expect("keystore lock poisoned");
        if let Some(alias) = &record.alias {
            guard.alias_index.insert(alias.clone(), record.fingerprint.clone());
        }
        guard.records.insert(record.fingerprint.clone(), record.clone());
        self.persist(&guard);
        record
    }

    // ---- reads --------------------------------------------------------

    /// Returns the record only if usable at request time: active and not
    /// past expiry (spec §4.1). This is the path every admission check uses.
    pub fn get_key(&self, fingerprint: &str) -> Option<ApiKeyRecord> {
        let guard = self.inner.read().expect("keystore lock poisoned");
        guard.records.get(fingerprint).filter(|r| r.is_currently_usable(Utc::now())).cloned()
    }

    /// Bypasses the active/expiry checks (admin-only).
    pub fn get_key_raw(&self, fingerprint: &str) -> Option<ApiKeyRecord> {
        let guard = self.inner.read().expect("keystore lock poisoned");
        guard.records.get(fingerprint).cloned()
    }

    /// Tries `get_key`, then the alias index, then the raw record.
    pub fn resolve_key(&self, fingerprint_or_alias: &str) -> Option<ApiKeyRecord> {
        if let Some(record) = self.get_key(fingerprint_or_alias) {
            return Some(record);
        }
        let guard = self.inner.read().expect("keystore lock poisoned");
        if let Some(fp) = guard.alias_index.get(fingerprint_or_alias) {
            return guard.records.get(fp).cloned();
        }
        guard.records.get(fingerprint_or_alias).cloned()
    }

    pub fn group(&self, id: &str) -> Option<KeyGroup> {
        let guard = self.inner.read().expect("keystore lock poisoned");
        guard.groups.get(id).cloned()
    }

    pub fn upsert_group(&self, group: KeyGroup) {
        let mut guard = self.inner.write().expect("keystore lock poisoned");
        guard.groups.insert(group.id.clone(), group);
    }

    pub fn remove_group(&self, id: &str) -> bool {
        let mut guard = self.inner.write().expect("keystore lock poisoned");
        guard.groups.remove(id).is_some()
    }

    // ---- credits --------------------------------------------------------

    pub fn has_credits(&self, fingerprint: &str, amount: i64) -> bool {
        let guard = self.inner.read().expect("keystore lock poisoned");
        guard.records.get(fingerprint).map(|r| r.credits >= amount).unwrap_or(false)
    }

    pub fn deduct_credits(&self, fingerprint: &str, amount: i64) -> Result<i64, KeyStoreError> {
        if amount <= 0 {
            return Err(KeyStoreError::InvalidAmount);
        }
        let mut guard = self.inner.write().expect("keystore lock poisoned");
        let record = guard.records.get_mut(fingerprint).ok_or(KeyStoreError::RecordNotFound)?;
        if record.credits < amount {
            return Err(KeyStoreError::InsufficientCredits);
        }
        record.credits -= amount;
        record.total_spent += amount;
        record.total_calls += 1;
        record.last_used_at = Some(Utc::now());
        let remaining = record.credits;
        self.persist(&guard);
        Ok(remaining)
    }

    pub fn add_credits(&self, fingerprint: &str, amount: i64) -> Result<i64, KeyStoreError> {
        if amount <= 0 {
            return Err(KeyStoreError::InvalidAmount);
        }
        let mut guard = self.inner.write().expect("keystore lock poisoned");
        let record = guard.records.get_mut(fingerprint).ok_or(KeyStoreError::RecordNotFound)?;
        record.credits = (record.credits + amount).min(paygate_model::key::MAX_CREDITS);
        let balance = record.credits;
        self.persist(&guard);
        Ok(balance)
    }

    /// Restores credits and clamps `total_spent`/`total_calls` to >= 0
    /// (spec §4.2 refund). A refund on an unknown key is a no-op.
    pub fn refund(&self, fingerprint: &str, amount: i64) {
        if amount <= 0 {
            return;
        }
        let mut guard = self.inner.write().expect("keystore lock poisoned");
        if let Some(record) = guard.records.get_mut(fingerprint) {
            record.credits = (record.credits + amount).min(paygate_model::key::MAX_CREDITS);
            record.total_spent = (record.total_spent - amount).max(0);
            record.total_calls = record.total_calls.saturating_sub(1);
            self.persist(&guard);
        }
    }

    /// Directly applies an `{credits, total_spent, total_calls}` update
    /// published by another instance (spec §4.7 `credits_changed`), or
    /// the outcome of the distributed atomic-deduction script.
    pub fn apply_credit_snapshot(&self, fingerprint: &str, credits: i64, total_spent: i64, total_calls: u64) {
        let mut guard = self.inner.write().expect("keystore lock poisoned");
        if let Some(record) = guard.records.get_mut(fingerprint) {
            record.credits = credits;
            record.total_spent = total_spent;
            record.total_calls = total_calls;
            record.last_used_at = Some(Utc::now());
            self.persist(&guard);
        }
    }

    // ---- lifecycle --------------------------------------------------------

    /// Idempotent: revoking an already-revoked key returns `true` and
    /// leaves the record unchanged (spec §9 Open Question, chosen answer).
    pub fn revoke_key(&self, fingerprint: &str) -> bool {
        let mut guard = self.inner.write().expect("keystore lock poisoned");
        match guard.records.get_mut(fingerprint) {
            Some(record) => {
                record.active = false;
                self.persist(&guard);
                true
            }
            None => false,
        }
    }

    pub fn suspend_key(&self, fingerprint: &str) -> bool {
        let mut guard = self.inner.write().expect("keystore lock poisoned");
        match guard.records.get_mut(fingerprint) {
            Some(record) if record.active => {
                record.suspended = true;
                self.persist(&guard);
                true
            }
            _ => false,
        }
    }

    pub fn resume_key(&self, fingerprint: &str) -> bool {
        let mut guard = self.inner.write().expect("keystore lock poisoned");
        match guard.records.get_mut(fingerprint) {
            Some(record) if record.active => {
                record.suspended = false;
                self.persist(&guard);
                true
            }
            _ => false,
        }
    }

    /// Generates a new fingerprint, copies all state into a new record,
    /// marks the old one inactive. Both coexist so audit history survives.
    pub fn rotate_key(&self, old_fingerprint: &str) -> Option<ApiKeyRecord> {
        let new_fingerprint = fingerprint::generate_fingerprint(&self.fingerprint_prefix);
        let mut guard = self.inner.write().expect("keystore lock poisoned");
        let old = guard.records.get(old_fingerprint)?.clone();

        let mut new_record = old.clone();
        new_record.fingerprint = new_fingerprint.clone();
        new_record.alias = None;

        guard.records.insert(new_fingerprint.clone(), new_record.clone());
        if let Some(old_mut) = guard.records.get_mut(old_fingerprint) {
            old_mut.active = false;
        }
        self.persist(&guard);
        Some(new_record)
    }

    /// Deep-copies arrays/objects with fresh counters, a new `created_at`,
    /// no `suspended` flag and no `last_used_at` (spec §4.1 `cloneKey`).
    pub fn clone_key(&self, source_fingerprint: &str, name_override: Option<&str>) -> Option<ApiKeyRecord> {
        let new_fingerprint = fingerprint::generate_fingerprint(&self.fingerprint_prefix);
        let mut guard = self.inner.write().expect("keystore lock poisoned");
        let source = guard.records.get(source_fingerprint)?.clone();

        let now = Utc::now();
        let cloned = ApiKeyRecord {
            fingerprint: new_fingerprint.clone(),
            name: name_override.map(sanitize::sanitize_name).unwrap_or(source.name),
            alias: None,
            created_at: now,
            last_used_at: None,
            suspended: false,
            total_calls: 0,
            total_spent: 0,
            quota_daily_calls: 0,
            quota_monthly_calls: 0,
            quota_daily_credits: 0,
            quota_monthly_credits: 0,
            auto_topup_today_count: 0,
            ..source
        };

        guard.records.insert(new_fingerprint, cloned.clone());
        self.persist(&guard);
        Some(cloned)
    }

    // ---- ACL / quota / expiry / tags / ip setters ------------------------

    pub fn set_tool_acl(&self, fingerprint: &str, allowed: Vec<String>, denied: Vec<String>) -> bool {
        self.mutate(fingerprint, |record| {
            record.allowed_tools = sanitize::sanitize_string_set(&allowed, 100, 100);
            record.denied_tools = sanitize::sanitize_string_set(&denied, 100, 100);
        })
    }

    pub fn set_ip_allowlist(&self, fingerprint: &str, ips: Vec<String>) -> bool {
        self.mutate(fingerprint, |record| {
            record.ip_allowlist = sanitize::sanitize_string_list(&ips, 100, 100);
        })
    }

    pub fn set_expiry(&self, fingerprint: &str, expires_at: Option<DateTime<Utc>>) -> bool {
        self.mutate(fingerprint, |record| record.expires_at = expires_at)
    }

    pub fn set_tags(&self, fingerprint: &str, tags: HashMap<String, String>) -> bool {
        self.mutate(fingerprint, |record| record.tags = sanitize::sanitize_tags(&tags))
    }

    pub fn set_spending_limit(&self, fingerprint: &str, limit: i64) -> bool {
        self.mutate(fingerprint, |record| record.spending_limit = limit.max(0))
    }

    pub fn set_auto_topup(&self, fingerprint: &str, auto_topup: Option<AutoTopupSpec>) -> bool {
        self.mutate(fingerprint, |record| record.auto_topup = auto_topup)
    }

    pub fn set_alias(&self, fingerprint: &str, alias: Option<String>) -> Result<bool, KeyStoreError> {
        let sanitized = alias.as_deref().map(sanitize::sanitize_name);
        let mut guard = self.inner.write().expect("keystore lock poisoned");

        if !guard.records.contains_key(fingerprint) {
            return Ok(false);
        }
        if let Some(alias) = &sanitized {
            if guard.records.contains_key(alias) {
                return Err(KeyStoreError::AliasCollision(alias.clone()));
            }
            if let Some(owner) = guard.alias_index.get(alias) {
                if owner != fingerprint {
                    return Err(KeyStoreError::AliasCollision(alias.clone()));
                }
            }
        }

        if let Some(old_alias) = guard.records.get(fingerprint).and_then(|r| r.alias.clone()) {
            guard.alias_index.remove(&old_alias);
        }
        if let Some(alias) = &sanitized {
            guard.alias_index.insert(alias.clone(), fingerprint.to_string());
        }
        guard.records.get_mut(fingerprint).unwrap().alias = sanitized;
        self.persist(&guard);
        Ok(true)
    }

    fn mutate(&self, fingerprint: &str, f: impl FnOnce(&mut ApiKeyRecord)) -> bool {
        let mut guard = self.inner.write().expect("keystore lock poisoned");
        match guard.records.get_mut(fingerprint) {
            Some(record) => {
                f(record);
                self.persist(&guard);
                true
            }
            None => false,
        }
    }

    /// Resets daily/monthly quota counters in place when the stored
    /// `quota_last_reset_day`/`_month` no longer matches `now`'s UTC day
    /// or month (spec §4.2 step 9, §8 property 8).
    pub fn roll_quota_window(&self, fingerprint: &str, now: DateTime<Utc>) {
        let today = now.format("%Y-%m-%d").to_string();
        let month = now.format("%Y-%m").to_string();
        self.mutate(fingerprint, |record| {
            if record.quota_last_reset_day != today {
                record.quota_daily_calls = 0;
                record.quota_daily_credits = 0;
                record.quota_last_reset_day = today;
            }
            if record.quota_last_reset_month != month {
                record.quota_monthly_calls = 0;
                record.quota_monthly_credits = 0;
                record.quota_last_reset_month = month;
            }
        });
    }

    pub fn bump_quota_counters(&self, fingerprint: &str, credits: i64) {
        self.mutate(fingerprint, |record| {
            record.quota_daily_calls += 1;
            record.quota_monthly_calls += 1;
            record.quota_daily_credits += credits;
            record.quota_monthly_credits += credits;
        });
    }

    /// Auto-topup bookkeeping only; must never touch `total_spent` (spec §4.2).
    pub fn apply_auto_topup(&self, fingerprint: &str, amount: i64, now: DateTime<Utc>) -> bool {
        let today = now.format("%Y-%m-%d").to_string();
        self.mutate(fingerprint, |record| {
            if record.auto_topup_last_reset_day != today {
                record.auto_topup_today_count = 0;
                record.auto_topup_last_reset_day = today;
            }
            record.credits = (record.credits + amount).min(paygate_model::key::MAX_CREDITS);
            record.auto_topup_today_count += 1;
        })
    }

    // ---- bulk / admin ------------------------------------------------------

    pub fn export_keys(&self) -> Vec<ApiKeyRecord> {
        let guard = self.inner.read().expect("keystore lock poisoned");
        guard.records.values().cloned().collect()
    }

    pub fn import_keys(&self, records: Vec<ApiKeyRecord>, mode: ImportMode) -> Vec<(String, Result<(), KeyStoreError>)> {
        let mut results = Vec::with_capacity(records.len());
        let mut guard = self.inner.write().expect("keystore lock poisoned");

        for record in records {
            let fingerprint = record.fingerprint.clone();
            let exists = guard.records.contains_key(&fingerprint);

            let outcome = if exists {
                match mode {
                    ImportMode::Skip => Ok(()),
                    ImportMode::Error => Err(KeyStoreError::AliasCollision(fingerprint.clone())),
                    ImportMode::Overwrite => {
                        guard.records.insert(fingerprint.clone(), resanitize(record));
                        Ok(())
                    }
                }
            } else {
                guard.records.insert(fingerprint.clone(), resanitize(record));
                Ok(())
            };

            results.push((fingerprint, outcome));
        }

        guard.alias_index = rebuild_alias_index(&guard.records);
        self.persist(&guard);
        results
    }

    pub fn list_keys_filtered(&self, query: &ListKeysQuery) -> Vec<ApiKeyRecord> {
        let guard = self.inner.read().expect("keystore lock poisoned");
        let now = Utc::now();
        let matched: Vec<ApiKeyRecord> = guard.records.values().filter(|r| query::matches(r, query, now)).cloned().collect();
        query::sort_and_paginate(matched, query)
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("keystore lock poisoned").records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn resanitize(mut record: ApiKeyRecord) -> ApiKeyRecord {
    record.name = sanitize::sanitize_name(&record.name);
    record.namespace = sanitize::sanitize_namespace(&record.namespace);
    let allowed: Vec<String> = record.allowed_tools.into_iter().collect();
    let denied: Vec<String> = record.denied_tools.into_iter().collect();
    record.allowed_tools = sanitize::sanitize_string_set(&allowed, 100, 100);
    record.denied_tools = sanitize::sanitize_string_set(&denied, 100, 100);
    record.ip_allowlist = sanitize::sanitize_string_list(&record.ip_allowlist, 100, 100);
    record.tags = sanitize::sanitize_tags(&record.tags);
    record.credits = sanitize::sanitize_credits(record.credits);
    record
}

fn rebuild_alias_index(records: &HashMap<String, ApiKeyRecord>) -> HashMap<String, String> {
    records
        .values()
        .filter_map(|r| r.alias.as_ref().map(|alias| (alias.clone(), r.fingerprint.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> KeyStore {
        KeyStore::new("pg", None)
    }

    #[test]
    fn create_and_get_round_trip() {
        let store = store();
        let record = store.create_key("alice", 100, CreateKeyOptions::default());
        let fetched = store.get_key(&record.fingerprint).expect("key should exist");
        assert_eq!(fetched.credits, 100);
        assert_eq!(fetched.name, "alice");
    }

    #[test]
    fn get_key_hides_expired_records() {
        let store = store();
        let record = store.create_key("bob", 10, CreateKeyOptions::default());
        store.set_expiry(&record.fingerprint, Some(Utc::now() - chrono::Duration::seconds(1)));

        assert!(store.get_key(&record.fingerprint).is_none());
        assert!(store.get_key_raw(&record.fingerprint).is_some());
    }

    #[test]
    fn deduct_fails_on_insufficient_credits() {
        let store = store();
        let record = store.create_key("carol", 5, CreateKeyOptions::default());
        assert!(matches!(store.deduct_credits(&record.fingerprint, 10), Err(KeyStoreError::InsufficientCredits)));
        assert_eq!(store.get_key(&record.fingerprint).unwrap().credits, 5);
    }

    #[test]
    fn refund_never_goes_negative_and_is_noop_for_unknown_key() {
        let store = store();
        let record = store.create_key("dave", 10, CreateKeyOptions::default());
        store.deduct_credits(&record.fingerprint, 3).unwrap();
        store.refund(&record.fingerprint, 100);
        let refreshed = store.get_key(&record.fingerprint).unwrap();
        assert_eq!(refreshed.total_spent, 0);
        assert_eq!(refreshed.total_calls, 0);

        store.refund("pg_unknown", 50); // no panic, no-op
    }

    #[test]
    fn revoke_is_idempotent() {
        let store = store();
        let record = store.create_key("erin", 10, CreateKeyOptions::default());
        assert!(store.revoke_key(&record.fingerprint));
        assert!(store.revoke_key(&record.fingerprint));
        assert!(!store.get_key_raw(&record.fingerprint).unwrap().active);
    }

    #[test]
    fn rotate_preserves_old_record_as_inactive() {
        let store = store();
        let record = store.create_key("frank", 10, CreateKeyOptions::default());
        let rotated = store.rotate_key(&record.fingerprint).unwrap();

        assert_ne!(rotated.fingerprint, record.fingerprint);
        assert!(!store.get_key_raw(&record.fingerprint).unwrap().active);
        assert!(store.get_key(&rotated.fingerprint).is_some());
    }

    #[test]
    fn alias_collision_is_rejected() {
        let store = store();
        let a = store.create_key("gina", 10, CreateKeyOptions::default());
        let b = store.create_key("harry", 10, CreateKeyOptions::default());
        store.set_alias(&a.fingerprint, Some("shared".into())).unwrap();
        assert!(matches!(store.set_alias(&b.fingerprint, Some("shared".into())), Err(KeyStoreError::AliasCollision(_))));
    }

    #[test]
    fn resolve_key_falls_back_to_alias() {
        let store = store();
        let record = store.create_key("ivy", 10, CreateKeyOptions::default());
        store.set_alias(&record.fingerprint, Some("ivy-alias".into())).unwrap();
        let resolved = store.resolve_key("ivy-alias").unwrap();
        assert_eq!(resolved.fingerprint, record.fingerprint);
    }

    #[test]
    fn snapshot_round_trip_preserves_suspension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let store = KeyStore::new("pg", Some(path.clone()));
        let a = store.create_key("jade", 10, CreateKeyOptions::default());
        let b = store.create_key("kyle", 20, CreateKeyOptions::default());
        let c = store.create_key("liam", 30, CreateKeyOptions::default());
        store.suspend_key(&b.fingerprint);

        let reloaded = KeyStore::new("pg", Some(path));
        assert_eq!(reloaded.len(), 3);
        assert!(reloaded.get_key_raw(&b.fingerprint).unwrap().suspended);
        assert!(!reloaded.get_key_raw(&a.fingerprint).unwrap().suspended);
        assert!(!reloaded.get_key_raw(&c.fingerprint).unwrap().suspended);
    }
}
