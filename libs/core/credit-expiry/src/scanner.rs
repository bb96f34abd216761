// [libs/core/credit-expiry/src/scanner.rs]
/*!
 * ExpiryScanner (spec §4.5): timer-driven; on each tick enumerates every
 * active, not-yet-expired record and emits at most one warning per
 * `(key_prefix, threshold)` — the most specific (smallest) threshold
 * that currently applies — deduplicated until stale.
 */

use chrono::{DateTime, Utc};
use paygate_keystore::KeyStore;
use paygate_model::ApiKeyRecord;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

pub const MIN_TICK_PERIOD: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct DedupKey {
    prefix: String,
    threshold_secs: i64,
}

pub struct ExpiryScanner {
    /// Descending-sorted warning thresholds, in seconds before expiry.
    thresholds: Vec<i64>,
    dedup: Mutex<HashMap<DedupKey, DateTime<Utc>>>,
}

pub struct ExpiryWarning {
    pub key_prefix: String,
    pub threshold_secs: i64,
    pub expires_at: DateTime<Utc>,
}

impl ExpiryScanner {
    /// `thresholds_secs` need not be pre-sorted; the scanner sorts
    /// descending internally and always reports the smallest (most
    /// urgent) threshold that currently applies.
    pub fn new(mut thresholds_secs: Vec<i64>) -> Self {
        thresholds_secs.sort_unstable_by(|a, b| b.cmp(a));
        Self { thresholds: thresholds_secs, dedup: Mutex::new(HashMap::new()) }
    }

    /// Runs one tick against `store`, invoking `on_warning` at most once
    /// per `(prefix, threshold)` combination until the dedup map expires it.
    pub fn tick(&self, store: &KeyStore, now: DateTime<Utc>, mut on_warning: impl FnMut(ExpiryWarning)) {
        let candidates: Vec<ApiKeyRecord> = store
            .export_keys()
            .into_iter()
            .filter(|record| record.active && record.expires_at.map(|e| e > now).unwrap_or(false))
            .collect();

        for record in candidates {
            let expires_at = record.expires_at.expect("filtered for Some above");
            let seconds_remaining = (expires_at - now).num_seconds();

            // Most specific (smallest) threshold that still applies.
            let applicable = self.thresholds.iter().rev().find(|&&t| seconds_remaining <= t);

            if let Some(&threshold) = applicable {
                let key = DedupKey { prefix: record.fingerprint.clone(), threshold_secs: threshold };
                let mut guard = self.dedup.lock().expect("expiry scanner lock poisoned");
                if !guard.contains_key(&key) {
                    guard.insert(key, now);
                    on_warning(ExpiryWarning { key_prefix: record.fingerprint.clone(), threshold_secs: threshold, expires_at });
                }
            }
        }

        self.cleanup_stale_dedup_entries(now);
    }

    fn cleanup_stale_dedup_entries(&self, now: DateTime<Utc>) {
        let Some(&largest_threshold) = self.thresholds.first() else { return };
        let retention = chrono::Duration::seconds(largest_threshold * 2);
        let mut guard = self.dedup.lock().expect("expiry scanner lock poisoned");
        guard.retain(|_, recorded_at| now - *recorded_at <= retention);
    }

    /// Read-only helper: records expiring within `within_seconds`, active only.
    pub fn query_expiring(records: &[ApiKeyRecord], within_seconds: i64, now: DateTime<Utc>) -> Vec<ApiKeyRecord> {
        records
            .iter()
            .filter(|r| r.active)
            .filter(|r| r.expires_at.map(|e| e > now && (e - now).num_seconds() <= within_seconds).unwrap_or(false))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paygate_keystore::CreateKeyOptions;

    #[test]
    fn warns_once_per_threshold_and_picks_most_specific() {
        let store = KeyStore::new("pg", None);
        let record = store.create_key("alice", 10, CreateKeyOptions::default());
        store.set_expiry(&record.fingerprint, Some(Utc::now() + chrono::Duration::seconds(30)));

        let scanner = ExpiryScanner::new(vec![3600, 300, 60]);
        let mut warnings = Vec::new();
        scanner.tick(&store, Utc::now(), |w| warnings.push(w.threshold_secs));
        assert_eq!(warnings, vec![60]);

        // second tick is deduplicated
        warnings.clear();
        scanner.tick(&store, Utc::now(), |w| warnings.push(w.threshold_secs));
        assert!(warnings.is_empty());
    }

    #[test]
    fn query_expiring_ignores_inactive_and_far_future_keys() {
        let store = KeyStore::new("pg", None);
        let soon = store.create_key("soon", 10, CreateKeyOptions::default());
        store.set_expiry(&soon.fingerprint, Some(Utc::now() + chrono::Duration::seconds(10)));
        let far = store.create_key("far", 10, CreateKeyOptions::default());
        store.set_expiry(&far.fingerprint, Some(Utc::now() + chrono::Duration::days(30)));

        let all = store.export_keys();
        let expiring = ExpiryScanner::query_expiring(&all, 60, Utc::now());
        assert_eq!(expiring.len(), 1);
        assert_eq!(expiring[0].fingerprint, soon.fingerprint);
    }
}
