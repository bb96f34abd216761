// [libs/core/keystore/src/snapshot.rs]
//! Atomic on-disk snapshot: an ordered list of `[fingerprint, record]`
//! pairs, written to `<path>.tmp` then renamed over `<path>` (spec §4.1,
//! §6 "Persistence format"). Disk errors are logged and swallowed —
//! in-memory state is the working copy, persistence is best-effort.

use paygate_model::ApiKeyRecord;
use std::collections::HashMap;
use std::path::Path;

pub fn save(path: &Path, records: &HashMap<String, ApiKeyRecord>) {
    let ordered: Vec<(&String, &ApiKeyRecord)> = records.iter().collect();

    let serialized = match serde_json::to_string_pretty(&ordered) {
        Ok(json) => json,
        Err(error) => {
            tracing::error!("[L1_KEYSTORE_IO_FAULT]: snapshot serialization failed: {error}");
            return;
        }
    };

    if let Some(parent) = path.parent() {
        if let Err(error) = std::fs::create_dir_all(parent) {
            tracing::error!("[L1_KEYSTORE_IO_FAULT]: could not create snapshot directory: {error}");
            return;
        }
    }

    let tmp_path = tmp_path_for(path);
    if let Err(error) = std::fs::write(&tmp_path, serialized) {
        tracing::error!("[L1_KEYSTORE_IO_FAULT]: could not write snapshot tmp file: {error}");
        return;
    }

    if let Err(error) = std::fs::rename(&tmp_path, path) {
        tracing::error!("[L1_KEYSTORE_IO_FAULT]: could not finalize snapshot rename: {error}");
    }
}

/// Loads a snapshot, skipping malformed individual entries rather than
/// failing the whole load (spec §4.1 failure semantics).
pub fn load(path: &Path) -> HashMap<String, ApiKeyRecord> {
    let mut out = HashMap::new();

    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) => {
            tracing::warn!("[L1_KEYSTORE_IO_FAULT]: snapshot not loaded ({error}); starting empty.");
            return out;
        }
    };

    let entries: Vec<serde_json::Value> = match serde_json::from_str(&raw) {
        Ok(entries) => entries,
        Err(error) => {
            tracing::error!("[L1_KEYSTORE_IO_FAULT]: snapshot is not a valid JSON array: {error}");
            return out;
        }
    };

    for entry in entries {
        match serde_json::from_value::<(String, ApiKeyRecord)>(entry) {
            Ok((fingerprint, record)) => {
                out.insert(fingerprint, record);
            }
            Err(error) => {
                tracing::warn!("[L1_KEYSTORE_IO_FAULT]: skipping malformed snapshot entry: {error}");
            }
        }
    }

    out
}

fn tmp_path_for(path: &Path) -> std::path::PathBuf {
    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(".tmp");
    std::path::PathBuf::from(tmp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_record(fp: &str) -> ApiKeyRecord {
        ApiKeyRecord {
            fingerprint: fp.to_string(),
            name: "test".into(),
            alias: None,
            namespace: "default".into(),
            credits: 100,
            total_spent: 0,
            total_calls: 0,
            active: true,
            suspended: false,
            created_at: Utc::now(),
            last_used_at: None,
            expires_at: None,
            allowed_tools: Default::default(),
            denied_tools: Default::default(),
            ip_allowlist: Default::default(),
            spending_limit: 0,
            tool_pricing: Default::default(),
            default_credits_per_call: 1,
            global_rate_limit_per_min: 0,
            quota_override: None,
            quota_daily_calls: 0,
            quota_monthly_calls: 0,
            quota_daily_credits: 0,
            quota_monthly_credits: 0,
            quota_last_reset_day: String::new(),
            quota_last_reset_month: String::new(),
            auto_topup: None,
            auto_topup_today_count: 0,
            auto_topup_last_reset_day: String::new(),
            tags: Default::default(),
            group: None,
        }
    }

    #[test]
    fn round_trips_through_tmp_rename() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut records = HashMap::new();
        records.insert("pg_aaa".to_string(), sample_record("pg_aaa"));
        records.insert("pg_bbb".to_string(), sample_record("pg_bbb"));

        save(&path, &records);
        assert!(path.exists());
        assert!(!tmp_path_for(&path).exists());

        let loaded = load(&path);
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded["pg_aaa"].credits, 100);
    }

    #[test]
    fn missing_file_loads_empty_without_panicking() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist.json");
        assert!(load(&path).is_empty());
    }
}
