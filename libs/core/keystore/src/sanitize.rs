// [libs/core/keystore/src/sanitize.rs]
//! Input sanitization rules shared by `createKey`, `importKey` and every
//! ACL/quota/tag/IP setter (spec §4.1).

use paygate_model::key::{DEFAULT_NAMESPACE, MAX_CREDITS};
use std::collections::{HashMap, HashSet};

pub fn sanitize_name(raw: &str) -> String {
    truncate_trimmed(raw, 200)
}

pub fn sanitize_credits(raw: i64) -> i64 {
    raw.max(0).min(MAX_CREDITS)
}

pub fn sanitize_string_list(raw: &[String], max_entries: usize, max_len: usize) -> Vec<String> {
    raw.iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .map(|s| truncate_trimmed(&s, max_len))
        .take(max_entries)
        .collect()
}

pub fn sanitize_string_set(raw: &[String], max_entries: usize, max_len: usize) -> HashSet<String> {
    sanitize_string_list(raw, max_entries, max_len).into_iter().collect()
}

pub fn sanitize_tags(raw: &HashMap<String, String>) -> HashMap<String, String> {
    raw.iter()
        .take(50)
        .map(|(k, v)| (truncate_trimmed(k, 100), truncate_trimmed(v, 100)))
        .filter(|(k, _)| !k.is_empty())
        .collect()
}

/// `[a-z0-9-]{1,50}`, falling back to `"default"` on any violation.
pub fn sanitize_namespace(raw: &str) -> String {
    let candidate = raw.trim().to_lowercase();
    let valid = !candidate.is_empty()
        && candidate.len() <= 50
        && candidate.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if valid {
        candidate
    } else {
        DEFAULT_NAMESPACE.to_string()
    }
}

fn truncate_trimmed(raw: &str, max_len: usize) -> String {
    let trimmed = raw.trim();
    if trimmed.chars().count() <= max_len {
        trimmed.to_string()
    } else {
        trimmed.chars().take(max_len).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_falls_back_on_invalid_chars() {
        assert_eq!(sanitize_namespace("Invalid_NS!"), DEFAULT_NAMESPACE);
        assert_eq!(sanitize_namespace("team-a1"), "team-a1");
        assert_eq!(sanitize_namespace(""), DEFAULT_NAMESPACE);
    }

    #[test]
    fn credits_are_clamped() {
        assert_eq!(sanitize_credits(-5), 0);
        assert_eq!(sanitize_credits(MAX_CREDITS + 500), MAX_CREDITS);
    }

    #[test]
    fn tags_are_capped_at_fifty_entries() {
        let mut raw = HashMap::new();
        for i in 0..80 {
            raw.insert(format!("k{i}"), "v".to_string());
        }
        assert_eq!(sanitize_tags(&raw).len(), 50);
    }
}
