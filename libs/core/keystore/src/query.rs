// [libs/core/keystore/src/query.rs]
//! `listKeysFiltered` query/sort/pagination (spec §4.1).

use chrono::Utc;
use paygate_model::ApiKeyRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    CreatedAt,
    Name,
    Credits,
    TotalSpent,
    TotalCalls,
    LastUsedAt,
}

#[derive(Debug, Clone, Default)]
pub struct ListKeysQuery {
    pub namespace: Option<String>,
    /// `Some("")` means "ungrouped only".
    pub group: Option<String>,
    pub active: Option<bool>,
    pub suspended: Option<bool>,
    pub expired: Option<bool>,
    pub name_prefix: Option<String>,
    pub min_credits: Option<i64>,
    pub max_credits: Option<i64>,
    pub sort_by: Option<SortField>,
    pub sort_descending: bool,
    pub offset: usize,
    pub limit: usize,
}

impl ListKeysQuery {
    pub fn normalized_limit(&self) -> usize {
        self.limit.clamp(1, 500)
    }
}

pub fn matches(record: &ApiKeyRecord, query: &ListKeysQuery, now: chrono::DateTime<Utc>) -> bool {
    if let Some(ns) = &query.namespace {
        if &record.namespace != ns {
            return false;
        }
    }
    if let Some(group) = &query.group {
        let record_group = record.group.clone().unwrap_or_default();
        if &record_group != group {
            return false;
        }
    }
    if let Some(active) = query.active {
        if record.active != active {
            return false;
        }
    }
    if let Some(suspended) = query.suspended {
        if record.suspended != suspended {
            return false;
        }
    }
    if let Some(expired) = query.expired {
        if record.is_expired(now) != expired {
            return false;
        }
    }
    if let Some(prefix) = &query.name_prefix {
        if !record.name.starts_with(prefix.as_str()) {
            return false;
        }
    }
    if let Some(min) = query.min_credits {
        if record.credits < min {
            return false;
        }
    }
    if let Some(max) = query.max_credits {
        if record.credits > max {
            return false;
        }
    }
    true
}

pub fn sort_and_paginate(mut records: Vec<ApiKeyRecord>, query: &ListKeysQuery) -> Vec<ApiKeyRecord> {
    match query.sort_by.unwrap_or(SortField::CreatedAt) {
        SortField::CreatedAt => records.sort_by_key(|r| r.created_at),
        SortField::Name => records.sort_by(|a, b| a.name.cmp(&b.name)),
        SortField::Credits => records.sort_by_key(|r| r.credits),
        SortField::TotalSpent => records.sort_by_key(|r| r.total_spent),
        SortField::TotalCalls => records.sort_by_key(|r| r.total_calls),
        SortField::LastUsedAt => records.sort_by_key(|r| r.last_used_at),
    }

    if query.sort_descending {
        records.reverse();
    }

    let limit = query.normalized_limit();
    records.into_iter().skip(query.offset).take(limit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_is_clamped_to_one_and_five_hundred() {
        let mut q = ListKeysQuery::default();
        q.limit = 0;
        assert_eq!(q.normalized_limit(), 1);
        q.limit = 10_000;
        assert_eq!(q.normalized_limit(), 500);
    }
}
