// [apps/gateway/src/handlers/admin.rs]
/*!
 * Admin surface (spec §6, `X-Admin-Key` gated by `middleware::admin_guard`
 * upstream of every route in this module). Handlers stay thin: parse,
 * delegate to the owning crate, translate the result.
 */

use crate::errors::ApiError;
use crate::state::webhook_filters::WebhookFilterRule;
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use paygate_keystore::query::{ListKeysQuery, SortField};
use paygate_keystore::CreateKeyOptions;
use paygate_metering::UsageQuery;
use paygate_model::JsonValue;
use paygate_webhook::check_ssrf;
use serde_json::json;
use std::collections::HashMap;

fn require_str<'a>(body: &'a JsonValue, field: &str) -> Result<&'a str, ApiError> {
    body.get(field).and_then(|v| v.as_str()).ok_or_else(|| ApiError::bad_request(format!("missing `{field}`")))
}

fn opt_str_list(body: &JsonValue, field: &str) -> Vec<String> {
    body.get(field)
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

pub async fn create_key(State(state): State<AppState>, Json(body): Json<JsonValue>) -> Result<Response, ApiError> {
    let name = require_str(&body, "name")?;
    let initial_credits = body.get("credits").and_then(|v| v.as_i64()).unwrap_or(0);

    let options = CreateKeyOptions {
        alias: body.get("alias").and_then(|v| v.as_str()).map(str::to_string),
        namespace: body.get("namespace").and_then(|v| v.as_str()).map(str::to_string),
        allowed_tools: opt_str_list(&body, "allowedTools"),
        denied_tools: opt_str_list(&body, "deniedTools"),
        ip_allowlist: opt_str_list(&body, "ipAllowlist"),
        spending_limit: body.get("spendingLimit").and_then(|v| v.as_i64()).unwrap_or(0),
        default_credits_per_call: body.get("defaultCreditsPerCall").and_then(|v| v.as_i64()).unwrap_or(0),
        global_rate_limit_per_min: body.get("globalRateLimitPerMin").and_then(|v| v.as_u64()).unwrap_or(0) as u32,
        group: body.get("group").and_then(|v| v.as_str()).map(str::to_string),
        ..Default::default()
    };

    let record = state.keystore.create_key(name, initial_credits, options);
    Ok((StatusCode::CREATED, Json(record)).into_response())
}

pub async fn list_keys(State(state): State<AppState>, Query(params): Query<HashMap<String, String>>) -> Response {
    let query = ListKeysQuery {
        namespace: params.get("namespace").cloned(),
        group: params.get("group").cloned(),
        active: params.get("active").and_then(|v| v.parse().ok()),
        suspended: params.get("suspended").and_then(|v| v.parse().ok()),
        expired: params.get("expired").and_then(|v| v.parse().ok()),
        name_prefix: params.get("namePrefix").cloned(),
        min_credits: params.get("minCredits").and_then(|v| v.parse().ok()),
        max_credits: params.get("maxCredits").and_then(|v| v.parse().ok()),
        sort_by: params.get("sortBy").and_then(|v| sort_field(v)),
        sort_descending: params.get("sortDescending").map(|v| v == "true").unwrap_or(false),
        offset: params.get("offset").and_then(|v| v.parse().ok()).unwrap_or(0),
        limit: params.get("limit").and_then(|v| v.parse().ok()).unwrap_or(100),
    };

    let records = state.keystore.list_keys_filtered(&query);
    let count = records.len();
    Json(json!({ "keys": records, "count": count })).into_response()
}

fn sort_field(raw: &str) -> Option<SortField> {
    match raw {
        "createdAt" => Some(SortField::CreatedAt),
        "name" => Some(SortField::Name),
        "credits" => Some(SortField::Credits),
        "totalSpent" => Some(SortField::TotalSpent),
        "totalCalls" => Some(SortField::TotalCalls),
        "lastUsedAt" => Some(SortField::LastUsedAt),
        _ => None,
    }
}

pub async fn revoke_key(State(state): State<AppState>, Json(body): Json<JsonValue>) -> Result<Response, ApiError> {
    let fingerprint = require_str(&body, "fingerprint")?;
    Ok(Json(json!({ "revoked": state.keystore.revoke_key(fingerprint) })).into_response())
}

pub async fn suspend_key(State(state): State<AppState>, Json(body): Json<JsonValue>) -> Result<Response, ApiError> {
    let fingerprint = require_str(&body, "fingerprint")?;
    Ok(Json(json!({ "suspended": state.keystore.suspend_key(fingerprint) })).into_response())
}

pub async fn resume_key(State(state): State<AppState>, Json(body): Json<JsonValue>) -> Result<Response, ApiError> {
    let fingerprint = require_str(&body, "fingerprint")?;
    Ok(Json(json!({ "resumed": state.keystore.resume_key(fingerprint) })).into_response())
}

pub async fn rotate_key(State(state): State<AppState>, Json(body): Json<JsonValue>) -> Result<Response, ApiError> {
    let fingerprint = require_str(&body, "fingerprint")?;
    match state.keystore.rotate_key(fingerprint) {
        Some(record) => Ok(Json(record).into_response()),
        None => Err(ApiError::not_found("unknown fingerprint")),
    }
}

pub async fn clone_key(State(state): State<AppState>, Json(body): Json<JsonValue>) -> Result<Response, ApiError> {
    let fingerprint = require_str(&body, "fingerprint")?;
    let name_override = body.get("name").and_then(|v| v.as_str());
    match state.keystore.clone_key(fingerprint, name_override) {
        Some(record) => Ok(Json(record).into_response()),
        None => Err(ApiError::not_found("unknown fingerprint")),
    }
}

pub async fn set_acl(State(state): State<AppState>, Json(body): Json<JsonValue>) -> Result<Response, ApiError> {
    let fingerprint = require_str(&body, "fingerprint")?;
    let allowed = opt_str_list(&body, "allowedTools");
    let denied = opt_str_list(&body, "deniedTools");
    Ok(Json(json!({ "updated": state.keystore.set_tool_acl(fingerprint, allowed, denied) })).into_response())
}

pub async fn set_expiry(State(state): State<AppState>, Json(body): Json<JsonValue>) -> Result<Response, ApiError> {
    let fingerprint = require_str(&body, "fingerprint")?;
    let expires_at = match body.get("expiresAt") {
        Some(JsonValue::Null) | None => None,
        Some(v) => Some(
            v.as_str()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc))
                .ok_or_else(|| ApiError::bad_request("expiresAt must be an RFC3339 timestamp or null"))?,
        ),
    };
    Ok(Json(json!({ "updated": state.keystore.set_expiry(fingerprint, expires_at) })).into_response())
}

pub async fn set_ip_allowlist(State(state): State<AppState>, Json(body): Json<JsonValue>) -> Result<Response, ApiError> {
    let fingerprint = require_str(&body, "fingerprint")?;
    let ips = opt_str_list(&body, "ips");
    Ok(Json(json!({ "updated": state.keystore.set_ip_allowlist(fingerprint, ips) })).into_response())
}

pub async fn set_tags(State(state): State<AppState>, Json(body): Json<JsonValue>) -> Result<Response, ApiError> {
    let fingerprint = require_str(&body, "fingerprint")?;
    let tags: HashMap<String, String> = body
        .get("tags")
        .and_then(|v| v.as_object())
        .map(|obj| obj.iter().filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string()))).collect())
        .unwrap_or_default();
    Ok(Json(json!({ "updated": state.keystore.set_tags(fingerprint, tags) })).into_response())
}

pub async fn set_auto_topup(State(state): State<AppState>, Json(body): Json<JsonValue>) -> Result<Response, ApiError> {
    let fingerprint = require_str(&body, "fingerprint")?;
    let spec = match body.get("autoTopup") {
        Some(JsonValue::Null) | None => None,
        Some(v) => Some(serde_json::from_value(v.clone()).map_err(|e| ApiError::bad_request(e.to_string()))?),
    };
    Ok(Json(json!({ "updated": state.keystore.set_auto_topup(fingerprint, spec) })).into_response())
}

pub async fn set_alias(State(state): State<AppState>, Json(body): Json<JsonValue>) -> Result<Response, ApiError> {
    let fingerprint = require_str(&body, "fingerprint")?;
    let alias = body.get("alias").and_then(|v| v.as_str()).map(str::to_string);
    let updated = state.keystore.set_alias(fingerprint, alias)?;
    Ok(Json(json!({ "updated": updated })).into_response())
}

pub async fn topup(State(state): State<AppState>, Json(body): Json<JsonValue>) -> Result<Response, ApiError> {
    let fingerprint = require_str(&body, "fingerprint")?;
    let amount = body.get("amount").and_then(|v| v.as_i64()).ok_or_else(|| ApiError::bad_request("missing `amount`"))?;
    let remaining = state.keystore.add_credits(fingerprint, amount)?;
    Ok(Json(json!({ "credits": remaining })).into_response())
}

pub async fn set_limits(State(state): State<AppState>, Json(body): Json<JsonValue>) -> Result<Response, ApiError> {
    let fingerprint = require_str(&body, "fingerprint")?;
    let limit = body.get("spendingLimit").and_then(|v| v.as_i64()).ok_or_else(|| ApiError::bad_request("missing `spendingLimit`"))?;
    Ok(Json(json!({ "updated": state.keystore.set_spending_limit(fingerprint, limit) })).into_response())
}

pub async fn usage(State(state): State<AppState>, Query(params): Query<HashMap<String, String>>) -> Response {
    if params.get("format").map(String::as_str) == Some("csv") {
        let query = usage_query_from(&params);
        let events = state.usage_meter.query(&query);
        let mut csv = String::from("timestamp,keyName,tool,creditsCharged,allowed,denyReason\n");
        for event in events {
            csv.push_str(&format!(
                "{},{},{},{},{},{}\n",
                event.timestamp.to_rfc3339(),
                event.key_name,
                event.tool,
                event.credits_charged,
                event.allowed,
                event.deny_reason.unwrap_or_default(),
            ));
        }
        return (StatusCode::OK, [("content-type", "text/csv; charset=utf-8")], csv).into_response();
    }

    Json(state.usage_meter.get_summary()).into_response()
}

fn usage_query_from(params: &HashMap<String, String>) -> UsageQuery {
    UsageQuery {
        since: params.get("since").and_then(|v| DateTime::parse_from_rfc3339(v).ok()).map(|dt| dt.with_timezone(&Utc)),
        until: params.get("until").and_then(|v| DateTime::parse_from_rfc3339(v).ok()).map(|dt| dt.with_timezone(&Utc)),
        tool: params.get("tool").cloned(),
        key_name: params.get("keyName").cloned(),
        allowed: params.get("allowed").and_then(|v| v.parse().ok()),
        action: params.get("action").cloned(),
    }
}

pub async fn audit(State(state): State<AppState>, Query(params): Query<HashMap<String, String>>) -> Response {
    let query = usage_query_from(&params);
    let mut events = state.usage_meter.query(&query);
    events.reverse();
    Json(json!({ "events": events })).into_response()
}

pub async fn webhook_filters_list(State(state): State<AppState>) -> Response {
    Json(json!({ "filters": state.webhook_filters.list() })).into_response()
}

pub async fn webhook_filters_update(State(state): State<AppState>, Json(body): Json<JsonValue>) -> Result<Response, ApiError> {
    let raw_rules = body.get("filters").and_then(|v| v.as_array()).ok_or_else(|| ApiError::bad_request("missing `filters` array"))?;

    let mut rules = Vec::with_capacity(raw_rules.len());
    for raw in raw_rules {
        let rule: WebhookFilterRule = serde_json::from_value(raw.clone()).map_err(|e| ApiError::bad_request(e.to_string()))?;
        check_ssrf(&rule.url).await.map_err(|e| ApiError::bad_request(e.to_string()))?;
        rules.push(rule);
    }

    state.webhook_filters.replace(rules);
    Ok(Json(json!({ "updated": true })).into_response())
}

/// Per-key credit-allocation snapshot: live balance vs. lifetime spend,
/// read straight off the authoritative records — no separate ledger
/// exists (spec §4.1 "KeyStore exclusively owns the record").
pub async fn credit_allocation(State(state): State<AppState>) -> Response {
    let rows: Vec<JsonValue> = state
        .keystore
        .export_keys()
        .into_iter()
        .map(|r| json!({ "namePrefix": truncate(&r.fingerprint), "name": r.name, "credits": r.credits, "totalSpent": r.total_spent }))
        .collect();
    Json(json!({ "keys": rows })).into_response()
}

pub async fn consumer_lifetime_value(State(state): State<AppState>) -> Response {
    let rows: Vec<JsonValue> = state
        .keystore
        .export_keys()
        .into_iter()
        .map(|r| json!({ "namePrefix": truncate(&r.fingerprint), "name": r.name, "totalSpent": r.total_spent, "totalCalls": r.total_calls }))
        .collect();
    Json(json!({ "keys": rows })).into_response()
}

pub async fn quotas(State(state): State<AppState>) -> Response {
    let rows: Vec<JsonValue> = state
        .keystore
        .export_keys()
        .into_iter()
        .map(|r| {
            json!({
                "namePrefix": truncate(&r.fingerprint),
                "dailyCalls": r.quota_daily_calls,
                "monthlyCalls": r.quota_monthly_calls,
                "dailyCredits": r.quota_daily_credits,
                "monthlyCredits": r.quota_monthly_credits,
            })
        })
        .collect();
    Json(json!({ "keys": rows })).into_response()
}

fn truncate(fingerprint: &str) -> String {
    fingerprint.chars().take(12).collect()
}
