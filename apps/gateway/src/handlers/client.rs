// [apps/gateway/src/handlers/client.rs]
/*!
 * Client-facing surface (spec §6): `/mcp` JSON-RPC admission + forward,
 * `/balance`, `/dashboard`.
 */

use crate::errors::{admission_denied, jsonrpc_error, jsonrpc_result};
use crate::services::backend::forward_to_backend;
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use paygate_model::JsonValue;
use paygate_sync::SyncEventKind;
use serde_json::json;
use std::net::SocketAddr;
use tracing::{info, warn};

/// Tool name + args a JSON-RPC call should be billed/forwarded under.
/// `tools/call` follows the MCP convention (`params.name`/`params.arguments`);
/// any other non-free method is treated as the tool itself, with the raw
/// params as its arguments.
fn resolve_tool(method: &str, params: &JsonValue) -> (String, JsonValue) {
    if method == "tools/call" {
        let name = params.get("name").and_then(|v| v.as_str()).unwrap_or(method).to_string();
        let args = params.get("arguments").cloned().unwrap_or(json!({}));
        (name, args)
    } else {
        (method.to_string(), params.clone())
    }
}

pub async fn mcp_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    bytes: Bytes,
) -> Response {
    let content_type_ok = headers.get("content-type").and_then(|v| v.to_str().ok()).map(|v| v.contains("application/json")).unwrap_or(false);
    if !content_type_ok {
        return (StatusCode::UNSUPPORTED_MEDIA_TYPE, Json(json!({ "error": "Content-Type must include application/json" }))).into_response();
    }

    let body: JsonValue = match serde_json::from_slice(&bytes) {
        Ok(v) => v,
        Err(_) => return jsonrpc_error(JsonValue::Null, -32600, "malformed JSON body").into_response(),
    };

    let id = body.get("id").cloned().unwrap_or(JsonValue::Null);

    if body.get("jsonrpc").and_then(|v| v.as_str()) != Some("2.0") {
        return (StatusCode::BAD_REQUEST, jsonrpc_error(id, -32600, "jsonrpc must be exactly \"2.0\"")).into_response();
    }

    let method = match body.get("method").and_then(|v| v.as_str()) {
        Some(m) => m.to_string(),
        None => return (StatusCode::BAD_REQUEST, jsonrpc_error(id, -32600, "missing `method`")).into_response(),
    };
    let params = body.get("params").cloned().unwrap_or(json!({}));

    let api_key = extract_api_key_from_headers(&headers);
    let client_ip = resolve_client_ip(&headers, addr);

    if method.starts_with("tasks/") && method != "tasks/send" {
        return handle_task_query(&state, &method, &params, api_key.as_deref(), id);
    }

    let (tool, args) = if method == "tasks/send" {
        let tool = params.get("tool").and_then(|v| v.as_str()).unwrap_or("tasks/send").to_string();
        (tool, params.clone())
    } else {
        resolve_tool(&method, &params)
    };

    let decision = state.gate.admit(&method, api_key.as_deref(), &tool, args.clone(), client_ip).await;

    if !decision.allowed {
        warn!(tool = %tool, reason = ?decision.reason, "admission denied");
        return admission_denied(id, decision.reason.as_deref().unwrap_or("denied"));
    }

    if decision.credits_charged > 0 {
        if let (Some(sync), Some(fingerprint)) = (state.sync.clone(), api_key.clone()) {
            if let Some(record) = state.keystore.get_key_raw(&fingerprint) {
                tokio::spawn(async move {
                    let mut guard = sync.lock().await;
                    let _ = guard
                        .publish_event(SyncEventKind::CreditsChanged {
                            fingerprint: record.fingerprint,
                            credits: record.credits,
                            total_spent: record.total_spent,
                            total_calls: record.total_calls,
                        })
                        .await;
                });
            }
        }
    }

    if method == "tasks/send" {
        let task = state.task_manager.create(&tool, args, &truncate(api_key.as_deref().unwrap_or("")), None);
        return jsonrpc_result(id, json!({ "taskId": task.id, "status": task.status, "remainingCredits": decision.remaining_credits })).into_response();
    }

    match forward_to_backend(&state.backend_client, &state.config, &tool, &args).await {
        Ok(result) => {
            info!(tool = %tool, credits_charged = decision.credits_charged, "tool call forwarded");
            jsonrpc_result(id, result).into_response()
        }
        Err(err) => {
            if state.config.refund_on_failure && decision.credits_charged > 0 {
                if let Some(fingerprint) = &api_key {
                    state.gate.refund(fingerprint, decision.credits_charged);
                }
            }
            warn!(tool = %tool, error = %err, "backend call failed");
            jsonrpc_error(id, -32000, "Remote server error").into_response()
        }
    }
}

fn handle_task_query(state: &AppState, method: &str, params: &JsonValue, api_key: Option<&str>, id: JsonValue) -> Response {
    match paygate_tasks::handle_tasks_method(&state.task_manager, method, params, truncate(api_key.unwrap_or("")).as_str(), None) {
        Ok(payload) => jsonrpc_result(id, payload).into_response(),
        Err(err) => jsonrpc_error(id, -32000, err.to_string()).into_response(),
    }
}

pub async fn balance_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(fingerprint) = extract_api_key_from_headers(&headers) else {
        return (StatusCode::NOT_FOUND, Json(json!({ "error": "unknown api key" }))).into_response();
    };

    match state.keystore.resolve_key(&fingerprint) {
        Some(record) => {
            Json(json!({ "credits": record.credits, "totalSpent": record.total_spent, "totalCalls": record.total_calls })).into_response()
        }
        // §7 item 3: unknown/invalid keys return 404, never 401, to avoid
        // letting a caller distinguish "wrong key" from "no such key".
        None => (StatusCode::NOT_FOUND, Json(json!({ "error": "unknown api key" }))).into_response(),
    }
}

pub async fn dashboard_handler(State(state): State<AppState>) -> Response {
    let server_name = html_escape("PayGate");
    let feature_summary = html_escape(&state.config.feature_summary());
    let body = format!(
        "<!doctype html><html><head><title>{server_name}</title></head><body><h1>{server_name}</h1><p>Features: {feature_summary}</p></body></html>"
    );

    (
        StatusCode::OK,
        [("content-type", "text/html; charset=utf-8"), ("cache-control", "no-cache")],
        body,
    )
        .into_response()
}

/// Unconditional HTML-escape of untrusted boundary input (spec §9 Open
/// Question: dashboard server-name XSS).
fn html_escape(raw: &str) -> String {
    raw.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;").replace('"', "&quot;").replace('\'', "&#39;")
}

fn extract_api_key_from_headers(headers: &HeaderMap) -> Option<String> {
    headers.get("x-api-key").and_then(|v| v.to_str().ok()).map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

fn resolve_client_ip(headers: &HeaderMap, addr: SocketAddr) -> Option<std::net::IpAddr> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse().ok())
        .or(Some(addr.ip()))
}

fn truncate(fingerprint: &str) -> String {
    fingerprint.chars().take(12).collect()
}
