// [apps/gateway/src/errors.rs]
/*!
 * Translates every crate's `thiserror` enum into the JSON-RPC/HTTP
 * envelopes of spec §6-§7. Nothing in this binary panics on a bad
 * inbound request; every fallible path lands here.
 */

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use paygate_keystore::KeyStoreError;
use paygate_payments::PaymentError;
use paygate_tasks::TaskError;
use paygate_webhook::WebhookError;
use serde_json::{json, Value as JsonValue};

/// JSON-RPC 2.0 error object, per spec §6 "Key denial responses" and §7 item 1/5.
pub fn jsonrpc_error(id: JsonValue, code: i64, message: impl Into<String>) -> Json<JsonValue> {
    Json(json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message.into() },
    }))
}

pub fn jsonrpc_result(id: JsonValue, result: JsonValue) -> Json<JsonValue> {
    Json(json!({ "jsonrpc": "2.0", "id": id, "result": result }))
}

/// A denied admission is not a transport failure; it's a valid JSON-RPC
/// response carrying a protocol-level error (spec §7 item 1 - "never fatal").
pub fn admission_denied(id: JsonValue, reason: &str) -> Response {
    jsonrpc_error(id, -32402, format!("Payment required: {reason}")).into_response()
}

/// Thin wrapper so admin/payment handlers can `?` into a uniform response.
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<KeyStoreError> for ApiError {
    fn from(err: KeyStoreError) -> Self {
        let status = match err {
            KeyStoreError::RecordNotFound => StatusCode::NOT_FOUND,
            KeyStoreError::AliasCollision(_) => StatusCode::CONFLICT,
            KeyStoreError::InsufficientCredits | KeyStoreError::InvalidAmount | KeyStoreError::RecordNotActive => StatusCode::BAD_REQUEST,
            KeyStoreError::SnapshotIo(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl From<TaskError> for ApiError {
    fn from(err: TaskError) -> Self {
        let status = match err {
            TaskError::NotFound => StatusCode::NOT_FOUND,
            TaskError::TerminalState | TaskError::UnknownMethod(_) | TaskError::MalformedParams(_) => StatusCode::BAD_REQUEST,
        };
        Self::new(status, err.to_string())
    }
}

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        // Payment errors never credit on failure (spec §7 item 6); all map
        // to a 4xx so the caller knows the payment did not go through.
        let status = match err {
            PaymentError::UnknownApiKey => StatusCode::NOT_FOUND,
            PaymentError::FacilitatorUnreachable(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::BAD_REQUEST,
        };
        Self::new(status, err.to_string())
    }
}

impl From<WebhookError> for ApiError {
    fn from(err: WebhookError) -> Self {
        Self::new(StatusCode::BAD_REQUEST, err.to_string())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
    }
}
