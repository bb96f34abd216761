// [apps/gateway/src/handlers/payments.rs]
/*!
 * Payment intake (spec §4.9/§4.10, §6 `/stripe/webhook` + `/x402/verify`).
 * Both endpoints sit behind the admin guard per the endpoint table, but
 * neither admin action mutates via KeyStore directly - they delegate to
 * `paygate-payments`, which already owns the verify-then-credit sequence.
 */

use crate::errors::ApiError;
use crate::state::AppState;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use paygate_model::JsonValue;
use serde_json::json;

pub async fn stripe_webhook(State(state): State<AppState>, headers: HeaderMap, body: axum::body::Bytes) -> Result<Response, ApiError> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::bad_request("missing Stripe-Signature header"))?;

    let outcome = state.stripe_handler.handle(signature, &body)?;
    Ok(Json(json!({ "outcome": format!("{outcome:?}") })).into_response())
}

pub async fn x402_verify(State(state): State<AppState>, Json(body): Json<JsonValue>) -> Result<Response, ApiError> {
    let fingerprint = body.get("fingerprint").and_then(|v| v.as_str()).ok_or_else(|| ApiError::bad_request("missing `fingerprint`"))?;
    let credits_requested = body.get("creditsRequested").and_then(|v| v.as_i64()).ok_or_else(|| ApiError::bad_request("missing `creditsRequested`"))?;
    let usd_amount = body.get("usdAmount").and_then(|v| v.as_f64()).ok_or_else(|| ApiError::bad_request("missing `usdAmount`"))?;
    let payment_payload = body.get("paymentPayload").cloned().unwrap_or(JsonValue::Null);
    let payment_requirements = body.get("paymentRequirements").cloned().unwrap_or(JsonValue::Null);

    let award = state
        .x402_handler
        .verify_and_award(fingerprint, credits_requested, usd_amount, payment_payload, payment_requirements)
        .await?;

    Ok((StatusCode::OK, Json(json!({ "credits": award.credits, "remaining": award.remaining }))).into_response())
}
