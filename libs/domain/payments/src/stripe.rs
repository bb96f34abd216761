// [libs/domain/payments/src/stripe.rs]
/*!
 * Stripe webhook intake (spec §4.9). Verifies the `Stripe-Signature`
 * header before touching the body, awards credits on a verified
 * `checkout.session.completed` with `payment_status == "paid"`, and
 * acknowledges every other event type as a no-op.
 */

use crate::errors::PaymentError;
use chrono::Utc;
use hmac::{Hmac, Mac};
use paygate_keystore::KeyStore;
use paygate_metering::UsageMeter;
use paygate_model::{JsonValue, UsageEvent};
use sha2::Sha256;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{info, instrument, warn};

type HmacSha256 = Hmac<Sha256>;

const REPLAY_WINDOW_SECS: i64 = 300;

#[derive(Debug, Clone, PartialEq)]
pub enum StripeOutcome {
    CreditsAdded { fingerprint_prefix: String, credits: i64, remaining: i64 },
    Acknowledged,
}

pub struct StripeWebhookHandler {
    keystore: Arc<KeyStore>,
    usage_meter: Arc<UsageMeter>,
    webhook_secret: String,
}

impl StripeWebhookHandler {
    pub fn new(keystore: Arc<KeyStore>, usage_meter: Arc<UsageMeter>, webhook_secret: impl Into<String>) -> Self {
        Self { keystore, usage_meter, webhook_secret: webhook_secret.into() }
    }

    #[instrument(skip(self, raw_body, signature_header))]
    pub fn handle(&self, signature_header: &str, raw_body: &[u8]) -> Result<StripeOutcome, PaymentError> {
        verify_signature(signature_header, raw_body, &self.webhook_secret)?;

        let body: JsonValue =
            serde_json::from_slice(raw_body).map_err(|e| PaymentError::MalformedBody(e.to_string()))?;

        let event_type = body.get("type").and_then(|v| v.as_str()).unwrap_or_default();
        if event_type != "checkout.session.completed" {
            info!(event_type, "acknowledging unhandled stripe event type");
            return Ok(StripeOutcome::Acknowledged);
        }

        let session = body
            .pointer("/data/object")
            .ok_or_else(|| PaymentError::MalformedBody("missing data.object".into()))?;

        let payment_status = session.get("payment_status").and_then(|v| v.as_str()).unwrap_or_default();
        if payment_status != "paid" {
            return Err(PaymentError::PaymentNotCompleted);
        }

        let metadata = session
            .get("metadata")
            .ok_or_else(|| PaymentError::MissingMetadata("metadata".into()))?;

        let fingerprint = metadata
            .get("paygate_api_key")
            .and_then(|v| v.as_str())
            .ok_or_else(|| PaymentError::MissingMetadata("paygate_api_key".into()))?;

        let credits = metadata
            .get("paygate_credits")
            .ok_or_else(|| PaymentError::MissingMetadata("paygate_credits".into()))
            .and_then(parse_credits)?;

        let record = self.keystore.resolve_key(fingerprint).ok_or(PaymentError::UnknownApiKey)?;

        let remaining = self
            .keystore
            .add_credits(&record.fingerprint, credits)
            .map_err(|_| PaymentError::InvalidCreditAmount)?;

        let fingerprint_prefix = truncate_fingerprint(&record.fingerprint);

        self.usage_meter.record(UsageEvent {
            timestamp: Utc::now(),
            api_key_fingerprint: record.fingerprint.clone(),
            key_name: record.name.clone(),
            tool: "payment:stripe".to_string(),
            credits_charged: -credits,
            allowed: true,
            action: Some("payment:topup".to_string()),
            deny_reason: None,
            duration_ms: None,
            key_namespace: Some(record.namespace.clone()),
        });

        info!(key_prefix = %fingerprint_prefix, credits, remaining, "stripe checkout credited api key");

        Ok(StripeOutcome::CreditsAdded { fingerprint_prefix, credits, remaining })
    }
}

fn verify_signature(header: &str, raw_body: &[u8], secret: &str) -> Result<(), PaymentError> {
    let mut timestamp: Option<i64> = None;
    let mut signature_hex: Option<&str> = None;

    for part in header.split(',') {
        let mut kv = part.splitn(2, '=');
        match (kv.next(), kv.next()) {
            (Some("t"), Some(value)) => timestamp = value.parse::<i64>().ok(),
            (Some("v1"), Some(value)) => signature_hex = Some(value),
            _ => {}
        }
    }

    let (timestamp, signature_hex) = match (timestamp, signature_hex) {
        (Some(t), Some(sig)) => (t, sig),
        _ => return Err(PaymentError::MalformedSignatureHeader),
    };

    let now = Utc::now().timestamp();
    if (now - timestamp).abs() > REPLAY_WINDOW_SECS {
        return Err(PaymentError::StaleTimestamp);
    }

    let expected_bytes = hex::decode(signature_hex).map_err(|_| PaymentError::MalformedSignatureHeader)?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(raw_body);
    let computed = mac.finalize().into_bytes();

    if computed.len() != expected_bytes.len() || computed.as_slice().ct_eq(&expected_bytes).unwrap_u8() != 1 {
        warn!("stripe webhook signature mismatch");
        return Err(PaymentError::SignatureMismatch);
    }

    Ok(())
}

fn parse_credits(value: &JsonValue) -> Result<i64, PaymentError> {
    let as_f64 = match value {
        JsonValue::Number(n) => n.as_f64().ok_or(PaymentError::InvalidCreditAmount)?,
        JsonValue::String(s) => s.trim().parse::<f64>().map_err(|_| PaymentError::InvalidCreditAmount)?,
        _ => return Err(PaymentError::InvalidCreditAmount),
    };

    let floored = as_f64.floor();
    if floored <= 0.0 || !floored.is_finite() {
        return Err(PaymentError::InvalidCreditAmount);
    }

    Ok(floored as i64)
}

fn truncate_fingerprint(fingerprint: &str) -> String {
    fingerprint.chars().take(12).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use paygate_keystore::{CreateKeyOptions, KeyStore};
    use paygate_metering::UsageMeter;

    fn signed_header(secret: &str, body: &[u8], timestamp: i64) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(body);
        let sig = hex::encode(mac.finalize().into_bytes());
        format!("t={timestamp},v1={sig}")
    }

    fn handler() -> (StripeWebhookHandler, Arc<KeyStore>, String) {
        let keystore = Arc::new(KeyStore::new("pg_live_", None));
        let usage_meter = Arc::new(UsageMeter::new(100));
        let record = keystore.create_key("customer", 0, CreateKeyOptions::default());
        let handler = StripeWebhookHandler::new(keystore.clone(), usage_meter, "whsec_test");
        (handler, keystore, record.fingerprint)
    }

    #[test]
    fn verified_checkout_session_credits_the_key() {
        let (handler, keystore, fingerprint) = handler();
        let now = Utc::now().timestamp();
        let body = serde_json::json!({
            "type": "checkout.session.completed",
            "data": {"object": {
                "payment_status": "paid",
                "metadata": {"paygate_api_key": fingerprint, "paygate_credits": "500"}
            }}
        });
        let raw = serde_json::to_vec(&body).unwrap();
        let header = signed_header("whsec_test", &raw, now);

        let outcome = handler.handle(&header, &raw).unwrap();
        match outcome {
            StripeOutcome::CreditsAdded { credits, remaining, .. } => {
                assert_eq!(credits, 500);
                assert_eq!(remaining, 500);
            }
            _ => panic!("expected CreditsAdded"),
        }
        assert_eq!(keystore.get_key_raw(&fingerprint).unwrap().credits, 500);
    }

    #[test]
    fn tampered_body_is_rejected() {
        let (handler, _keystore, fingerprint) = handler();
        let now = Utc::now().timestamp();
        let body = serde_json::json!({
            "type": "checkout.session.completed",
            "data": {"object": {"payment_status": "paid", "metadata": {"paygate_api_key": fingerprint, "paygate_credits": "500"}}}
        });
        let raw = serde_json::to_vec(&body).unwrap();
        let header = signed_header("whsec_test", &raw, now);
        let tampered = serde_json::to_vec(&serde_json::json!({"type": "checkout.session.completed", "tampered": true})).unwrap();

        let err = handler.handle(&header, &tampered).unwrap_err();
        assert!(matches!(err, PaymentError::SignatureMismatch));
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let (handler, _keystore, fingerprint) = handler();
        let old = Utc::now().timestamp() - 1000;
        let body = serde_json::json!({
            "type": "checkout.session.completed",
            "data": {"object": {"payment_status": "paid", "metadata": {"paygate_api_key": fingerprint, "paygate_credits": "10"}}}
        });
        let raw = serde_json::to_vec(&body).unwrap();
        let header = signed_header("whsec_test", &raw, old);

        let err = handler.handle(&header, &raw).unwrap_err();
        assert!(matches!(err, PaymentError::StaleTimestamp));
    }

    #[test]
    fn unpaid_session_is_rejected() {
        let (handler, _keystore, fingerprint) = handler();
        let now = Utc::now().timestamp();
        let body = serde_json::json!({
            "type": "checkout.session.completed",
            "data": {"object": {"payment_status": "unpaid", "metadata": {"paygate_api_key": fingerprint, "paygate_credits": "10"}}}
        });
        let raw = serde_json::to_vec(&body).unwrap();
        let header = signed_header("whsec_test", &raw, now);

        let err = handler.handle(&header, &raw).unwrap_err();
        assert!(matches!(err, PaymentError::PaymentNotCompleted));
    }

    #[test]
    fn unknown_api_key_is_rejected() {
        let (handler, _keystore, _fingerprint) = handler();
        let now = Utc::now().timestamp();
        let body = serde_json::json!({
            "type": "checkout.session.completed",
            "data": {"object": {"payment_status": "paid", "metadata": {"paygate_api_key": "pg_live_nonexistent", "paygate_credits": "10"}}}
        });
        let raw = serde_json::to_vec(&body).unwrap();
        let header = signed_header("whsec_test", &raw, now);

        let err = handler.handle(&header, &raw).unwrap_err();
        assert!(matches!(err, PaymentError::UnknownApiKey));
    }

    #[test]
    fn non_positive_credits_are_rejected() {
        let (handler, _keystore, fingerprint) = handler();
        let now = Utc::now().timestamp();
        let body = serde_json::json!({
            "type": "checkout.session.completed",
            "data": {"object": {"payment_status": "paid", "metadata": {"paygate_api_key": fingerprint, "paygate_credits": "0"}}}
        });
        let raw = serde_json::to_vec(&body).unwrap();
        let header = signed_header("whsec_test", &raw, now);

        let err = handler.handle(&header, &raw).unwrap_err();
        assert!(matches!(err, PaymentError::InvalidCreditAmount));
    }

    #[test]
    fn unrelated_event_types_are_acknowledged_as_noop() {
        let (handler, _keystore, _fingerprint) = handler();
        let now = Utc::now().timestamp();
        let body = serde_json::json!({"type": "invoice.paid", "data": {"object": {}}});
        let raw = serde_json::to_vec(&body).unwrap();
        let header = signed_header("whsec_test", &raw, now);

        let outcome = handler.handle(&header, &raw).unwrap();
        assert_eq!(outcome, StripeOutcome::Acknowledged);
    }
}
