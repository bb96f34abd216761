// [libs/domain/payments/src/x402.rs]
/*!
 * x402 payment protocol handler (spec §4.10). When a caller is short on
 * credits the gateway hands back a base64 `PaymentRequirements` body;
 * once the caller has paid, `verify_and_award` checks the payment with
 * the configured Facilitator and credits the key only on an asserted
 * `valid` response.
 */

use crate::errors::PaymentError;
use base64::Engine;
use chrono::Utc;
use paygate_keystore::KeyStore;
use paygate_metering::UsageMeter;
use paygate_model::{JsonValue, UsageEvent};
use serde::Serialize;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

const FACILITATOR_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    pub network: String,
    pub asset: String,
    pub recipient: String,
    pub amount: String,
}

pub fn build_payment_requirements(
    credits_required: i64,
    credits_per_dollar: f64,
    network: impl Into<String>,
    asset: impl Into<String>,
    recipient: impl Into<String>,
) -> PaymentRequirements {
    let dollars = credits_required as f64 / credits_per_dollar.max(f64::EPSILON);
    PaymentRequirements {
        network: network.into(),
        asset: asset.into(),
        recipient: recipient.into(),
        amount: format_dollar_amount(dollars),
    }
}

/// Renders `dollars` to 6 decimal places then strips trailing zeros (and
/// a bare trailing decimal point), e.g. `2.500000` -> `2.5`, `3.000000` -> `3`.
pub fn format_dollar_amount(dollars: f64) -> String {
    let fixed = format!("{dollars:.6}");
    let trimmed = fixed.trim_end_matches('0');
    trimmed.trim_end_matches('.').to_string()
}

pub fn encode_payment_requirements(requirements: &PaymentRequirements) -> String {
    let json = serde_json::to_vec(requirements).expect("PaymentRequirements always serializes");
    base64::engine::general_purpose::STANDARD.encode(json)
}

fn evaluate_facilitator_response(response: &JsonValue) -> bool {
    response.get("valid").and_then(|v| v.as_bool()).unwrap_or(false)
}

#[derive(Debug, Default)]
pub struct X402CountersSnapshot {
    pub payments: u64,
    pub usd_received_cents: u64,
    pub credits_awarded: i64,
    pub failed_verifications: u64,
    pub facilitator_errors: u64,
}

struct X402Counters {
    payments: AtomicU64,
    usd_received_cents: AtomicU64,
    credits_awarded: AtomicI64,
    failed_verifications: AtomicU64,
    facilitator_errors: AtomicU64,
}

impl Default for X402Counters {
    fn default() -> Self {
        Self {
            payments: AtomicU64::new(0),
            usd_received_cents: AtomicU64::new(0),
            credits_awarded: AtomicI64::new(0),
            failed_verifications: AtomicU64::new(0),
            facilitator_errors: AtomicU64::new(0),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct X402Award {
    pub credits: i64,
    pub remaining: i64,
}

pub struct X402Handler {
    client: reqwest::Client,
    facilitator_url: String,
    keystore: Arc<KeyStore>,
    usage_meter: Arc<UsageMeter>,
    counters: X402Counters,
}

impl X402Handler {
    pub fn new(keystore: Arc<KeyStore>, usage_meter: Arc<UsageMeter>, facilitator_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(FACILITATOR_TIMEOUT_SECS))
            .user_agent("PayGate-X402-Client/1.0")
            .build()
            .expect("reqwest client config is static and always valid");

        Self {
            client,
            facilitator_url: facilitator_url.into(),
            keystore,
            usage_meter,
            counters: X402Counters::default(),
        }
    }

    #[instrument(skip(self, payment_payload, payment_requirements))]
    pub async fn verify_and_award(
        &self,
        fingerprint: &str,
        credits_requested: i64,
        usd_amount: f64,
        payment_payload: JsonValue,
        payment_requirements: JsonValue,
    ) -> Result<X402Award, PaymentError> {
        let record = self.keystore.get_key_raw(fingerprint).ok_or(PaymentError::UnknownApiKey)?;

        let body = serde_json::json!({
            "paymentPayload": payment_payload,
            "paymentRequirements": payment_requirements,
        });

        let response = self
            .client
            .post(&self.facilitator_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                self.counters.facilitator_errors.fetch_add(1, Ordering::Relaxed);
                PaymentError::FacilitatorUnreachable(e.to_string())
            })?;

        if !response.status().is_success() {
            self.counters.facilitator_errors.fetch_add(1, Ordering::Relaxed);
            return Err(PaymentError::FacilitatorUnreachable(format!("status {}", response.status())));
        }

        let parsed: JsonValue = response.json().await.map_err(|e| {
            self.counters.facilitator_errors.fetch_add(1, Ordering::Relaxed);
            PaymentError::FacilitatorUnreachable(e.to_string())
        })?;

        if !evaluate_facilitator_response(&parsed) {
            self.counters.failed_verifications.fetch_add(1, Ordering::Relaxed);
            warn!(key_prefix = %truncate(&fingerprint), "facilitator rejected x402 payment");
            return Err(PaymentError::FacilitatorRejected);
        }

        let remaining = self
            .keystore
            .add_credits(&record.fingerprint, credits_requested)
            .map_err(|_| PaymentError::InvalidCreditAmount)?;

        self.counters.payments.fetch_add(1, Ordering::Relaxed);
        self.counters.usd_received_cents.fetch_add((usd_amount * 100.0).round() as u64, Ordering::Relaxed);
        self.counters.credits_awarded.fetch_add(credits_requested, Ordering::Relaxed);

        self.usage_meter.record(UsageEvent {
            timestamp: Utc::now(),
            api_key_fingerprint: record.fingerprint.clone(),
            key_name: record.name.clone(),
            tool: "payment:x402".to_string(),
            credits_charged: -credits_requested,
            allowed: true,
            action: Some("payment:topup".to_string()),
            deny_reason: None,
            duration_ms: None,
            key_namespace: Some(record.namespace.clone()),
        });

        info!(key_prefix = %truncate(&record.fingerprint), credits_requested, remaining, "x402 payment verified and credited");

        Ok(X402Award { credits: credits_requested, remaining })
    }

    pub fn counters(&self) -> X402CountersSnapshot {
        X402CountersSnapshot {
            payments: self.counters.payments.load(Ordering::Relaxed),
            usd_received_cents: self.counters.usd_received_cents.load(Ordering::Relaxed),
            credits_awarded: self.counters.credits_awarded.load(Ordering::Relaxed),
            failed_verifications: self.counters.failed_verifications.load(Ordering::Relaxed),
            facilitator_errors: self.counters.facilitator_errors.load(Ordering::Relaxed),
        }
    }
}

fn truncate(fingerprint: &str) -> String {
    fingerprint.chars().take(12).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_trailing_zeros_but_keeps_significant_digits() {
        assert_eq!(format_dollar_amount(2.5), "2.5");
        assert_eq!(format_dollar_amount(3.0), "3");
        assert_eq!(format_dollar_amount(0.1), "0.1");
        assert_eq!(format_dollar_amount(1.0 / 3.0), "0.333333");
    }

    #[test]
    fn builds_requirements_with_divided_amount() {
        let req = build_payment_requirements(500, 100.0, "base", "usdc", "0xabc");
        assert_eq!(req.amount, "5");
        assert_eq!(req.network, "base");
    }

    #[test]
    fn encoded_requirements_round_trip_through_base64_json() {
        let req = build_payment_requirements(250, 100.0, "base", "usdc", "0xabc");
        let encoded = encode_payment_requirements(&req);
        let decoded = base64::engine::general_purpose::STANDARD.decode(&encoded).unwrap();
        let value: JsonValue = serde_json::from_slice(&decoded).unwrap();
        assert_eq!(value["amount"], "2.5");
        assert_eq!(value["recipient"], "0xabc");
    }

    #[test]
    fn evaluate_facilitator_response_requires_explicit_true() {
        assert!(evaluate_facilitator_response(&serde_json::json!({"valid": true})));
        assert!(!evaluate_facilitator_response(&serde_json::json!({"valid": false})));
        assert!(!evaluate_facilitator_response(&serde_json::json!({})));
    }
}
