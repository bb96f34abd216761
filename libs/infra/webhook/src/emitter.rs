// [libs/infra/webhook/src/emitter.rs]
/*!
 * =================================================================
 * APARATO: WEBHOOK EMISSION STRATUM (V1.0)
 * CLASIFICACIÓN: INFRA (ESTRATO L2)
 * RESPONSABILIDAD: ENTREGA FIRMADA, REINTENTOS Y DISYUNTOR POR URL
 * =================================================================
 */

use crate::circuit::CircuitBreaker;
use crate::errors::WebhookError;
use crate::signature::sign;
use crate::ssrf::check_ssrf;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::RwLock;
use std::time::Duration;
use tracing::{instrument, warn};

pub const DEFAULT_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_CIRCUIT_TRIP_THRESHOLD: u32 = 5;
pub const DEFAULT_CIRCUIT_COOLDOWN_SECS: u64 = 300;
pub const DEFAULT_OUTCOME_HISTORY: usize = 1_000;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryOutcome {
    pub url: String,
    pub delivered: bool,
    pub status_code: Option<u16>,
    pub attempts: u32,
    pub error: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

pub struct WebhookEmitter {
    client: reqwest::Client,
    secret: String,
    max_attempts: u32,
    timeout: Duration,
    circuit: CircuitBreaker,
    history_capacity: usize,
    history: RwLock<VecDeque<DeliveryOutcome>>,
}

impl WebhookEmitter {
    pub fn new(secret: impl Into<String>) -> Self {
        Self::with_config(
            secret,
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            DEFAULT_MAX_ATTEMPTS,
            DEFAULT_CIRCUIT_TRIP_THRESHOLD,
            Duration::from_secs(DEFAULT_CIRCUIT_COOLDOWN_SECS),
            DEFAULT_OUTCOME_HISTORY,
        )
    }

    pub fn with_config(
        secret: impl Into<String>,
        timeout: Duration,
        max_attempts: u32,
        circuit_trip_threshold: u32,
        circuit_cooldown: Duration,
        history_capacity: usize,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("PayGate-Webhook-Emitter/1.0")
            .build()
            .expect("reqwest client config is static and always valid");

        Self {
            client,
            secret: secret.into(),
            max_attempts: max_attempts.max(1),
            timeout,
            circuit: CircuitBreaker::new(circuit_trip_threshold, circuit_cooldown),
            history_capacity: history_capacity.max(1),
            history: RwLock::new(VecDeque::new()),
        }
    }

    /// Signs and delivers `payload` to `url`, retrying transient failures
    /// with exponential backoff. The SSRF guard runs first and its
    /// rejection short-circuits delivery entirely (no retry, no circuit
    /// accounting — the URL was never dialable to begin with).
    #[instrument(skip(self, payload), fields(url = %url))]
    pub async fn emit(&self, url: &str, payload: &serde_json::Value) -> Result<DeliveryOutcome, WebhookError> {
        let checked_url = check_ssrf(url).await?;

        if self.circuit.is_open(url) {
            let outcome = self.record_outcome(url, false, None, 0, Some("circuit open".into()));
            return Err(WebhookError::CircuitOpen(outcome.url));
        }

        let body = serde_json::to_vec(payload)?;
        let signature = sign(&self.secret, &body);

        let mut last_error: Option<String> = None;
        let mut last_status: Option<u16> = None;

        for attempt in 1..=self.max_attempts {
            let send_result = self
                .client
                .post(checked_url.clone())
                .header("Content-Type", "application/json")
                .header("X-PayGate-Signature", &signature)
                .body(body.clone())
                .send()
                .await;

            match send_result {
                Ok(response) => {
                    let status = response.status();
                    last_status = Some(status.as_u16());
                    if status.is_success() {
                        self.circuit.record_success(url);
                        return Ok(self.record_outcome(url, true, last_status, attempt, None));
                    }
                    last_error = Some(format!("http status {status}"));
                }
                Err(transport_fault) => {
                    last_error = Some(transport_fault.to_string());
                }
            }

            if attempt < self.max_attempts {
                let backoff = Duration::from_millis(250u64 * 2u64.pow(attempt - 1));
                warn!(attempt, ?backoff, "webhook delivery attempt failed, retrying");
                tokio::time::sleep(backoff).await;
            }
        }

        self.circuit.record_failure(url);
        self.record_outcome(url, false, last_status, self.max_attempts, last_error.clone());
        warn!(url, "webhook delivery exhausted all retries");
        Err(WebhookError::Transport(last_error.unwrap_or_else(|| "delivery failed".into())))
    }

    fn record_outcome(
        &self,
        url: &str,
        delivered: bool,
        status_code: Option<u16>,
        attempts: u32,
        error: Option<String>,
    ) -> DeliveryOutcome {
        let outcome = DeliveryOutcome {
            url: url.to_string(),
            delivered,
            status_code,
            attempts,
            error,
            recorded_at: Utc::now(),
        };

        let mut guard = self.history.write().expect("webhook history lock poisoned");
        guard.push_back(outcome.clone());
        if guard.len() > self.history_capacity {
            guard.pop_front();
        }

        outcome
    }

    /// Recent delivery outcomes, newest last — consumed by the
    /// scheduled-report manager.
    pub fn recent_outcomes(&self) -> Vec<DeliveryOutcome> {
        self.history.read().expect("webhook history lock poisoned").iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_ssrf_targets_without_touching_the_circuit() {
        let emitter = WebhookEmitter::new("secret");
        let result = emitter.emit("http://127.0.0.1/hook", &serde_json::json!({"a":1})).await;
        assert!(matches!(result, Err(WebhookError::SsrfRejected(_))));
        assert!(!emitter.circuit.is_open("http://127.0.0.1/hook"));
    }

    #[tokio::test]
    async fn unreachable_host_exhausts_retries_and_trips_circuit() {
        let emitter = WebhookEmitter::with_config(
            "secret",
            Duration::from_millis(200),
            2,
            1,
            Duration::from_secs(60),
            10,
        );
        // TEST-NET-1 (RFC 5737) is reserved for documentation and never
        // routes; connection attempts fail fast without a live network.
        let result = emitter.emit("http://203.0.113.1/hook", &serde_json::json!({"a":1})).await;
        assert!(result.is_err());
        assert!(emitter.circuit.is_open("http://203.0.113.1/hook"));
        assert_eq!(emitter.recent_outcomes().len(), 1);
    }
}
