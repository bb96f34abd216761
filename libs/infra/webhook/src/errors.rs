// [libs/infra/webhook/src/errors.rs]
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("[L2_WEBHOOK_FAULT]: SSRF_REJECTED: {0}")]
    SsrfRejected(String),

    #[error("[L2_WEBHOOK_FAULT]: URL_MALFORMED: {0}")]
    MalformedUrl(String),

    #[error("[L2_WEBHOOK_FAULT]: CIRCUIT_OPEN: {0}")]
    CircuitOpen(String),

    #[error("[L2_WEBHOOK_FAULT]: TRANSPORT: {0}")]
    Transport(String),

    #[error("[L2_WEBHOOK_FAULT]: SERIALIZE: {0}")]
    Serialize(#[from] serde_json::Error),
}
