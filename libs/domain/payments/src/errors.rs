// [libs/domain/payments/src/errors.rs]
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("[L3_PAYMENT_FAULT]: MALFORMED_SIGNATURE_HEADER")]
    MalformedSignatureHeader,

    #[error("[L3_PAYMENT_FAULT]: SIGNATURE_MISMATCH")]
    SignatureMismatch,

    #[error("[L3_PAYMENT_FAULT]: STALE_TIMESTAMP")]
    StaleTimestamp,

    #[error("[L3_PAYMENT_FAULT]: MALFORMED_BODY: {0}")]
    MalformedBody(String),

    #[error("[L3_PAYMENT_FAULT]: PAYMENT_NOT_COMPLETED")]
    PaymentNotCompleted,

    #[error("[L3_PAYMENT_FAULT]: MISSING_METADATA: {0}")]
    MissingMetadata(String),

    #[error("[L3_PAYMENT_FAULT]: INVALID_CREDIT_AMOUNT")]
    InvalidCreditAmount,

    #[error("[L3_PAYMENT_FAULT]: UNKNOWN_API_KEY")]
    UnknownApiKey,

    #[error("[L3_PAYMENT_FAULT]: FACILITATOR_UNREACHABLE: {0}")]
    FacilitatorUnreachable(String),

    #[error("[L3_PAYMENT_FAULT]: FACILITATOR_REJECTED")]
    FacilitatorRejected,
}
