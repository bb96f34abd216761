// [libs/core/gate/src/errors.rs]
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GateError {
    #[error("[L1_GATE_FAULT]: BATCH_EMPTY")]
    EmptyBatch,

    #[error("[L1_GATE_FAULT]: UNKNOWN_APPROVAL_REQUEST")]
    UnknownApprovalRequest,

    #[error("[L1_GATE_FAULT]: APPROVAL_REQUEST_NOT_PENDING")]
    ApprovalRequestNotPending,
}
