// [libs/core/tasks/src/errors.rs]
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("[L1_TASK_FAULT]: TASK_NOT_FOUND")]
    NotFound,

    #[error("[L1_TASK_FAULT]: INVALID_TRANSITION_FROM_TERMINAL_STATE")]
    TerminalState,

    #[error("[L1_TASK_FAULT]: UNKNOWN_METHOD -> {0}")]
    UnknownMethod(String),

    #[error("[L1_TASK_FAULT]: MALFORMED_PARAMS -> {0}")]
    MalformedParams(String),
}
