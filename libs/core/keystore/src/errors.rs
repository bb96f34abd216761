// [libs/core/keystore/src/errors.rs]
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeyStoreError {
    #[error("[L1_KEYSTORE_FAULT]: RECORD_NOT_FOUND")]
    RecordNotFound,

    #[error("[L1_KEYSTORE_FAULT]: ALIAS_COLLISION -> {0}")]
    AliasCollision(String),

    #[error("[L1_KEYSTORE_FAULT]: INSUFFICIENT_CREDITS")]
    InsufficientCredits,

    #[error("[L1_KEYSTORE_FAULT]: INVALID_AMOUNT")]
    InvalidAmount,

    #[error("[L1_KEYSTORE_FAULT]: RECORD_NOT_ACTIVE")]
    RecordNotActive,

    /// Persistence failures are logged by the store itself and never
    /// propagated to policy callers (spec §4.1 failure semantics); this
    /// variant exists only for the rare caller (e.g. `exportKeys`'s
    /// backup path) that wants to surface an I/O failure explicitly.
    #[error("[L1_KEYSTORE_IO_FAULT]: SNAPSHOT_IO -> {0}")]
    SnapshotIo(String),
}
