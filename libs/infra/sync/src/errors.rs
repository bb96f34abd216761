// [libs/infra/sync/src/errors.rs]
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("[L2_SYNC_FAULT]: TRANSPORT -> {0}")]
    Transport(#[from] redis::RedisError),

    #[error("[L2_SYNC_FAULT]: SERIALIZE -> {0}")]
    Serialize(String),

    #[error("[L2_SYNC_FAULT]: DESERIALIZE -> {0}")]
    Deserialize(String),

    #[error("[L2_SYNC_FAULT]: MALFORMED_EVENT -> {0}")]
    MalformedEvent(String),
}
