// [libs/infra/sync/src/lib.rs]
/*!
 * =================================================================
 * APARATO: DISTRIBUTED SYNC STRATUM (V1.0)
 * CLASIFICACIÓN: INFRA (ESTRATO L2)
 * RESPONSABILIDAD: ESPEJO COMPARTIDO, PUB/SUB DE EVENTOS Y SCRIPTS ATÓMICOS
 * =================================================================
 */

pub mod codec;
pub mod errors;
pub mod events;
pub mod mirror;

pub use errors::SyncError;
pub use events::{SyncEvent, SyncEventKind};
pub use mirror::{DeductOutcome, DistributedSync, DEFAULT_SYNC_PERIOD};
