// [libs/core/gate/src/lib.rs]
/*!
 * =================================================================
 * APARATO: GATE STRATUM (V1.0)
 * CLASIFICACIÓN: CORE STATE (ESTRATO L1)
 * RESPONSABILIDAD: CASCADA DE ADMISIÓN Y CONTABILIDAD DE CRÉDITOS
 * =================================================================
 */

pub mod approval;
pub mod cascade;
pub mod errors;
pub mod ip;
pub mod reason;

pub use approval::ApprovalRegistry;
pub use cascade::{BatchCall, Decision, Gate};
pub use errors::GateError;
pub use reason::DenyReason;
