// [libs/shared/model/src/lib.rs]
/*!
 * =================================================================
 * APARATO: PAYGATE DOMAIN MODEL (V1.0)
 * CLASIFICACIÓN: SHARED DATA (ESTRATO L0)
 * RESPONSABILIDAD: ENTIDADES DE DOMINIO — LLAVES, USO, CRÉDITOS, TAREAS
 *
 * Single source of truth for the value objects that flow between the
 * KeyStore, the Gate, the metering stack, DistributedSync and the HTTP
 * boundary. Every type here is `Serialize`/`Deserialize` so it survives
 * the on-disk snapshot, the Redis mirror and the admin API unchanged.
 * =================================================================
 */

pub mod approval;
pub mod grant;
pub mod key;
pub mod task;
pub mod usage;

pub use approval::{ApprovalCondition, ApprovalRequest, ApprovalRequestStatus, ApprovalRule};
pub use grant::CreditGrant;
pub use key::{ApiKeyRecord, AutoTopup, KeyGroup, QuotaOverride, ToolPricing};
pub use task::{Task, TaskStatus};
pub use usage::UsageEvent;

/// Re-exported so downstream crates never need a direct `serde_json`
/// dependency just to name the opaque-JSON type used for tool arguments.
pub type JsonValue = serde_json::Value;
