// [libs/core/metering/src/lib.rs]
/*!
 * =================================================================
 * APARATO: METERING STRATUM (V1.0)
 * CLASIFICACIÓN: CORE STATE (ESTRATO L1)
 * RESPONSABILIDAD: VENTANAS DE TASA, RESOLUCIÓN DE CUOTA Y MEDIDOR DE USO
 * =================================================================
 */

pub mod quota;
pub mod rate_limiter;
pub mod usage_meter;

pub use quota::{EffectiveQuota, GlobalQuotaDefaults, QuotaDimension};
pub use rate_limiter::{RateLimitOutcome, RateLimiter};
pub use usage_meter::{ToolSummary, UsageMeter, UsageQuery, UsageSummary};
