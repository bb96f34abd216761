// [libs/infra/webhook/src/lib.rs]
/*!
 * =================================================================
 * APARATO: OUTBOUND WEBHOOK STRATUM (V1.0)
 * CLASIFICACIÓN: INFRA (ESTRATO L2)
 * RESPONSABILIDAD: GUARDIA SSRF, FIRMA HMAC Y ENTREGA CON DISYUNTOR
 * =================================================================
 */

pub mod circuit;
pub mod emitter;
pub mod errors;
pub mod signature;
pub mod ssrf;

pub use emitter::{DeliveryOutcome, WebhookEmitter};
pub use errors::WebhookError;
pub use ssrf::check_ssrf;
