// [libs/domain/payments/src/lib.rs]
/*!
 * =================================================================
 * APARATO: PAYMENT INTAKE STRATUM (V1.0)
 * CLASIFICACIÓN: DOMAIN (ESTRATO L3)
 * RESPONSABILIDAD: VERIFICACIÓN DE WEBHOOKS STRIPE Y PROTOCOLO x402
 * =================================================================
 */

pub mod errors;
pub mod stripe;
pub mod x402;

pub use errors::PaymentError;
pub use stripe::{StripeOutcome, StripeWebhookHandler};
pub use x402::{
    build_payment_requirements, encode_payment_requirements, PaymentRequirements, X402Award,
    X402CountersSnapshot, X402Handler,
};
