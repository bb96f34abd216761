// [libs/core/credit-expiry/src/lib.rs]
/*!
 * =================================================================
 * APARATO: CREDIT EXPIRY STRATUM (V1.0)
 * CLASIFICACIÓN: CORE STATE (ESTRATO L1)
 * RESPONSABILIDAD: VIGÍA DE EXPIRACIÓN DE LLAVES Y CONCESIONES FIFO
 * =================================================================
 */

pub mod grants;
pub mod scanner;

pub use grants::{ConsumeOutcome, CreditExpirationManager, MAX_GRANTS_PER_KEY, MAX_TRACKED_KEYS};
pub use scanner::{ExpiryScanner, ExpiryWarning, MIN_TICK_PERIOD};
