// [libs/shared/telemetry/src/lib.rs]
/*!
 * =================================================================
 * APARATO: TELEMETRY BOOTSTRAP (V1.0)
 * CLASIFICACIÓN: SHARED UTILITY (ESTRATO L0)
 * RESPONSABILIDAD: INICIALIZACIÓN DE TRAZADO Y CAPTURA DE PÁNICOS
 *
 * Mirrors the dual-mode (human/JSON) subscriber setup and global panic
 * hook used across the PayGate binaries: readable logs under
 * `debug_assertions`, flattened JSON under release so the gateway's
 * output can be ingested by a log pipeline without a separate parser.
 * =================================================================
 */

use std::panic;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt as formatting_layer, EnvFilter};

/// Initializes the global `tracing` subscriber and panic hook for `service_name`.
///
/// Honors `RUST_LOG` if set; otherwise defaults noisy infrastructure crates
/// to `warn` and everything else to `debug` (debug builds) or `info`
/// (release builds).
///
/// # Panics
/// Panics if a global subscriber has already been installed.
pub fn init_tracing(service_name: &'static str) {
    let environmental_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "{service_name}={level},tower_http=warn,hyper=warn,redis=warn",
            level = if cfg!(debug_assertions) { "debug" } else { "info" }
        )
        .into()
    });

    if cfg!(debug_assertions) {
        tracing_subscriber::registry()
            .with(environmental_filter)
            .with(formatting_layer::layer().compact().with_target(false))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(environmental_filter)
            .with(formatting_layer::layer().json().flatten_event(true))
            .init();
    }

    panic::set_hook(Box::new(move |panic_info| {
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}:{}", loc.file(), loc.line(), loc.column()))
            .unwrap_or_else(|| "unknown".to_string());

        let payload = panic_info
            .payload()
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| panic_info.payload().downcast_ref::<String>().map(|s| s.as_str()))
            .unwrap_or("<non-string panic payload>");

        tracing::error!(
            target: "panic_monitor",
            service = service_name,
            location = %location,
            "thread panicked: {payload}"
        );
    }));

    tracing::info!("telemetry online for {service_name}");
}
