// [apps/gateway/src/config.rs]
/*!
 * Centralizes the environment-variable surface named in spec §6. The
 * teacher's `main.rs` reads `DATABASE_URL`/`PORT`/`TURSO_AUTH_TOKEN`
 * inline at startup; PayGate has enough toggles that they're lifted
 * into one struct instead.
 */

use std::env;
use std::path::PathBuf;
use std::time::Duration;

const ENV_PREFIX: &str = "PAYGATE";

fn env_var(suffix: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}_{suffix}")).ok().filter(|v| !v.is_empty())
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub port: u16,
    pub admin_key: String,
    pub fingerprint_prefix: String,
    pub state_path: Option<PathBuf>,
    pub redis_url: Option<String>,
    pub sync_period: Duration,

    pub shadow_mode: bool,
    pub webhooks_enabled: bool,
    pub quotas_enabled: bool,
    pub expiry_scanner_enabled: bool,
    pub refund_on_failure: bool,

    pub global_rate_limit_per_min: u32,
    pub daily_call_limit: u64,
    pub monthly_call_limit: u64,
    pub daily_credit_limit: i64,
    pub monthly_credit_limit: i64,

    pub expiry_warning_thresholds_secs: Vec<i64>,

    pub usage_meter_capacity: usize,
    pub task_max_tasks: usize,
    pub task_timeout: Duration,

    pub webhook_secret: String,
    pub backend_url: Option<String>,
    pub backend_timeout: Duration,

    pub stripe_webhook_secret: String,
    pub x402_facilitator_url: String,
    pub x402_network: String,
    pub x402_asset: String,
    pub x402_recipient: String,
    pub credits_per_dollar: f64,
}

impl GatewayConfig {
    /// Reads every `PAYGATE_*` variable, falling back to documented
    /// defaults. Never panics on a missing optional value; only the
    /// startup-fatal cases (malformed `_PORT`) return an error.
    pub fn from_env() -> anyhow::Result<Self> {
        let port = env_var("PORT").map(|v| v.parse::<u16>()).transpose()?.unwrap_or(8787);

        let admin_key = env_var("ADMIN_KEY").unwrap_or_else(|| {
            tracing::warn!("PAYGATE_ADMIN_KEY not set; admin surface is unreachable until configured");
            String::new()
        });

        Ok(Self {
            port,
            admin_key,
            fingerprint_prefix: env_var("FINGERPRINT_PREFIX").unwrap_or_else(|| "pg_live".to_string()),
            state_path: env_var("STATE_PATH").map(PathBuf::from),
            redis_url: env_var("REDIS_URL"),
            sync_period: Duration::from_secs(env_var("SYNC_PERIOD_SECS").and_then(|v| v.parse().ok()).unwrap_or(5)),

            shadow_mode: env_flag("SHADOW_MODE", false),
            webhooks_enabled: env_flag("WEBHOOKS", false),
            quotas_enabled: env_flag("QUOTAS", true),
            expiry_scanner_enabled: env_flag("EXPIRY_SCANNER", true),
            refund_on_failure: env_flag("REFUND_ON_FAILURE", true),

            global_rate_limit_per_min: env_var("GLOBAL_RATE_LIMIT_PER_MIN").and_then(|v| v.parse().ok()).unwrap_or(0),
            daily_call_limit: env_var("DAILY_CALL_LIMIT").and_then(|v| v.parse().ok()).unwrap_or(0),
            monthly_call_limit: env_var("MONTHLY_CALL_LIMIT").and_then(|v| v.parse().ok()).unwrap_or(0),
            daily_credit_limit: env_var("DAILY_CREDIT_LIMIT").and_then(|v| v.parse().ok()).unwrap_or(0),
            monthly_credit_limit: env_var("MONTHLY_CREDIT_LIMIT").and_then(|v| v.parse().ok()).unwrap_or(0),

            expiry_warning_thresholds_secs: vec![86_400 * 7, 86_400, 3_600],

            usage_meter_capacity: env_var("USAGE_METER_CAPACITY").and_then(|v| v.parse().ok()).unwrap_or(100_000),
            task_max_tasks: env_var("TASK_MAX_TASKS").and_then(|v| v.parse().ok()).unwrap_or(10_000),
            task_timeout: Duration::from_secs(env_var("TASK_TIMEOUT_SECS").and_then(|v| v.parse().ok()).unwrap_or(300)),

            webhook_secret: env_var("WEBHOOK_SECRET").unwrap_or_default(),
            backend_url: env_var("BACKEND_URL"),
            backend_timeout: Duration::from_secs(env_var("BACKEND_TIMEOUT_SECS").and_then(|v| v.parse().ok()).unwrap_or(30)),

            stripe_webhook_secret: env_var("STRIPE_WEBHOOK_SECRET").unwrap_or_default(),
            x402_facilitator_url: env_var("X402_FACILITATOR_URL").unwrap_or_else(|| "https://facilitator.example/verify".to_string()),
            x402_network: env_var("X402_NETWORK").unwrap_or_else(|| "base".to_string()),
            x402_asset: env_var("X402_ASSET").unwrap_or_else(|| "usdc".to_string()),
            x402_recipient: env_var("X402_RECIPIENT").unwrap_or_default(),
            credits_per_dollar: env_var("CREDITS_PER_DOLLAR").and_then(|v| v.parse().ok()).unwrap_or(100.0),
        })
    }

    /// Feature-flag summary printed at startup (spec §6).
    pub fn feature_summary(&self) -> String {
        let mut flags = Vec::new();
        if self.shadow_mode {
            flags.push("shadow-mode");
        }
        if self.webhooks_enabled {
            flags.push("webhooks");
        }
        if self.quotas_enabled {
            flags.push("quotas");
        }
        if self.expiry_scanner_enabled {
            flags.push("expiry-scanner");
        }
        if self.redis_url.is_some() {
            flags.push("distributed-sync");
        }
        if flags.is_empty() {
            "none".to_string()
        } else {
            flags.join(",")
        }
    }
}

fn env_flag(suffix: &str, default: bool) -> bool {
    match env_var(suffix) {
        Some(v) => matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_summary_lists_only_enabled_flags() {
        let mut config = GatewayConfig::from_env().unwrap();
        config.shadow_mode = true;
        config.webhooks_enabled = false;
        config.quotas_enabled = false;
        config.expiry_scanner_enabled = false;
        config.redis_url = None;
        assert_eq!(config.feature_summary(), "shadow-mode");
    }

    #[test]
    fn feature_summary_handles_nothing_enabled() {
        let mut config = GatewayConfig::from_env().unwrap();
        config.shadow_mode = false;
        config.webhooks_enabled = false;
        config.quotas_enabled = false;
        config.expiry_scanner_enabled = false;
        config.redis_url = None;
        assert_eq!(config.feature_summary(), "none");
    }
}
