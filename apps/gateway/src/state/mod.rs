// [apps/gateway/src/state/mod.rs]
/*!
 * Composition root. Mirrors the teacher's `AppState` (`Clone` struct of
 * `Arc`-wrapped subsystem managers, built once by `AppState::new`) but
 * over PayGate's components instead of the orchestrator's mining
 * subsystems.
 */

pub mod webhook_filters;

use crate::config::GatewayConfig;
use paygate_credit_expiry::{CreditExpirationManager, ExpiryScanner};
use paygate_gate::Gate;
use paygate_keystore::KeyStore;
use paygate_metering::{GlobalQuotaDefaults, UsageMeter};
use paygate_payments::{StripeWebhookHandler, X402Handler};
use paygate_sync::DistributedSync;
use paygate_tasks::TaskManager;
use paygate_webhook::WebhookEmitter;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use webhook_filters::WebhookFilterStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub keystore: Arc<KeyStore>,
    pub gate: Arc<Gate>,
    pub usage_meter: Arc<UsageMeter>,
    pub task_manager: Arc<TaskManager>,
    pub expiry_scanner: Arc<ExpiryScanner>,
    pub credit_expiration: Arc<CreditExpirationManager>,
    pub sync: Option<Arc<AsyncMutex<DistributedSync>>>,
    pub webhook_emitter: Arc<WebhookEmitter>,
    pub stripe_handler: Arc<StripeWebhookHandler>,
    pub x402_handler: Arc<X402Handler>,
    pub backend_client: reqwest::Client,
    pub webhook_filters: Arc<WebhookFilterStore>,
}

impl AppState {
    /// Builds every subsystem from `config`. The distributed-sync mirror
    /// is only constructed (and connected) when a cache URL is configured;
    /// its absence is not an error (spec §4.7, "optional layer").
    pub async fn new(config: GatewayConfig) -> anyhow::Result<Self> {
        let config = Arc::new(config);

        let keystore = Arc::new(KeyStore::new(config.fingerprint_prefix.clone(), config.state_path.clone()));
        let usage_meter = Arc::new(UsageMeter::new(config.usage_meter_capacity));

        let quota_defaults = if config.quotas_enabled {
            GlobalQuotaDefaults {
                daily_call_limit: config.daily_call_limit,
                monthly_call_limit: config.monthly_call_limit,
                daily_credit_limit: config.daily_credit_limit,
                monthly_credit_limit: config.monthly_credit_limit,
            }
        } else {
            GlobalQuotaDefaults::default()
        };

        let sync = match &config.redis_url {
            Some(url) => {
                let mirror = DistributedSync::connect(url, config.fingerprint_prefix.clone(), keystore.clone(), config.sync_period).await?;
                Some(Arc::new(AsyncMutex::new(mirror)))
            }
            None => None,
        };

        let mut gate = Gate::new(keystore.clone(), usage_meter.clone(), quota_defaults);
        if let Some(sync) = &sync {
            gate = gate.with_distributed_sync(sync.clone());
        }
        let gate = Arc::new(gate);
        gate.set_shadow_mode(config.shadow_mode);

        let task_manager = Arc::new(TaskManager::new(config.task_max_tasks, config.task_timeout));
        let expiry_scanner = Arc::new(ExpiryScanner::new(config.expiry_warning_thresholds_secs.clone()));
        let credit_expiration = Arc::new(CreditExpirationManager::new());

        let webhook_emitter = Arc::new(WebhookEmitter::new(config.webhook_secret.clone()));
        let stripe_handler = Arc::new(StripeWebhookHandler::new(keystore.clone(), usage_meter.clone(), config.stripe_webhook_secret.clone()));
        let x402_handler = Arc::new(X402Handler::new(keystore.clone(), usage_meter.clone(), config.x402_facilitator_url.clone()));

        let backend_client = reqwest::Client::builder()
            .timeout(config.backend_timeout)
            .user_agent("PayGate-Backend-Client/1.0")
            .build()?;

        let webhook_filters = Arc::new(WebhookFilterStore::new());

        Ok(Self {
            config,
            keystore,
            gate,
            usage_meter,
            task_manager,
            expiry_scanner,
            credit_expiration,
            sync,
            webhook_emitter,
            stripe_handler,
            x402_handler,
            backend_client,
            webhook_filters,
        })
    }

    pub fn is_operational(&self) -> bool {
        true
    }
}
