// [apps/gateway/src/services/background.rs]
/*!
 * Background loop wiring (spec §5/§9): ExpiryScanner tick, DistributedSync
 * refresh + event subscriber, TaskManager sweep. Each mirrors the
 * teacher's `services::reaper::spawn_reaper` shape verbatim: tick, do
 * bounded work, log only if something happened. All are torn down by
 * the shared shutdown watch channel.
 */

use crate::state::AppState;
use chrono::Utc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

const TASK_SWEEP_PERIOD: Duration = Duration::from_secs(60);
const EXPIRY_SCAN_PERIOD: Duration = Duration::from_secs(60);

pub fn spawn_all(state: AppState, shutdown_rx: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();

    if state.config.expiry_scanner_enabled {
        handles.push(spawn_expiry_scanner(state.clone(), shutdown_rx.clone()));
    }
    handles.push(spawn_task_sweep(state.clone(), shutdown_rx.clone()));

    if let Some(sync) = state.sync.clone() {
        handles.push(spawn_sync_refresh(sync, state.config.sync_period, shutdown_rx.clone()));
    }

    if let Some(redis_url) = state.config.redis_url.clone() {
        handles.push(spawn_sync_subscriber(
            redis_url,
            state.config.fingerprint_prefix.clone(),
            state.keystore.clone(),
            state.config.sync_period,
            shutdown_rx,
        ));
    }

    handles
}

fn spawn_expiry_scanner(state: AppState, mut shutdown_rx: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(EXPIRY_SCAN_PERIOD);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = Utc::now();
                    let mut warnings = 0;
                    state.expiry_scanner.tick(&state.keystore, now, |warning| {
                        warnings += 1;
                        info!(key_prefix = %warning.key_prefix, threshold_secs = warning.threshold_secs, "credit expiry warning");
                    });
                    if warnings > 0 {
                        info!(warnings, "expiry scanner tick emitted warnings");
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
    })
}

fn spawn_task_sweep(state: AppState, mut shutdown_rx: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(TASK_SWEEP_PERIOD);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let timed_out = state.task_manager.sweep_timeouts();
                    let evicted = state.task_manager.evict_if_needed();
                    if timed_out > 0 || evicted > 0 {
                        info!(timed_out, evicted, "task manager sweep");
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
    })
}

fn spawn_sync_refresh(
    sync: std::sync::Arc<tokio::sync::Mutex<paygate_sync::DistributedSync>>,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let mut guard = sync.lock().await;
                    if let Err(err) = guard.refresh_tick().await {
                        warn!(error = %err, "distributed sync refresh failed");
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
    })
}

/// Runs on its own dedicated Redis connection rather than sharing the
/// `AppState::sync` handle: a subscriber connection blocks on `PSUBSCRIBE`
/// for its entire lifetime, and redis connections are cheap, so giving it
/// an exclusive `DistributedSync` avoids starving the refresh loop and the
/// Gate's atomic-debit path of the shared mirror's connection.
fn spawn_sync_subscriber(
    redis_url: String,
    prefix: String,
    keystore: std::sync::Arc<paygate_keystore::KeyStore>,
    sync_period: Duration,
    shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        match paygate_sync::DistributedSync::connect(&redis_url, prefix, keystore, sync_period).await {
            Ok(mut subscriber_sync) => {
                if let Err(err) = subscriber_sync.run_event_subscriber(shutdown_rx).await {
                    warn!(error = %err, "distributed sync event subscriber exited");
                }
            }
            Err(err) => warn!(error = %err, "failed to open dedicated subscriber connection"),
        }
    })
}
