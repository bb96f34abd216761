// [apps/gateway/src/main.rs]
/*!
 * Entry point: load environment, build the composition root, bind the
 * listener, spawn the background loops, serve.
 */

use paygate_gateway::config::GatewayConfig;
use paygate_gateway::routes::build_router;
use paygate_gateway::services::background;
use paygate_gateway::state::AppState;
use std::net::{IpAddr, SocketAddr};
use tokio::sync::watch;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    paygate_telemetry::init_tracing("paygate-gateway");

    let config = match GatewayConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "failed to load configuration");
            std::process::exit(1);
        }
    };

    let port = config.port;
    let feature_summary = config.feature_summary();

    let state = match AppState::new(config).await {
        Ok(state) => state,
        Err(err) => {
            error!(error = %err, "failed to initialize application state");
            std::process::exit(1);
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let background_handles = background::spawn_all(state.clone(), shutdown_rx);

    let router = build_router(state);
    let bind_address = SocketAddr::new("0.0.0.0".parse::<IpAddr>().unwrap(), port);

    let listener = match tokio::net::TcpListener::bind(bind_address).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(error = %err, %bind_address, "failed to bind listener");
            std::process::exit(1);
        }
    };

    info!("Listening on port {port} ({feature_summary})");

    let serve_result = axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await;

    let _ = shutdown_tx.send(true);
    for handle in background_handles {
        handle.abort();
    }

    if let Err(err) = serve_result {
        error!(error = %err, "server exited with error");
        std::process::exit(1);
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
