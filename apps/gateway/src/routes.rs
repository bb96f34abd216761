// [apps/gateway/src/routes.rs]
/*!
 * Top-level router (spec §6). Client routes are public (per-key auth
 * happens inside the handler, since `/balance` must 404 rather than 401
 * on an unknown key); every `/admin`-table route sits behind
 * `middleware::admin_guard`.
 */

use crate::handlers::{admin, client, payments};
use crate::middleware::admin_guard;
use crate::state::AppState;
use axum::http::{header, Method, StatusCode};
use axum::routing::{get, post};
use axum::{middleware, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use std::time::Duration;

const MAX_BODY_BYTES: usize = 1 << 20;

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, "x-api-key".parse().unwrap(), "x-admin-key".parse().unwrap()])
        .max_age(Duration::from_secs(3600));

    let admin_routes = Router::new()
        .route("/keys", post(admin::create_key).get(admin::list_keys))
        .route("/keys/revoke", post(admin::revoke_key))
        .route("/keys/suspend", post(admin::suspend_key))
        .route("/keys/resume", post(admin::resume_key))
        .route("/keys/clone", post(admin::clone_key))
        .route("/keys/rotate", post(admin::rotate_key))
        .route("/keys/acl", post(admin::set_acl))
        .route("/keys/expiry", post(admin::set_expiry))
        .route("/keys/ip", post(admin::set_ip_allowlist))
        .route("/keys/tags", post(admin::set_tags))
        .route("/keys/auto-topup", post(admin::set_auto_topup))
        .route("/keys/alias", post(admin::set_alias))
        .route("/topup", post(admin::topup))
        .route("/limits", post(admin::set_limits))
        .route("/usage", get(admin::usage))
        .route("/audit", get(admin::audit))
        .route("/stripe/webhook", post(payments::stripe_webhook))
        .route("/x402/verify", post(payments::x402_verify))
        .route("/webhooks/filters", get(admin::webhook_filters_list))
        .route("/webhooks/filters/update", post(admin::webhook_filters_update))
        .route("/admin/credit-allocation", get(admin::credit_allocation))
        .route("/admin/consumer-lifetime-value", get(admin::consumer_lifetime_value))
        .route("/admin/quotas", get(admin::quotas))
        .layer(middleware::from_fn_with_state(state.clone(), admin_guard));

    let client_routes = Router::new()
        .route("/mcp", post(client::mcp_handler))
        .route("/balance", get(client::balance_handler))
        .route("/dashboard", get(client::dashboard_handler));

    Router::new()
        .route("/healthz", get(|| async { (StatusCode::OK, "ok") }))
        .merge(admin_routes)
        .merge(client_routes)
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(cors)
        .with_state(state)
}
