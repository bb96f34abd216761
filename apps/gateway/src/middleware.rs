// [apps/gateway/src/middleware.rs]
/*!
 * Admin-key guard, grounded on the teacher's `auth_guard` in
 * `apps/orchestrator/src/middleware.rs` (header comparison against a
 * configured secret). PayGate's admin surface uses a plain
 * `X-Admin-Key` header instead of a Bearer scheme.
 */

use crate::state::AppState;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde_json::json;

pub async fn admin_guard(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let provided = req.headers().get("x-admin-key").and_then(|v| v.to_str().ok()).unwrap_or("");

    if state.config.admin_key.is_empty() || provided != state.config.admin_key {
        return (StatusCode::UNAUTHORIZED, axum::Json(json!({ "error": "invalid or missing X-Admin-Key" }))).into_response();
    }

    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use axum::middleware::from_fn_with_state;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    async fn test_state(admin_key: &str) -> AppState {
        let mut config = GatewayConfig::from_env().unwrap_or_else(|_| panic!("env should parse"));
        config.admin_key = admin_key.to_string();
        config.state_path = None;
        config.redis_url = None;
        AppState::new(config).await.expect("state builds without redis")
    }

    #[tokio::test]
    async fn rejects_missing_or_wrong_admin_key() {
        let state = test_state("s3cret").await;
        let app = Router::new()
            .route("/admin/ping", get(|| async { "ok" }))
            .layer(from_fn_with_state(state.clone(), admin_guard))
            .with_state(state);

        let resp = app
            .clone()
            .oneshot(HttpRequest::builder().uri("/admin/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = app
            .oneshot(HttpRequest::builder().uri("/admin/ping").header("x-admin-key", "wrong").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn accepts_the_configured_admin_key() {
        let state = test_state("s3cret").await;
        let app = Router::new()
            .route("/admin/ping", get(|| async { "ok" }))
            .layer(from_fn_with_state(state.clone(), admin_guard))
            .with_state(state);

        let resp = app
            .oneshot(HttpRequest::builder().uri("/admin/ping").header("x-admin-key", "s3cret").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
