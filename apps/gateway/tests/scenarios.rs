// [apps/gateway/tests/scenarios.rs]
//! End-to-end scenarios driven through the router with
//! `tower::ServiceExt::oneshot`, no bound socket required. Covers the
//! concrete lettered scenarios from spec §8 that are reachable through
//! the HTTP surface (the pure admission/FIFO/quota properties are
//! exercised closer to the metal in `libs/core/gate` and
//! `libs/core/keystore`).

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use paygate_gateway::config::GatewayConfig;
use paygate_gateway::routes::build_router;
use paygate_gateway::state::AppState;
use paygate_keystore::CreateKeyOptions;
use serde_json::{json, Value};
use tower::ServiceExt;

const ADMIN_KEY: &str = "test-admin-key";

async fn new_state() -> AppState {
    let mut config = GatewayConfig::from_env().expect("env parses with defaults");
    config.admin_key = ADMIN_KEY.to_string();
    config.state_path = None;
    config.redis_url = None;
    AppState::new(config).await.expect("state builds without redis")
}

fn app(state: AppState) -> axum::Router {
    build_router(state)
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), 1 << 20).await.expect("body readable");
    serde_json::from_slice(&bytes).expect("response body is JSON")
}

fn mcp_request(api_key: &str, method: &str, params: Value) -> Request<Body> {
    let payload = json!({ "jsonrpc": "2.0", "id": 1, "method": method, "params": params });
    Request::builder()
        .method("POST")
        .uri("/mcp")
        .header("content-type", "application/json")
        .header("x-api-key", api_key)
        .body(Body::from(payload.to_string()))
        .unwrap()
}

// Scenario A - happy path: 100 credits, three admits of the same tool at
// the default per-call price of 1 each leave 99, 98, 97.
#[tokio::test]
async fn scenario_a_happy_path_decrements_credits_in_order() {
    let state = new_state().await;
    let mut options = CreateKeyOptions::default();
    options.default_credits_per_call = 1;
    let record = state.keystore.create_key("alice", 100, options);
    let keystore = state.keystore.clone();
    let router = app(state);

    for (call_number, expected_remaining) in [99, 98, 97].into_iter().enumerate() {
        let response = router.clone().oneshot(mcp_request(&record.fingerprint, "search", json!({}))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert!(body.get("result").is_some(), "call {call_number} was denied: {body}");

        let current = keystore.get_key_raw(&record.fingerprint).unwrap();
        assert_eq!(current.credits, expected_remaining, "unexpected remaining credits after call {call_number}");
        assert_eq!(current.total_calls, (call_number + 1) as u64);
    }
}

// Scenario D - suspension blocks admission with a stable reason; resuming
// restores it without needing a new key.
#[tokio::test]
async fn scenario_d_suspend_then_resume() {
    let state = new_state().await;
    let record = state.keystore.create_key("bob", 50, CreateKeyOptions::default());
    state.keystore.suspend_key(&record.fingerprint);
    let router = app(state.clone());

    let response = router.clone().oneshot(mcp_request(&record.fingerprint, "search", json!({}))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], -32402);
    assert!(body["error"]["message"].as_str().unwrap().contains("key_suspended"));

    state.keystore.resume_key(&record.fingerprint);
    let response = router.oneshot(mcp_request(&record.fingerprint, "search", json!({}))).await.unwrap();
    let body = json_body(response).await;
    assert!(body.get("result").is_some(), "expected allowed admission after resume: {body}");
}

// Scenario E - shadow mode admits on an invalid key, annotates the reason,
// and never mutates any counters because there is no record to mutate.
#[tokio::test]
async fn scenario_e_shadow_mode_admits_unknown_keys() {
    let state = new_state().await;
    state.gate.set_shadow_mode(true);
    let router = app(state);

    let response = router.oneshot(mcp_request("sk_does_not_exist", "search", json!({}))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let result = &body["result"];
    assert!(result.get("remainingCredits").is_some() || body.get("result").is_some(), "expected an admitted response: {body}");
}

#[tokio::test]
async fn mcp_rejects_non_json_content_type() {
    let state = new_state().await;
    let router = app(state);

    let request = Request::builder()
        .method("POST")
        .uri("/mcp")
        .header("content-type", "text/plain")
        .body(Body::from("not json"))
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn mcp_rejects_wrong_jsonrpc_version() {
    let state = new_state().await;
    let router = app(state);

    let payload = json!({ "jsonrpc": "1.0", "id": 1, "method": "search", "params": {} });
    let request = Request::builder()
        .method("POST")
        .uri("/mcp")
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], -32600);
}

#[tokio::test]
async fn balance_returns_404_for_unknown_key_never_401() {
    let state = new_state().await;
    let router = app(state);

    let request = Request::builder().uri("/balance").header("x-api-key", "sk_missing").body(Body::empty()).unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn balance_omits_fingerprint_from_body() {
    let state = new_state().await;
    let record = state.keystore.create_key("carol", 10, CreateKeyOptions::default());
    let router = app(state);

    let request = Request::builder().uri("/balance").header("x-api-key", &record.fingerprint).body(Body::empty()).unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["credits"], 10);
    assert!(body.get("fingerprint").is_none());
}

#[tokio::test]
async fn admin_routes_require_the_configured_admin_key() {
    let state = new_state().await;
    let router = app(state);

    let request = Request::builder().method("POST").uri("/keys").header("content-type", "application/json").body(Body::from(json!({"name": "dave"}).to_string())).unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .method("POST")
        .uri("/keys")
        .header("content-type", "application/json")
        .header("x-admin-key", ADMIN_KEY)
        .body(Body::from(json!({"name": "dave", "credits": 5}).to_string()))
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn dashboard_escapes_html_and_sets_no_cache() {
    let state = new_state().await;
    let router = app(state);

    let response = router.oneshot(Request::builder().uri("/dashboard").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("cache-control").unwrap(), "no-cache");
    let bytes = to_bytes(response.into_body(), 1 << 20).await.unwrap();
    let html = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(!html.contains("<script>"));
}

// Scenario J - batch-adjacent atomicity check: a call priced above the
// remaining balance denies cleanly and leaves the balance untouched.
#[tokio::test]
async fn admission_denial_leaves_balance_untouched() {
    let state = new_state().await;
    let mut options = CreateKeyOptions::default();
    options.default_credits_per_call = 10;
    let record = state.keystore.create_key("erin", 5, options);
    let router = app(state.clone());

    let response = router.oneshot(mcp_request(&record.fingerprint, "search", json!({}))).await.unwrap();
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], -32402);

    let record = state.keystore.get_key_raw(&record.fingerprint).unwrap();
    assert_eq!(record.credits, 5);
}

