use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{Request, StatusCode};
use gacp_domain::idempotency::InMemoryIdempotencyStore;
use jsonwebtoken::{EncodingKey, Header, encode};
use serde::Serialize;
use serde_json::{Value, json};
use tower::ServiceExt;

use crate::routes;
use crate::state::AppState;
use gacp_infra::config::AppConfig;

#[derive(Serialize)]
struct Claims {
    sub: String,
    role: String,
    exp: usize,
}

fn test_config() -> AppConfig {
    AppConfig {
        app_env: "test".to_string(),
        port: 0,
        log_level: "info".to_string(),
        data_backend: "memory".to_string(),
        surreal_endpoint: "ws://127.0.0.1:8000".to_string(),
        surreal_ns: "gacp".to_string(),
        surreal_db: "certification".to_string(),
        surreal_user: "root".to_string(),
        surreal_pass: "root".to_string(),
        redis_url: "redis://127.0.0.1:6379".to_string(),
        jwt_secret: "test-secret".to_string(),
        auth_dev_bypass_enabled: false,
        event_queue_prefix: "gacp:events:test".to_string(),
        worker_poll_interval_ms: 1000,
        worker_backoff_base_ms: 1000,
        worker_backoff_max_ms: 60000,
    }
}

fn token(role: &str, sub: &str) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time")
        .as_secs();
    let claims = Claims {
        sub: sub.to_string(),
        role: role.to_string(),
        exp: (now + 3600) as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret("test-secret".as_bytes()),
    )
    .expect("token")
}

fn test_app() -> Router {
    let state = AppState::with_idempotency_store(
        test_config(),
        Arc::new(InMemoryIdempotencyStore::new("test")),
    );
    routes::router(state)
}

fn request(
    method: &str,
    uri: &str,
    bearer: Option<&str>,
    request_id: Option<&str>,
    body: Option<Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(bearer) = bearer {
        builder = builder.header(AUTHORIZATION, format!("Bearer {bearer}"));
    }
    if let Some(request_id) = request_id {
        builder = builder.header("x-request-id", request_id);
    }
    match body {
        Some(body) => builder
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    }
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

async fn create_application(app: &Router, farmer_token: &str) -> String {
    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/v1/applications",
            Some(farmer_token),
            Some("req-create"),
            Some(json!({
                "farm_name": "Huai Nam Dang Farm",
                "crop": "turmeric",
                "province": "Chiang Mai"
            })),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await;
    body["application_number"]
        .as_str()
        .expect("application_number")
        .to_string()
}

async fn transition(
    app: &Router,
    number: &str,
    bearer: &str,
    request_id: &str,
    body: Value,
) -> axum::response::Response {
    app.clone()
        .oneshot(request(
            "POST",
            &format!("/v1/applications/{number}/transitions"),
            Some(bearer),
            Some(request_id),
            Some(body),
        ))
        .await
        .expect("response")
}

fn payment_body(action: &str, phase: &str, amount: u64, reference: &str) -> Value {
    json!({
        "action": action,
        "payload": {
            "kind": "payment",
            "phase": phase,
            "amount_thb": amount,
            "reference": reference
        }
    })
}

#[tokio::test]
async fn health_is_public() {
    let app = test_app();
    let response = app
        .oneshot(request("GET", "/health", None, None, None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["backend"], "memory");
    assert_eq!(body["backend_healthy"], true);
}

#[tokio::test]
async fn application_routes_require_auth() {
    let app = test_app();
    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/v1/applications",
            None,
            Some("req-1"),
            Some(json!({"farm_name": "x", "crop": "y", "province": "z"})),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(request(
            "GET",
            "/v1/applications/GACP-2026-NOPE0001",
            None,
            None,
            None,
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn only_farmers_open_applications() {
    let app = test_app();
    let response = app
        .oneshot(request(
            "POST",
            "/v1/applications",
            Some(&token("reviewer", "rev-1")),
            Some("req-1"),
            Some(json!({"farm_name": "x", "crop": "y", "province": "z"})),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn farmer_creates_and_submits() {
    let app = test_app();
    let farmer = token("farmer", "farmer-1");
    let number = create_application(&app, &farmer).await;

    let response = transition(&app, &number, &farmer, "req-submit", json!({"action": "submit"}))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["state"], "submitted");
    assert_eq!(body["history"].as_array().expect("history").len(), 1);
}

#[tokio::test]
async fn unauthorized_role_gets_forbidden_transition() {
    let app = test_app();
    let farmer = token("farmer", "farmer-1");
    let number = create_application(&app, &farmer).await;

    let response = transition(
        &app,
        &number,
        &token("reviewer", "rev-1"),
        "req-submit",
        json!({"action": "submit"}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "forbidden_transition");
}

#[tokio::test]
async fn undefined_action_is_unprocessable() {
    let app = test_app();
    let farmer = token("farmer", "farmer-1");
    let number = create_application(&app, &farmer).await;

    let response = transition(
        &app,
        &number,
        &token("approver", "app-1"),
        "req-approve",
        json!({"action": "approve", "payload": {"kind": "approval"}}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "invalid_transition");

    // the draft is untouched
    let response = app
        .oneshot(request(
            "GET",
            &format!("/v1/applications/{number}"),
            Some(&farmer),
            None,
            None,
        ))
        .await
        .expect("response");
    let body = json_body(response).await;
    assert_eq!(body["state"], "draft");
}

#[tokio::test]
async fn replayed_request_id_does_not_transition_twice() {
    let app = test_app();
    let farmer = token("farmer", "farmer-1");
    let number = create_application(&app, &farmer).await;

    let first = transition(&app, &number, &farmer, "req-same", json!({"action": "submit"})).await;
    assert_eq!(first.status(), StatusCode::OK);
    let first_body = json_body(first).await;

    let replay = transition(&app, &number, &farmer, "req-same", json!({"action": "submit"})).await;
    assert_eq!(replay.status(), StatusCode::OK);
    let replay_body = json_body(replay).await;
    assert_eq!(first_body, replay_body);

    // a genuinely new request against the new state is still refused
    let second = transition(&app, &number, &farmer, "req-new", json!({"action": "submit"})).await;
    assert_eq!(second.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn stale_pinned_version_is_a_conflict() {
    let app = test_app();
    let farmer = token("farmer", "farmer-1");
    let number = create_application(&app, &farmer).await;

    let response = transition(
        &app,
        &number,
        &farmer,
        "req-1",
        json!({"action": "submit", "expected_version": 1}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = transition(
        &app,
        &number,
        &token("admin", "admin-1"),
        "req-2",
        json!({
            "action": "request_payment",
            "payload": {"kind": "payment", "phase": "one"},
            "expected_version": 1
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "conflict");
}

#[tokio::test]
async fn gateway_callback_settles_and_opens_review() {
    let app = test_app();
    let farmer = token("farmer", "farmer-1");
    let admin = token("admin", "admin-1");
    let system = token("system", "gateway");
    let number = create_application(&app, &farmer).await;

    transition(&app, &number, &farmer, "req-submit", json!({"action": "submit"})).await;
    let response = transition(
        &app,
        &number,
        &admin,
        "req-invoice",
        payment_body("request_payment", "one", 5_000, "pay-1"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/v1/payments/gateway-callback",
            Some(&system),
            Some("req-callback"),
            Some(json!({
                "application_number": number,
                "phase": "one",
                "amount_thb": 5_000,
                "reference": "pay-1",
                "status": "settled"
            })),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["state"], "document_review");
    assert_eq!(body["payments"][0]["status"], "completed");
}

#[tokio::test]
async fn unsettled_confirmation_fails_the_guard() {
    let app = test_app();
    let farmer = token("farmer", "farmer-1");
    let admin = token("admin", "admin-1");
    let system = token("system", "gateway");
    let number = create_application(&app, &farmer).await;

    transition(&app, &number, &farmer, "req-submit", json!({"action": "submit"})).await;
    transition(
        &app,
        &number,
        &admin,
        "req-invoice",
        payment_body("request_payment", "one", 5_000, "pay-1"),
    )
    .await;

    // confirmation straight through the transitions endpoint: no settlement
    // was recorded by the gateway, so the guard denies it
    let response = transition(
        &app,
        &number,
        &system,
        "req-confirm",
        payment_body("payment_confirmed", "one", 5_000, "pay-1"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "payment_not_settled");
}

#[tokio::test]
async fn gateway_callback_is_for_system_actors_only() {
    let app = test_app();
    let response = app
        .oneshot(request(
            "POST",
            "/v1/payments/gateway-callback",
            Some(&token("farmer", "farmer-1")),
            Some("req-cb"),
            Some(json!({
                "application_number": "GACP-2026-NOPE0001",
                "phase": "one",
                "amount_thb": 5_000,
                "reference": "pay-1",
                "status": "settled"
            })),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn work_queue_filters_by_state_for_staff() {
    let app = test_app();
    let farmer = token("farmer", "farmer-1");
    let reviewer = token("reviewer", "rev-1");
    let number = create_application(&app, &farmer).await;
    transition(&app, &number, &farmer, "req-submit", json!({"action": "submit"})).await;

    let response = app
        .clone()
        .oneshot(request(
            "GET",
            "/v1/applications?state=submitted",
            Some(&reviewer),
            None,
            None,
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let rows = body.as_array().expect("rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["application_number"], number.as_str());

    // farmers do not see the queue
    let response = app
        .clone()
        .oneshot(request(
            "GET",
            "/v1/applications?state=submitted",
            Some(&farmer),
            None,
            None,
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // unknown state filters are a validation error
    let response = app
        .oneshot(request(
            "GET",
            "/v1/applications?state=limbo",
            Some(&reviewer),
            None,
            None,
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn available_actions_depend_on_the_token_role() {
    let app = test_app();
    let farmer = token("farmer", "farmer-1");
    let number = create_application(&app, &farmer).await;
    transition(&app, &number, &farmer, "req-submit", json!({"action": "submit"})).await;

    let response = app
        .clone()
        .oneshot(request(
            "GET",
            &format!("/v1/applications/{number}/actions"),
            Some(&token("admin", "admin-1")),
            None,
            None,
        ))
        .await
        .expect("response");
    let body = json_body(response).await;
    assert_eq!(body["state"], "submitted");
    assert_eq!(body["actions"], json!(["request_payment"]));

    let response = app
        .oneshot(request(
            "GET",
            &format!("/v1/applications/{number}/actions"),
            Some(&farmer),
            None,
            None,
        ))
        .await
        .expect("response");
    let body = json_body(response).await;
    assert_eq!(body["actions"], json!([]));
}
