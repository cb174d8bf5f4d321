//! HTTP integration tests
//!
//! Each test drives the full router with `oneshot` over an in-memory store.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use keyward_api::create_router;
use keyward_api::testing::{TestApp, TokenWriteFailingDatabase};
use keyward_core::{Database, InMemoryDatabase, Role, UserStore};
use serde_json::{json, Value};
use tower::ServiceExt;

fn create_json_request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json");

    match body {
        Some(json_body) => builder
            .body(Body::from(serde_json::to_string(&json_body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn bearer_request(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

fn registration(email: &str) -> Value {
    json!({
        "email": email,
        "password": "secret",
        "first_name": "Ada",
        "last_name": "Lovelace"
    })
}

async fn register(app: &Router, email: &str) -> Value {
    let (status, json) = send(
        app,
        create_json_request("POST", "/api/auth/register", Some(registration(email))),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "register {email}: {json}");
    json
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health_check() {
    let app = create_router(TestApp::new().state);

    let (status, json) = send(
        &app,
        Request::builder().uri("/health").body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_readiness_check() {
    let app = create_router(TestApp::new().state);

    let (status, json) = send(
        &app,
        Request::builder().uri("/ready").body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ready"], true);
    assert_eq!(json["checks"]["backend"], "memory");
}

#[tokio::test]
async fn test_openapi_document_served() {
    let app = create_router(TestApp::new().state);

    let (status, json) = send(
        &app,
        Request::builder()
            .uri("/api-docs/openapi.json")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(json["paths"]["/api/auth/login"].is_object());
}

// =============================================================================
// Registration
// =============================================================================

#[tokio::test]
async fn test_register_returns_tokens() {
    let app = create_router(TestApp::new().state);
    let json = register(&app, "a@x.com").await;

    assert_eq!(json["token_type"], "Bearer");
    assert_eq!(json["expires_in"], 3_600_000);
    assert!(json["access_token"].is_string());
    assert!(json["refresh_token"].is_string());
}

#[tokio::test]
async fn test_register_validation_error() {
    let app = create_router(TestApp::new().state);

    let (status, json) = send(
        &app,
        create_json_request(
            "POST",
            "/api/auth/register",
            Some(json!({
                "email": "not-an-email",
                "password": "123",
                "first_name": "Ada",
                "last_name": "Lovelace"
            })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_duplicate_and_failed_registration_look_identical() {
    // Existing address
    let app = create_router(TestApp::new().state);
    register(&app, "a@x.com").await;
    let duplicate = send(
        &app,
        create_json_request("POST", "/api/auth/register", Some(registration("a@x.com"))),
    )
    .await;

    // Fresh address whose token write fails downstream
    let db = InMemoryDatabase::new();
    let failing = TestApp::with_database(db.clone(), Arc::new(TokenWriteFailingDatabase::new(db)));
    let failing_app = create_router(failing.state);
    let failed = send(
        &failing_app,
        create_json_request("POST", "/api/auth/register", Some(registration("new@x.com"))),
    )
    .await;

    assert_eq!(duplicate.0, StatusCode::ACCEPTED);
    assert_eq!(duplicate, failed);
    assert_eq!(failing.db.user_count().await, 0);
}

// =============================================================================
// Login, refresh, logout
// =============================================================================

#[tokio::test]
async fn test_login_invalid_credentials() {
    let app = create_router(TestApp::new().state);
    register(&app, "a@x.com").await;

    let wrong = send(
        &app,
        create_json_request(
            "POST",
            "/api/auth/login",
            Some(json!({"email": "a@x.com", "password": "wrong-password"})),
        ),
    )
    .await;
    let unknown = send(
        &app,
        create_json_request(
            "POST",
            "/api/auth/login",
            Some(json!({"email": "ghost@x.com", "password": "secret"})),
        ),
    )
    .await;

    assert_eq!(wrong.0, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong.1["code"], "INVALID_CREDENTIALS");
    assert_eq!(wrong, unknown);
}

#[tokio::test]
async fn test_login_refresh_logout_cycle() {
    let app = create_router(TestApp::new().state);
    register(&app, "a@x.com").await;

    let (status, login) = send(
        &app,
        create_json_request(
            "POST",
            "/api/auth/login",
            Some(json!({"email": "a@x.com", "password": "secret"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let refresh_token = login["refresh_token"].as_str().unwrap().to_string();

    let (status, refreshed) = send(
        &app,
        create_json_request(
            "POST",
            "/api/auth/refresh",
            Some(json!({"refresh_token": refresh_token})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(refreshed["refresh_token"], refresh_token.as_str());

    for _ in 0..2 {
        let (status, body) = send(
            &app,
            create_json_request(
                "POST",
                "/api/auth/logout",
                Some(json!({"refresh_token": refresh_token})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(body, Value::Null);
    }

    let (status, json) = send(
        &app,
        create_json_request(
            "POST",
            "/api/auth/refresh",
            Some(json!({"refresh_token": refresh_token})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "REFRESH_TOKEN_NOT_FOUND");
}

#[tokio::test]
async fn test_expired_refresh_token() {
    let test_app = TestApp::new();
    let clock = test_app.clock.clone();
    let app = create_router(test_app.state);

    let tokens = register(&app, "a@x.com").await;
    clock.advance(chrono::Duration::milliseconds(86_400_001));

    let (status, json) = send(
        &app,
        create_json_request(
            "POST",
            "/api/auth/refresh",
            Some(json!({"refresh_token": tokens["refresh_token"]})),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "REFRESH_TOKEN_EXPIRED");
}

// =============================================================================
// Bearer-protected routes
// =============================================================================

#[tokio::test]
async fn test_public_probe_needs_no_token() {
    let app = create_router(TestApp::new().state);

    let (status, json) = send(
        &app,
        Request::builder()
            .uri("/api/test/public")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(json["message"].is_string());
}

#[tokio::test]
async fn test_protected_routes_require_bearer() {
    let app = create_router(TestApp::new().state);

    let (status, json) = send(
        &app,
        Request::builder()
            .uri("/api/auth/me")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "MISSING_TOKEN");

    let (status, json) = send(&app, bearer_request("/api/test/protected", "garbage")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "INVALID_TOKEN");
}

#[tokio::test]
async fn test_me_returns_profile_without_password_hash() {
    let app = create_router(TestApp::new().state);
    let tokens = register(&app, "a@x.com").await;
    let access = tokens["access_token"].as_str().unwrap();

    let (status, json) = send(&app, bearer_request("/api/auth/me", access)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["email"], "a@x.com");
    assert_eq!(json["role"], "USER");
    assert!(json.get("password_hash").is_none());
}

#[tokio::test]
async fn test_admin_probe_requires_admin_role() {
    let test_app = TestApp::new();
    let db = test_app.db.clone();
    let app = create_router(test_app.state);

    let tokens = register(&app, "a@x.com").await;
    let access = tokens["access_token"].as_str().unwrap();

    let (status, json) = send(&app, bearer_request("/api/test/admin", access)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["code"], "FORBIDDEN");

    let (status, _) = send(&app, bearer_request("/api/test/protected", access)).await;
    assert_eq!(status, StatusCode::OK);

    // Roles are re-read from the store on every request
    let mut tx = db.begin().await.unwrap();
    let mut user = tx.find_by_email("a@x.com").await.unwrap().unwrap();
    drop(tx);
    user.role = Role::Admin;
    db.put_user(user).await;

    let (status, _) = send(&app, bearer_request("/api/test/admin", access)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_disabled_account_is_locked_out() {
    let test_app = TestApp::new();
    let db = test_app.db.clone();
    let app = create_router(test_app.state);

    let tokens = register(&app, "a@x.com").await;
    let access = tokens["access_token"].as_str().unwrap();

    let mut tx = db.begin().await.unwrap();
    let mut user = tx.find_by_email("a@x.com").await.unwrap().unwrap();
    drop(tx);
    user.enabled = false;
    db.put_user(user).await;

    let (status, json) = send(&app, bearer_request("/api/test/protected", access)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["code"], "ACCOUNT_DISABLED");

    let (status, json) = send(
        &app,
        create_json_request(
            "POST",
            "/api/auth/login",
            Some(json!({"email": "a@x.com", "password": "secret"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["code"], "ACCOUNT_DISABLED");
}

#[tokio::test]
async fn test_security_headers_on_api_responses() {
    let app = create_router(TestApp::new().state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/test/public")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(
        response.headers().get(header::CACHE_CONTROL).unwrap(),
        "no-store"
    );
}
