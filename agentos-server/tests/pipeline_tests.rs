//! Pipeline tests that run without a database: the pool is lazy, and every
//! request below is rejected by a gate before any query executes.

use agentos_server::{app, AppState, ServerConfig};
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;

fn build_app(mutate: impl FnOnce(&mut ServerConfig)) -> Router {
    let mut config = ServerConfig::for_tests("postgres://localhost/agentos_unreachable");
    mutate(&mut config);
    let pool = PgPoolOptions::new()
        .connect_lazy(&config.database_url)
        .expect("lazy pool never connects eagerly");
    app(AppState::build(config, pool, None, None))
}

fn post(path: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .header("x-forwarded-for", "9.9.9.9")
        .body(Body::from(body.to_string()))
        .expect("request")
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

#[tokio::test]
async fn test_healthz() {
    let app = build_app(|_| {});
    let response = app
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"ok": true}));
}

#[tokio::test]
async fn test_missing_bearer_is_unauthorized_envelope() {
    let app = build_app(|_| {});
    let response =
        app.oneshot(post("/v1/get", json!({"agent_id": "a", "path": "/x"}))).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    assert!(body["error"]["message"].is_string());
}

#[tokio::test]
async fn test_malformed_bearer_is_unauthorized() {
    let app = build_app(|_| {});
    let mut request = post("/v1/get", json!({"agent_id": "a", "path": "/x"}));
    request.headers_mut().insert("authorization", "Bearer no-dot-in-here".parse().unwrap());
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_preauth_bucket_denies_after_limit() {
    let app = build_app(|config| config.preauth_rate_limit_per_minute = 2);

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(post("/v1/get", json!({"agent_id": "a", "path": "/x"})))
            .await
            .unwrap();
        // Denied by auth, not by the bucket.
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key("X-PreAuth-RateLimit-Limit"));
    }

    let response =
        app.oneshot(post("/v1/get", json!({"agent_id": "a", "path": "/x"}))).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key("retry-after"));
    assert_eq!(response.headers()["X-PreAuth-RateLimit-Remaining"], "0");
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "PREAUTH_RATE_LIMIT_EXCEEDED");
}

#[tokio::test]
async fn test_preauth_buckets_are_per_ip() {
    let app = build_app(|config| config.preauth_rate_limit_per_minute = 1);

    let first = app
        .clone()
        .oneshot(post("/v1/get", json!({"agent_id": "a", "path": "/x"})))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::UNAUTHORIZED);

    let mut other_ip = post("/v1/get", json!({"agent_id": "a", "path": "/x"}));
    other_ip.headers_mut().insert("x-forwarded-for", "8.8.8.8".parse().unwrap());
    let response = app.oneshot(other_ip).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "fresh IP gets a fresh bucket");
}

#[tokio::test]
async fn test_metrics_hidden_when_disabled() {
    let app = build_app(|_| {});
    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_key_requires_configured_token() {
    let app = build_app(|_| {});
    let response =
        app.oneshot(post("/v1/admin/create-key", json!({"token": "anything"}))).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_create_key_rejects_wrong_token() {
    let app = build_app(|config| config.admin_bootstrap_token = Some("right-token".to_string()));
    let response =
        app.oneshot(post("/v1/admin/create-key", json!({"token": "wrong-token"}))).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_bootstrap_rate_limit() {
    let app = build_app(|config| {
        config.admin_rate_limit_per_minute = 2;
        config.admin_bootstrap_token = Some("token".to_string());
    });

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(post("/v1/admin/create-key", json!({"token": "nope"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
    let response =
        app.oneshot(post("/v1/admin/create-key", json!({"token": "nope"}))).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "RATE_LIMIT_EXCEEDED");
}

#[tokio::test]
async fn test_malformed_json_is_validation_error() {
    let app = build_app(|_| {});
    let request = Request::builder()
        .method("POST")
        .uri("/v1/admin/create-key")
        .header("content-type", "application/json")
        .header("x-forwarded-for", "9.9.9.9")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}
