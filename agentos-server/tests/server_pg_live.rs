//! End-to-end pipeline tests against a live Postgres: bootstrap a key, then
//! drive the memory API through the full middleware stack.
//!
//! ```text
//! DATABASE_URL=postgres://localhost/agentos_test \
//!     cargo test -p agentos-server -- --ignored
//! ```

use agentos_server::{app, AppState, ServerConfig};
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

const ENV_DATABASE_URL: &str = "DATABASE_URL";
const BOOTSTRAP_TOKEN: &str = "live-test-bootstrap-token";

async fn build_live_app(mutate: impl FnOnce(&mut ServerConfig)) -> Router {
    let url = std::env::var(ENV_DATABASE_URL)
        .unwrap_or_else(|_| panic!("{ENV_DATABASE_URL} is required for live server tests"));
    let pool = agentos_store::connect_with_retry(&url, 5).await.expect("connect");
    agentos_store::run_migrations(&pool).await.expect("migrate");

    let mut config = ServerConfig::for_tests(url);
    config.admin_bootstrap_token = Some(BOOTSTRAP_TOKEN.to_string());
    mutate(&mut config);
    app(AppState::build(config, pool, None, None))
}

fn post(path: &str, bearer: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .header("x-forwarded-for", "9.9.9.9");
    if let Some(token) = bearer {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).expect("request")
}

async fn json_of(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

async fn bootstrap_key(app: &Router) -> String {
    let response = app
        .clone()
        .oneshot(post(
            "/v1/admin/create-key",
            None,
            json!({"token": BOOTSTRAP_TOKEN, "label": "live"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_of(response).await;
    body["api_key"].as_str().expect("api_key").to_string()
}

#[tokio::test]
#[ignore = "requires Postgres with pgvector; run with --ignored"]
async fn test_full_put_get_round_trip() {
    let app = build_live_app(|_| {}).await;
    let key = bootstrap_key(&app).await;

    let put = app
        .clone()
        .oneshot(post(
            "/v1/put",
            Some(&key),
            json!({"agent_id": "live", "path": "/e2e/x", "value": {"n": 1}}),
        ))
        .await
        .unwrap();
    assert_eq!(put.status(), StatusCode::OK);
    assert!(put.headers().contains_key("X-RateLimit-Remaining"));
    let put_body = json_of(put).await;
    assert_eq!(put_body["ok"], true);
    let version_id = put_body["version_id"].as_str().expect("version id").to_string();

    let get = app
        .oneshot(post("/v1/get", Some(&key), json!({"agent_id": "live", "path": "/e2e/x"})))
        .await
        .unwrap();
    assert_eq!(get.status(), StatusCode::OK);
    let get_body = json_of(get).await;
    assert_eq!(get_body["found"], true);
    assert_eq!(get_body["value"], json!({"n": 1}));
    assert_eq!(get_body["version_id"], version_id.as_str());
}

#[tokio::test]
#[ignore = "requires Postgres with pgvector; run with --ignored"]
async fn test_idempotent_put_replays_and_mismatches() {
    let app = build_live_app(|_| {}).await;
    let key = bootstrap_key(&app).await;

    let idem_key = format!("live-{}", uuid::Uuid::new_v4().simple());
    let body = json!({"agent_id": "live", "path": "/e2e/idem", "value": {"a": 1}});

    let mut first = post("/v1/put", Some(&key), body.clone());
    first.headers_mut().insert("idempotency-key", idem_key.parse().unwrap());
    let first = app.clone().oneshot(first).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let first_body = json_of(first).await;

    let mut second = post("/v1/put", Some(&key), body.clone());
    second.headers_mut().insert("idempotency-key", idem_key.parse().unwrap());
    let second = app.clone().oneshot(second).await.unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    let second_body = json_of(second).await;
    assert_eq!(first_body["version_id"], second_body["version_id"], "replayed verbatim");

    let mut third = post(
        "/v1/put",
        Some(&key),
        json!({"agent_id": "live", "path": "/e2e/idem", "value": {"a": 2}}),
    );
    third.headers_mut().insert("idempotency-key", idem_key.parse().unwrap());
    let third = app.oneshot(third).await.unwrap();
    assert_eq!(third.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let third_body = json_of(third).await;
    assert_eq!(third_body["error"]["code"], "IDEMPOTENCY_KEY_MISMATCH");
}

#[tokio::test]
#[ignore = "requires Postgres with pgvector; run with --ignored"]
async fn test_reserved_path_is_forbidden() {
    let app = build_live_app(|_| {}).await;
    let key = bootstrap_key(&app).await;

    let response = app
        .oneshot(post(
            "/v1/put",
            Some(&key),
            json!({"agent_id": "live", "path": "/sys/config", "value": {}}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = json_of(response).await;
    assert_eq!(body["error"]["code"], "RESERVED_PATH");
}

#[tokio::test]
#[ignore = "requires Postgres with pgvector; run with --ignored"]
async fn test_dump_cache_header_transitions() {
    let app = build_live_app(|_| {}).await;
    let key = bootstrap_key(&app).await;

    // A dedicated agent: any other write for it would invalidate the cache
    // between the two dump calls.
    let agent = format!("dump-{}", uuid::Uuid::new_v4().simple());
    app.clone()
        .oneshot(post(
            "/v1/put",
            Some(&key),
            json!({"agent_id": agent, "path": "/e2e/dump", "value": 1}),
        ))
        .await
        .unwrap();

    let miss = app
        .clone()
        .oneshot(post("/v1/dump", Some(&key), json!({"agent_id": agent})))
        .await
        .unwrap();
    assert_eq!(miss.headers()["X-Cache"], "MISS");

    let hit = app
        .oneshot(post("/v1/dump", Some(&key), json!({"agent_id": agent})))
        .await
        .unwrap();
    assert_eq!(hit.headers()["X-Cache"], "HIT");
}

#[tokio::test]
#[ignore = "requires Postgres with pgvector; run with --ignored"]
async fn test_write_quota_charges_idempotent_replays() {
    // Fresh tenant per bootstrap, so the day's counters start at zero.
    let app = build_live_app(|config| config.write_quota_per_day = 2).await;
    let key = bootstrap_key(&app).await;

    let idem_key = format!("quota-{}", uuid::Uuid::new_v4().simple());
    let body = json!({"agent_id": "live", "path": "/e2e/quota", "value": {"q": 1}});

    let mut first = post("/v1/put", Some(&key), body.clone());
    first.headers_mut().insert("idempotency-key", idem_key.parse().unwrap());
    assert_eq!(app.clone().oneshot(first).await.unwrap().status(), StatusCode::OK);

    // The replay returns the cached response but still counts as a write.
    let mut second = post("/v1/put", Some(&key), body.clone());
    second.headers_mut().insert("idempotency-key", idem_key.parse().unwrap());
    assert_eq!(app.clone().oneshot(second).await.unwrap().status(), StatusCode::OK);

    let mut third = post("/v1/put", Some(&key), body);
    third.headers_mut().insert("idempotency-key", idem_key.parse().unwrap());
    let third = app.oneshot(third).await.unwrap();
    assert_eq!(third.status(), StatusCode::TOO_MANY_REQUESTS);
    let third_body = json_of(third).await;
    assert_eq!(third_body["error"]["code"], "QUOTA_WRITES_PER_DAY");
}

#[tokio::test]
#[ignore = "requires Postgres with pgvector; run with --ignored"]
async fn test_write_quota_covers_deletes() {
    let app = build_live_app(|config| config.write_quota_per_day = 1).await;
    let key = bootstrap_key(&app).await;

    let delete = app
        .clone()
        .oneshot(post(
            "/v1/delete",
            Some(&key),
            json!({"agent_id": "live", "path": "/e2e/quota-del"}),
        ))
        .await
        .unwrap();
    assert_eq!(delete.status(), StatusCode::OK);

    let denied = app
        .oneshot(post(
            "/v1/delete",
            Some(&key),
            json!({"agent_id": "live", "path": "/e2e/quota-del"}),
        ))
        .await
        .unwrap();
    assert_eq!(denied.status(), StatusCode::TOO_MANY_REQUESTS);
    let body = json_of(denied).await;
    assert_eq!(body["error"]["code"], "QUOTA_WRITES_PER_DAY");
}

#[tokio::test]
#[ignore = "requires Postgres with pgvector; run with --ignored"]
async fn test_search_without_embedder_returns_note() {
    let app = build_live_app(|_| {}).await;
    let key = bootstrap_key(&app).await;

    let response = app
        .oneshot(post("/v1/search", Some(&key), json!({"agent_id": "live", "query": "anything"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_of(response).await;
    assert_eq!(body["results"], json!([]));
    assert!(body["note"].is_string());
}
