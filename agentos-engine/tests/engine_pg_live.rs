//! Live engine contract tests against a real Postgres with pgvector.
//!
//! Run with a scratch database:
//!
//! ```text
//! DATABASE_URL=postgres://localhost/agentos_test cargo test -p agentos-engine -- --ignored
//! ```
//!
//! Each test uses a fresh tenant, so runs are isolated even on a shared
//! database.

use std::sync::Arc;
use std::time::Duration;

use agentos_core::{AgentName, TenantId};
use agentos_embed::worker::Outcome;
use agentos_embed::{EmbedWorker, MockEmbedder, WorkerConfig};
use agentos_engine::{
    GetOutcome, MemoryEngine, PutRequest, QuotaLimits, QuotaService, SearchOutcome, SearchRequest,
};
use agentos_store::PgPool;
use serde_json::json;

const ENV_DATABASE_URL: &str = "DATABASE_URL";

async fn setup() -> (PgPool, MemoryEngine, TenantId) {
    let url = std::env::var(ENV_DATABASE_URL)
        .unwrap_or_else(|_| panic!("{ENV_DATABASE_URL} is required for live engine tests"));
    let pool = agentos_store::connect_with_retry(&url, 5).await.expect("connect");
    agentos_store::run_migrations(&pool).await.expect("migrate");

    let tenant = TenantId::new();
    agentos_store::tenants::create(&pool, tenant.as_uuid(), "live-test").await.expect("tenant");

    let quotas = QuotaService::new(pool.clone(), QuotaLimits::default());
    let engine = MemoryEngine::new(pool.clone(), quotas, Some(Arc::new(MockEmbedder::new())));
    (pool, engine, tenant)
}

fn agent(name: &str) -> AgentName {
    AgentName::parse(name).expect("agent name")
}

fn put(path: &str, value: serde_json::Value) -> PutRequest {
    PutRequest {
        agent: agent("a"),
        path: path.to_string(),
        value,
        ttl_seconds: None,
        tags: Vec::new(),
        importance: None,
        searchable: false,
    }
}

#[tokio::test]
#[ignore = "requires Postgres with pgvector; run with --ignored"]
async fn test_put_get_history_latest_pointer() {
    let (_pool, engine, tenant) = setup().await;

    let v1 = engine.put(tenant, put("/x/y", json!({"n": 1}))).await.expect("put v1");
    let v2 = engine.put(tenant, put("/x/y", json!({"n": 2}))).await.expect("put v2");
    assert_ne!(v1.version_id, v2.version_id);

    match engine.get(tenant, &agent("a"), "/x/y").await.expect("get") {
        GetOutcome::Hit(view) => {
            assert_eq!(view.value, json!({"n": 2}));
            assert_eq!(view.version_id, v2.version_id);
        }
        GetOutcome::Miss => panic!("expected hit"),
    }

    let history = engine.history(tenant, &agent("a"), "/x/y", Some(10)).await.expect("history");
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].value, json!({"n": 2}));
    assert_eq!(history[1].value, json!({"n": 1}));
}

#[tokio::test]
#[ignore = "requires Postgres with pgvector; run with --ignored"]
async fn test_ttl_hides_expired_entries_but_history_keeps_them() {
    let (_pool, engine, tenant) = setup().await;

    let mut request = put("/ttl/e", json!({"v": true}));
    request.ttl_seconds = Some(1);
    engine.put(tenant, request).await.expect("put");

    match engine.get(tenant, &agent("a"), "/ttl/e").await.expect("get") {
        GetOutcome::Hit(_) => {}
        GetOutcome::Miss => panic!("fresh entry must be visible"),
    }

    tokio::time::sleep(Duration::from_millis(1500)).await;

    assert!(matches!(
        engine.get(tenant, &agent("a"), "/ttl/e").await.expect("get"),
        GetOutcome::Miss
    ));
    let history = engine.history(tenant, &agent("a"), "/ttl/e", None).await.expect("history");
    assert_eq!(history.len(), 1);
}

#[tokio::test]
#[ignore = "requires Postgres with pgvector; run with --ignored"]
async fn test_tombstone_shadowing_and_resurrection() {
    let (pool, engine, tenant) = setup().await;

    engine.put(tenant, put("/t/p", json!({"alive": 1}))).await.expect("put");
    engine.delete(tenant, &agent("a"), "/t/p").await.expect("delete");
    assert!(matches!(
        engine.get(tenant, &agent("a"), "/t/p").await.expect("get"),
        GetOutcome::Miss
    ));

    engine.put(tenant, put("/t/p", json!({"alive": 2}))).await.expect("put again");
    match engine.get(tenant, &agent("a"), "/t/p").await.expect("get") {
        GetOutcome::Hit(view) => assert_eq!(view.value, json!({"alive": 2})),
        GetOutcome::Miss => panic!("resurrected path must be visible"),
    }

    // The log is append-only: put + tombstone + put leave three versions.
    let versions = agentos_store::entries::count_versions(&pool, tenant.as_uuid(), "a", "/t/p")
        .await
        .expect("count");
    assert_eq!(versions, 3);
}

#[tokio::test]
#[ignore = "requires Postgres with pgvector; run with --ignored"]
async fn test_list_classifies_children() {
    let (_pool, engine, tenant) = setup().await;

    engine.put(tenant, put("/a", json!(1))).await.expect("put /a");
    engine.put(tenant, put("/b", json!(2))).await.expect("put /b");
    engine.put(tenant, put("/sub/c", json!(3))).await.expect("put /sub/c");

    let items = engine.list(tenant, &agent("a"), "/").await.expect("list");
    let mut paths: Vec<(String, String)> = items
        .iter()
        .map(|item| {
            let json = serde_json::to_value(item).unwrap();
            (
                json["path"].as_str().unwrap().to_string(),
                json["type"].as_str().unwrap().to_string(),
            )
        })
        .collect();
    paths.sort();
    assert_eq!(
        paths,
        vec![
            ("/a".to_string(), "file".to_string()),
            ("/b".to_string(), "file".to_string()),
            ("/sub".to_string(), "dir".to_string()),
        ]
    );
}

#[tokio::test]
#[ignore = "requires Postgres with pgvector; run with --ignored"]
async fn test_glob_double_star_matches_nested() {
    let (_pool, engine, tenant) = setup().await;

    engine.put(tenant, put("/glob/foo", json!(1))).await.expect("put");
    engine.put(tenant, put("/glob/bar", json!(2))).await.expect("put");
    engine.put(tenant, put("/glob/sub/baz", json!(3))).await.expect("put");

    let matched = engine.glob(tenant, &agent("a"), "/glob/**").await.expect("glob");
    assert!(matched.contains(&"/glob/foo".to_string()));
    assert!(matched.contains(&"/glob/bar".to_string()));
    assert!(matched.contains(&"/glob/sub/baz".to_string()));
}

#[tokio::test]
#[ignore = "requires Postgres with pgvector; run with --ignored"]
async fn test_like_metacharacters_in_prefix_stay_literal() {
    let (_pool, engine, tenant) = setup().await;

    engine.put(tenant, put("/weird%prefix/inside", json!(1))).await.expect("put");
    engine.put(tenant, put("/weirdXprefix/other", json!(2))).await.expect("put");

    let items = engine.list(tenant, &agent("a"), "/weird%prefix").await.expect("list");
    assert_eq!(items.len(), 1);
}

#[tokio::test]
#[ignore = "requires Postgres with pgvector; run with --ignored"]
async fn test_tenant_isolation() {
    let (pool, engine, tenant_a) = setup().await;
    let tenant_b = TenantId::new();
    agentos_store::tenants::create(&pool, tenant_b.as_uuid(), "other").await.expect("tenant b");

    engine.put(tenant_a, put("/shared/path", json!({"secret": 1}))).await.expect("put");

    assert!(matches!(
        engine.get(tenant_b, &agent("a"), "/shared/path").await.expect("get"),
        GetOutcome::Miss
    ));
    assert!(engine.list(tenant_b, &agent("a"), "/").await.expect("list").is_empty());
    assert!(engine.glob(tenant_b, &agent("a"), "/shared/**").await.expect("glob").is_empty());
}

#[tokio::test]
#[ignore = "requires Postgres with pgvector; run with --ignored"]
async fn test_dump_cache_hit_and_invalidation() {
    let (_pool, engine, tenant) = setup().await;

    engine.put(tenant, put("/d/one", json!(1))).await.expect("put");

    let first = engine.dump(tenant, &agent("a"), None).await.expect("dump");
    assert!(!first.cache_hit);
    let second = engine.dump(tenant, &agent("a"), None).await.expect("dump");
    assert!(second.cache_hit);

    engine.put(tenant, put("/d/two", json!(2))).await.expect("put invalidates");
    let third = engine.dump(tenant, &agent("a"), None).await.expect("dump");
    assert!(!third.cache_hit);
    assert_eq!(third.entries.len(), 2);
}

#[tokio::test]
#[ignore = "requires Postgres with pgvector; run with --ignored"]
async fn test_search_finds_searchable_entries() {
    let (_pool, engine, tenant) = setup().await;

    let mut request = put("/notes/rust", json!({"text": "ownership and borrowing"}));
    request.searchable = true;
    request.tags = vec!["lang".to_string()];
    engine.put(tenant, request).await.expect("put searchable");

    let outcome = engine
        .search(
            tenant,
            SearchRequest {
                agent: agent("a"),
                query: "ownership".to_string(),
                limit: None,
                path_prefix: Some("/notes".to_string()),
                tags_any: vec!["lang".to_string()],
            },
        )
        .await
        .expect("search");

    match outcome {
        SearchOutcome::Hits(hits) => {
            assert_eq!(hits.len(), 1);
            assert_eq!(hits[0].path, "/notes/rust");
            assert!(hits[0].similarity <= 1.0);
        }
        SearchOutcome::NotConfigured => panic!("embedder is configured"),
    }
}

#[tokio::test]
#[ignore = "requires Postgres with pgvector; run with --ignored"]
#[serial_test::serial]
async fn test_concurrent_workers_claim_each_job_once() {
    let (pool, engine, tenant) = setup().await;

    // The claim statement is global, so start from a drained queue.
    let drain = EmbedWorker::new(
        pool.clone(),
        Arc::new(MockEmbedder::new()),
        WorkerConfig::default(),
    );
    while drain.run_once().await.expect("drain") != Outcome::Idle {}

    // Queue exactly one job by writing a searchable entry with no inline
    // embedder on this engine.
    let quotas = QuotaService::new(pool.clone(), QuotaLimits::default());
    let queue_only = MemoryEngine::new(pool.clone(), quotas, None);
    let mut request = put("/jobs/solo", json!({"text": "embed me"}));
    request.searchable = true;
    let receipt = queue_only.put(tenant, request).await.expect("put");
    drop(engine);

    let embedder = Arc::new(MockEmbedder::new());
    let worker_a =
        EmbedWorker::new(pool.clone(), embedder.clone(), WorkerConfig::default());
    let worker_b =
        EmbedWorker::new(pool.clone(), embedder.clone(), WorkerConfig::default());

    let (a, b) = tokio::join!(worker_a.run_once(), worker_b.run_once());
    let outcomes = [a.expect("worker a"), b.expect("worker b")];
    let done = outcomes.iter().filter(|o| **o == Outcome::Done).count();
    let idle = outcomes.iter().filter(|o| **o == Outcome::Idle).count();
    assert_eq!(done, 1, "exactly one worker processes the job");
    assert_eq!(idle, 1, "the other worker finds nothing claimable");

    let job = agentos_store::jobs::fetch(&pool, receipt.version_id.as_uuid())
        .await
        .expect("fetch job")
        .expect("job exists");
    assert_eq!(job.status, "done");
    assert_eq!(job.attempts, 1);

    let embeddings =
        agentos_store::embeddings::count_for_version(&pool, receipt.version_id.as_uuid())
            .await
            .expect("count");
    assert_eq!(embeddings, 1);
}

#[tokio::test]
#[ignore = "requires Postgres with pgvector; run with --ignored"]
async fn test_idempotency_protocol() {
    let (pool, engine, tenant) = setup().await;
    let service = agentos_engine::IdempotencyService::new(pool.clone());

    let body = json!({"path": "/i", "value": {"a": 1}});
    assert!(service.lookup(tenant, "K", &body).await.expect("miss").is_none());

    let receipt = engine
        .put(
            tenant,
            PutRequest {
                agent: agent("a"),
                path: "/i".to_string(),
                value: json!({"a": 1}),
                ttl_seconds: None,
                tags: Vec::new(),
                importance: None,
                searchable: false,
            },
        )
        .await
        .expect("put");
    let response = json!({"ok": true, "version_id": receipt.version_id});
    service.store(tenant, "K", &body, &response).await.expect("store");

    // Same key, equivalent body (different key order) replays the response.
    let reordered = json!({"value": {"a": 1}, "path": "/i"});
    let cached = service.lookup(tenant, "K", &reordered).await.expect("hit");
    assert_eq!(cached, Some(response));

    // Same key, different body is a mismatch.
    let different = json!({"path": "/i", "value": {"a": 2}});
    assert!(matches!(
        service.lookup(tenant, "K", &different).await,
        Err(agentos_core::ApiError::IdempotencyKeyMismatch)
    ));
}
