//! `/v1/*` memory handlers: thin JSON shells over the engine. PUT and
//! DELETE share the write path: charge the daily write quota, then the
//! idempotency protocol over a hash of the raw body (so equivalent payloads
//! share a hash), then the engine.

use agentos_auth::AuthContext;
use agentos_core::{AgentName, ApiError, TenantId};
use agentos_engine::{idempotency, GetOutcome, PutRequest};
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{ApiJson, AppError};
use crate::state::AppState;

fn parse_body<T: serde::de::DeserializeOwned>(raw: Value) -> Result<T, AppError> {
    serde_json::from_value(raw).map_err(|err| AppError(ApiError::Validation(err.to_string())))
}

/// Validated `Idempotency-Key` header, when present.
fn idempotency_key(headers: &HeaderMap) -> Result<Option<String>, AppError> {
    match headers.get("idempotency-key") {
        None => Ok(None),
        Some(value) => {
            let key = value.to_str().map_err(|_| ApiError::InvalidIdempotencyKey)?;
            idempotency::validate_key(key)?;
            Ok(Some(key.to_string()))
        }
    }
}

async fn replay_or_run<F, Fut>(
    state: &AppState,
    tenant_id: TenantId,
    headers: &HeaderMap,
    raw_body: &Value,
    write_bytes: i64,
    run: F,
) -> Result<Response, AppError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Value, AppError>>,
{
    // Pipeline order: the write quota is charged before the idempotency
    // lookup, so a replayed request is metered like any other write.
    state.quotas.record_write(tenant_id, write_bytes).await?;

    let key = idempotency_key(headers)?;
    if let Some(key) = &key {
        if let Some(cached) = state.idempotency.lookup(tenant_id, key, raw_body).await? {
            return Ok(Json(cached).into_response());
        }
    }

    let response = run().await?;
    if let Some(key) = &key {
        state.idempotency.store(tenant_id, key, raw_body, &response).await?;
    }
    Ok(Json(response).into_response())
}

#[derive(Deserialize)]
pub(super) struct PutBody {
    agent_id: AgentName,
    path: String,
    value: Value,
    ttl_seconds: Option<i64>,
    #[serde(default)]
    tags: Vec<String>,
    importance: Option<f64>,
    #[serde(default)]
    searchable: bool,
}

pub async fn put(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    ApiJson(raw): ApiJson<Value>,
) -> Result<Response, AppError> {
    let write_bytes = raw.get("value").map(|value| value.to_string().len() as i64).unwrap_or(0);
    replay_or_run(&state, ctx.tenant_id, &headers, &raw, write_bytes, || async {
        let body: PutBody = parse_body(raw.clone())?;
        let receipt = state
            .engine
            .put(
                ctx.tenant_id,
                PutRequest {
                    agent: body.agent_id,
                    path: body.path,
                    value: body.value,
                    ttl_seconds: body.ttl_seconds,
                    tags: body.tags,
                    importance: body.importance,
                    searchable: body.searchable,
                },
            )
            .await?;
        Ok(json!({
            "ok": true,
            "version_id": receipt.version_id,
            "created_at": receipt.created_at,
        }))
    })
    .await
}

#[derive(Deserialize)]
pub(super) struct PathBody {
    agent_id: AgentName,
    path: String,
}

pub async fn get(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    ApiJson(body): ApiJson<PathBody>,
) -> Result<Json<Value>, AppError> {
    let outcome = state.engine.get(ctx.tenant_id, &body.agent_id, &body.path).await?;
    Ok(Json(match outcome {
        GetOutcome::Miss => json!({ "found": false }),
        GetOutcome::Hit(view) => json!({
            "found": true,
            "path": view.path,
            "value": view.value,
            "version_id": view.version_id,
            "created_at": view.created_at,
            "expires_at": view.expires_at,
            "tags": view.tags,
        }),
    }))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    ApiJson(raw): ApiJson<Value>,
) -> Result<Response, AppError> {
    // A tombstone carries no value; it still counts as one write.
    replay_or_run(&state, ctx.tenant_id, &headers, &raw, 0, || async {
        let body: PathBody = parse_body(raw.clone())?;
        let receipt = state.engine.delete(ctx.tenant_id, &body.agent_id, &body.path).await?;
        Ok(json!({
            "ok": true,
            "deleted": true,
            "version_id": receipt.version_id,
            "created_at": receipt.created_at,
        }))
    })
    .await
}

#[derive(Deserialize)]
pub(super) struct HistoryBody {
    agent_id: AgentName,
    path: String,
    limit: Option<i64>,
}

pub async fn history(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    ApiJson(body): ApiJson<HistoryBody>,
) -> Result<Json<Value>, AppError> {
    let versions =
        state.engine.history(ctx.tenant_id, &body.agent_id, &body.path, body.limit).await?;
    Ok(Json(json!({ "versions": versions })))
}

#[derive(Deserialize)]
pub(super) struct ListBody {
    agent_id: AgentName,
    prefix: String,
}

pub async fn list(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    ApiJson(body): ApiJson<ListBody>,
) -> Result<Json<Value>, AppError> {
    let items = state.engine.list(ctx.tenant_id, &body.agent_id, &body.prefix).await?;
    Ok(Json(json!({ "items": items })))
}

#[derive(Deserialize)]
pub(super) struct GlobBody {
    agent_id: AgentName,
    pattern: String,
}

pub async fn glob(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    ApiJson(body): ApiJson<GlobBody>,
) -> Result<Json<Value>, AppError> {
    let paths = state.engine.glob(ctx.tenant_id, &body.agent_id, &body.pattern).await?;
    Ok(Json(json!({ "paths": paths })))
}

#[derive(Deserialize)]
pub(super) struct DumpBody {
    agent_id: AgentName,
    limit: Option<i64>,
}

pub async fn dump(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    ApiJson(body): ApiJson<DumpBody>,
) -> Result<Response, AppError> {
    let outcome = state.engine.dump(ctx.tenant_id, &body.agent_id, body.limit).await?;
    let body = json!({ "entries": outcome.entries, "count": outcome.entries.len() });

    let mut response = Json(body).into_response();
    let cache_state = if outcome.cache_hit { "HIT" } else { "MISS" };
    response.headers_mut().insert("X-Cache", HeaderValue::from_static(cache_state));
    Ok(response)
}

#[derive(Deserialize)]
pub(super) struct AgentsBody {}

pub async fn agents(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    ApiJson(_body): ApiJson<AgentsBody>,
) -> Result<Json<Value>, AppError> {
    let agents = state.engine.agents(ctx.tenant_id).await?;
    Ok(Json(json!({ "agents": agents })))
}
