//! Administrative endpoints: key bootstrap and revocation (token
//! authenticated, so they work before any bearer key exists) and embedding
//! job requeue (bearer key with the `admin` scope).

use agentos_auth::AuthContext;
use agentos_core::{ApiError, Scope};
use agentos_store::jobs;
use axum::extract::State;
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{ApiJson, AppError};
use crate::observability::constant_time_eq;
use crate::state::AppState;

const REQUEUE_LIMIT_MAX: i64 = 1000;
const JOB_STATUSES: [&str; 5] = ["queued", "running", "succeeded", "failed", "done"];

/// Shared gate for the token-authenticated endpoints: one global bootstrap
/// rate window (there is no tenant to key on yet), then a constant-time
/// comparison against the configured admin token.
fn bootstrap_gate(state: &AppState, token: &str) -> Result<(), AppError> {
    let decision = state.windows.check(
        "bootstrap",
        "admin",
        state.config.admin_rate_limit_per_minute,
    );
    if !decision.allowed {
        metrics::counter!("agentos_rate_limit_denials_total", "scope" => "admin").increment(1);
        return Err(AppError(ApiError::RateLimited {
            retry_after_secs: decision.retry_after_secs,
        }));
    }

    let Some(expected) = &state.config.admin_bootstrap_token else {
        return Err(AppError(ApiError::Unauthorized));
    };
    if !constant_time_eq(token.as_bytes(), expected.as_bytes()) {
        return Err(AppError(ApiError::Unauthorized));
    }
    Ok(())
}

#[derive(Deserialize)]
pub(super) struct CreateKeyBody {
    token: String,
    label: Option<String>,
    tenant_id: Option<Uuid>,
}

pub async fn create_key(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CreateKeyBody>,
) -> Result<Json<Value>, AppError> {
    bootstrap_gate(&state, &body.token)?;

    let label = body.label.as_deref().unwrap_or("");
    let key =
        agentos_auth::create_api_key(&state.pool, body.tenant_id, label, &Scope::all()).await?;

    Ok(Json(json!({
        "ok": true,
        "api_key": key.token,
        "key_id": key.key_id,
        "tenant_id": key.tenant_id,
    })))
}

#[derive(Deserialize)]
pub(super) struct RevokeKeyBody {
    token: String,
    key_id: String,
}

/// Revoke an API key by its public id, dropping this instance's cached auth
/// entries for it.
pub async fn revoke_key(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<RevokeKeyBody>,
) -> Result<Json<Value>, AppError> {
    bootstrap_gate(&state, &body.token)?;

    let revoked = agentos_store::keys::revoke(&state.pool, &body.key_id).await?;
    state.authenticator.invalidate_key(&body.key_id);
    Ok(Json(json!({ "ok": true, "revoked": revoked })))
}

#[derive(Deserialize)]
pub(super) struct RequeueBody {
    status: String,
    limit: Option<i64>,
}

pub async fn requeue_jobs(
    State(state): State<AppState>,
    Extension(_ctx): Extension<AuthContext>,
    ApiJson(body): ApiJson<RequeueBody>,
) -> Result<Json<Value>, AppError> {
    if !JOB_STATUSES.contains(&body.status.as_str()) {
        return Err(AppError(ApiError::Validation(format!(
            "status must be one of {JOB_STATUSES:?}"
        ))));
    }
    if !state.engine.has_embedder() {
        // Requeued jobs would sit unprocessed; tell the operator why.
        return Err(AppError(ApiError::EmbeddingsNotConfigured));
    }
    let limit = body.limit.unwrap_or(REQUEUE_LIMIT_MAX).clamp(1, REQUEUE_LIMIT_MAX);

    let requeued = jobs::requeue_by_status(&state.pool, &body.status, limit).await?;
    tracing::info!(status = %body.status, requeued, "jobs requeued");
    Ok(Json(json!({ "ok": true, "requeued": requeued })))
}
