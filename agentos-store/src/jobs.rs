//! Embedding job queue.
//!
//! State machine: `queued → running` on claim, then `done` (or `succeeded`,
//! treated identically) on success, back to `queued` for retry, or terminal
//! `failed` once attempts are exhausted. The claim is a single statement
//! using `FOR UPDATE SKIP LOCKED`, so concurrent workers can never claim the
//! same row in the same attempt.

use agentos_core::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::db_error;

/// Attempts after which a job becomes terminally `failed`.
pub const MAX_ATTEMPTS: i32 = 5;

/// Queue (or re-queue) the embedding job for a version. A previous terminal
/// state is overwritten; a fresh PUT wants a fresh embedding.
pub async fn enqueue(
    pool: &PgPool,
    version_id: Uuid,
    tenant_id: Uuid,
    last_error: Option<&str>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO embedding_jobs (version_id, tenant_id, status, attempts, last_error) \
         VALUES ($1, $2, 'queued', 0, $3) \
         ON CONFLICT (version_id) \
         DO UPDATE SET status = 'queued', attempts = 0, last_error = EXCLUDED.last_error, \
                       updated_at = now()",
    )
    .bind(version_id)
    .bind(tenant_id)
    .bind(last_error)
    .execute(pool)
    .await
    .map_err(|e| db_error("enqueue job", e))?;
    Ok(())
}

/// Record that a version was embedded inline during PUT.
pub async fn record_done(pool: &PgPool, version_id: Uuid, tenant_id: Uuid) -> Result<()> {
    sqlx::query(
        "INSERT INTO embedding_jobs (version_id, tenant_id, status, attempts) \
         VALUES ($1, $2, 'done', 1) \
         ON CONFLICT (version_id) \
         DO UPDATE SET status = 'done', last_error = NULL, updated_at = now()",
    )
    .bind(version_id)
    .bind(tenant_id)
    .execute(pool)
    .await
    .map_err(|e| db_error("record inline embed", e))?;
    Ok(())
}

#[derive(Debug, sqlx::FromRow)]
pub struct ClaimedJob {
    pub version_id: Uuid,
    pub tenant_id: Uuid,
    pub attempts: i32,
}

/// Atomically claim the oldest queued job, flipping it to `running` and
/// incrementing `attempts`. Returns `None` when nothing is claimable.
pub async fn claim_next(pool: &PgPool) -> Result<Option<ClaimedJob>> {
    sqlx::query_as::<_, ClaimedJob>(
        "WITH next_job AS ( \
             SELECT version_id FROM embedding_jobs \
             WHERE status = 'queued' AND attempts < $1 \
             ORDER BY created_at ASC \
             FOR UPDATE SKIP LOCKED \
             LIMIT 1 \
         ) \
         UPDATE embedding_jobs j \
         SET status = 'running', attempts = j.attempts + 1, updated_at = now() \
         FROM next_job \
         WHERE j.version_id = next_job.version_id \
         RETURNING j.version_id, j.tenant_id, j.attempts",
    )
    .bind(MAX_ATTEMPTS)
    .fetch_optional(pool)
    .await
    .map_err(|e| db_error("claim job", e))
}

/// Mark a job successfully completed.
pub async fn mark_done(pool: &PgPool, version_id: Uuid) -> Result<()> {
    sqlx::query(
        "UPDATE embedding_jobs \
         SET status = 'done', last_error = NULL, updated_at = now() \
         WHERE version_id = $1",
    )
    .bind(version_id)
    .execute(pool)
    .await
    .map_err(|e| db_error("mark job done", e))?;
    Ok(())
}

/// Return a job to the queue for another attempt.
pub async fn release_for_retry(pool: &PgPool, version_id: Uuid, last_error: &str) -> Result<()> {
    sqlx::query(
        "UPDATE embedding_jobs \
         SET status = 'queued', last_error = $2, updated_at = now() \
         WHERE version_id = $1",
    )
    .bind(version_id)
    .bind(last_error)
    .execute(pool)
    .await
    .map_err(|e| db_error("release job", e))?;
    Ok(())
}

/// Mark a job terminally failed.
pub async fn mark_failed(pool: &PgPool, version_id: Uuid, last_error: &str) -> Result<()> {
    sqlx::query(
        "UPDATE embedding_jobs \
         SET status = 'failed', last_error = $2, updated_at = now() \
         WHERE version_id = $1",
    )
    .bind(version_id)
    .bind(last_error)
    .execute(pool)
    .await
    .map_err(|e| db_error("mark job failed", e))?;
    Ok(())
}

/// Admin operation: reset jobs in the given status back to `queued`.
/// Returns the number of rows reset.
pub async fn requeue_by_status(pool: &PgPool, status: &str, limit: i64) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE embedding_jobs \
         SET status = 'queued', attempts = 0, updated_at = now() \
         WHERE version_id IN ( \
             SELECT version_id FROM embedding_jobs \
             WHERE status = $1 \
             ORDER BY updated_at ASC \
             LIMIT $2 \
         )",
    )
    .bind(status)
    .bind(limit)
    .execute(pool)
    .await
    .map_err(|e| db_error("requeue jobs", e))?;
    Ok(result.rows_affected())
}

#[derive(Debug, sqlx::FromRow)]
pub struct JobRow {
    pub version_id: Uuid,
    pub tenant_id: Uuid,
    pub status: String,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Load one job row (admin and test tooling).
pub async fn fetch(pool: &PgPool, version_id: Uuid) -> Result<Option<JobRow>> {
    sqlx::query_as::<_, JobRow>(
        "SELECT version_id, tenant_id, status, attempts, last_error, updated_at \
         FROM embedding_jobs WHERE version_id = $1",
    )
    .bind(version_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| db_error("fetch job", e))
}
