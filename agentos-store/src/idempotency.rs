//! Persisted idempotency records: `(tenant, key)` → request hash + cached
//! response, expiring after 24 hours.

use agentos_core::Result;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db_error;

#[derive(Debug, sqlx::FromRow)]
pub struct IdempotencyRow {
    pub request_hash: String,
    pub response: Value,
    pub expires_at: DateTime<Utc>,
}

pub async fn fetch(pool: &PgPool, tenant_id: Uuid, key: &str) -> Result<Option<IdempotencyRow>> {
    sqlx::query_as::<_, IdempotencyRow>(
        "SELECT request_hash, response, expires_at \
         FROM idempotency_keys WHERE tenant_id = $1 AND key = $2",
    )
    .bind(tenant_id)
    .bind(key)
    .fetch_optional(pool)
    .await
    .map_err(|e| db_error("fetch idempotency", e))
}

/// Store a record. On conflict nothing happens; concurrent retries must not
/// clobber the response the first writer cached.
pub async fn store(
    pool: &PgPool,
    tenant_id: Uuid,
    key: &str,
    request_hash: &str,
    response: &Value,
    expires_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO idempotency_keys (tenant_id, key, request_hash, response, expires_at) \
         VALUES ($1, $2, $3, $4, $5) \
         ON CONFLICT (tenant_id, key) DO NOTHING",
    )
    .bind(tenant_id)
    .bind(key)
    .bind(request_hash)
    .bind(response)
    .bind(expires_at)
    .execute(pool)
    .await
    .map_err(|e| db_error("store idempotency", e))?;
    Ok(())
}

/// Drop a single record, used when an expired row is encountered in-line.
pub async fn delete(pool: &PgPool, tenant_id: Uuid, key: &str) -> Result<()> {
    sqlx::query("DELETE FROM idempotency_keys WHERE tenant_id = $1 AND key = $2")
        .bind(tenant_id)
        .bind(key)
        .execute(pool)
        .await
        .map_err(|e| db_error("delete idempotency", e))?;
    Ok(())
}

/// Delete all expired records. Returns the number removed.
pub async fn sweep_expired(pool: &PgPool) -> Result<u64> {
    let result = sqlx::query("DELETE FROM idempotency_keys WHERE expires_at <= now()")
        .execute(pool)
        .await
        .map_err(|e| db_error("sweep idempotency", e))?;
    Ok(result.rows_affected())
}
