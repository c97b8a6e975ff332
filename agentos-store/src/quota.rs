//! Per-tenant, per-UTC-day usage counters.
//!
//! Each increment is a single upsert that returns the new counter value, so
//! checking a limit is race-free: the caller compares the returned value to
//! the configured ceiling and fails the operation when it is above it.

use agentos_core::Result;
use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db_error;

/// Record one write of `bytes` serialized bytes; returns the day's write count.
pub async fn add_write(pool: &PgPool, tenant_id: Uuid, day: NaiveDate, bytes: i64) -> Result<i64> {
    sqlx::query_scalar::<_, i64>(
        "INSERT INTO quota_usage (tenant_id, day, writes, bytes) \
         VALUES ($1, $2, 1, $3) \
         ON CONFLICT (tenant_id, day) \
         DO UPDATE SET writes = quota_usage.writes + 1, bytes = quota_usage.bytes + $3 \
         RETURNING writes",
    )
    .bind(tenant_id)
    .bind(day)
    .bind(bytes)
    .fetch_one(pool)
    .await
    .map_err(|e| db_error("add write quota", e))
}

/// Record one search; returns the day's search count.
pub async fn add_search(pool: &PgPool, tenant_id: Uuid, day: NaiveDate) -> Result<i64> {
    sqlx::query_scalar::<_, i64>(
        "INSERT INTO quota_usage (tenant_id, day, searches) \
         VALUES ($1, $2, 1) \
         ON CONFLICT (tenant_id, day) \
         DO UPDATE SET searches = quota_usage.searches + 1 \
         RETURNING searches",
    )
    .bind(tenant_id)
    .bind(day)
    .fetch_one(pool)
    .await
    .map_err(|e| db_error("add search quota", e))
}

/// Record approximate embedding tokens; returns the day's token count.
pub async fn add_embed_tokens(
    pool: &PgPool,
    tenant_id: Uuid,
    day: NaiveDate,
    tokens: i64,
) -> Result<i64> {
    sqlx::query_scalar::<_, i64>(
        "INSERT INTO quota_usage (tenant_id, day, embed_tokens) \
         VALUES ($1, $2, $3) \
         ON CONFLICT (tenant_id, day) \
         DO UPDATE SET embed_tokens = quota_usage.embed_tokens + $3 \
         RETURNING embed_tokens",
    )
    .bind(tenant_id)
    .bind(day)
    .bind(tokens)
    .fetch_one(pool)
    .await
    .map_err(|e| db_error("add embed token quota", e))
}
