//! Entry versions and the latest pointer.
//!
//! Version rows are append-only. The latest pointer for a triple is upserted
//! in the same transaction as the version insert, so readers joining through
//! `entries` always observe a consistent pair.

use agentos_core::Result;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db_error;

/// Visibility filter shared by every read that returns live data: tombstones
/// and expired versions are hidden, history excepted.
const VISIBLE: &str = "v.deleted_at IS NULL AND (v.expires_at IS NULL OR v.expires_at > now())";

/// One new version row, tombstones included.
#[derive(Debug)]
pub struct NewVersion<'a> {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub agent_id: &'a str,
    pub path: &'a str,
    pub value: &'a Value,
    pub tags: &'a [String],
    pub importance: f64,
    pub searchable: bool,
    pub content_hash: &'a str,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Insert a version and move the latest pointer to it, atomically.
pub async fn insert_version(pool: &PgPool, version: &NewVersion<'_>) -> Result<()> {
    let mut tx = pool.begin().await.map_err(|e| db_error("begin", e))?;

    sqlx::query(
        "INSERT INTO entry_versions \
         (id, tenant_id, agent_id, path, value, tags, importance, searchable, content_hash, \
          created_at, expires_at, deleted_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
    )
    .bind(version.id)
    .bind(version.tenant_id)
    .bind(version.agent_id)
    .bind(version.path)
    .bind(version.value)
    .bind(version.tags)
    .bind(version.importance)
    .bind(version.searchable)
    .bind(version.content_hash)
    .bind(version.created_at)
    .bind(version.expires_at)
    .bind(version.deleted_at)
    .execute(&mut *tx)
    .await
    .map_err(|e| db_error("insert version", e))?;

    sqlx::query(
        "INSERT INTO entries (tenant_id, agent_id, path, latest_version_id, updated_at) \
         VALUES ($1, $2, $3, $4, $5) \
         ON CONFLICT (tenant_id, agent_id, path) \
         DO UPDATE SET latest_version_id = EXCLUDED.latest_version_id, \
                       updated_at = EXCLUDED.updated_at",
    )
    .bind(version.tenant_id)
    .bind(version.agent_id)
    .bind(version.path)
    .bind(version.id)
    .bind(version.created_at)
    .execute(&mut *tx)
    .await
    .map_err(|e| db_error("upsert latest pointer", e))?;

    tx.commit().await.map_err(|e| db_error("commit", e))
}

#[derive(Debug, sqlx::FromRow)]
pub struct LatestRow {
    pub id: Uuid,
    pub path: String,
    pub value: Value,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// The latest version for a triple, if it is visible.
pub async fn fetch_latest_visible(
    pool: &PgPool,
    tenant_id: Uuid,
    agent_id: &str,
    path: &str,
) -> Result<Option<LatestRow>> {
    let sql = format!(
        "SELECT v.id, v.path, v.value, v.tags, v.created_at, v.expires_at \
         FROM entries e \
         JOIN entry_versions v ON v.id = e.latest_version_id \
         WHERE e.tenant_id = $1 AND e.agent_id = $2 AND e.path = $3 AND {VISIBLE}"
    );
    sqlx::query_as::<_, LatestRow>(&sql)
        .bind(tenant_id)
        .bind(agent_id)
        .bind(path)
        .fetch_optional(pool)
        .await
        .map_err(|e| db_error("fetch latest", e))
}

#[derive(Debug, sqlx::FromRow)]
pub struct HistoryRow {
    pub id: Uuid,
    pub value: Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Version history for a triple, newest first. Tombstones and expired
/// versions are included; history is the audit trail.
pub async fn fetch_history(
    pool: &PgPool,
    tenant_id: Uuid,
    agent_id: &str,
    path: &str,
    limit: i64,
) -> Result<Vec<HistoryRow>> {
    sqlx::query_as::<_, HistoryRow>(
        "SELECT id, value, created_at, expires_at, deleted_at \
         FROM entry_versions \
         WHERE tenant_id = $1 AND agent_id = $2 AND path = $3 \
         ORDER BY created_at DESC \
         LIMIT $4",
    )
    .bind(tenant_id)
    .bind(agent_id)
    .bind(path)
    .bind(limit)
    .fetch_all(pool)
    .await
    .map_err(|e| db_error("fetch history", e))
}

/// Visible latest paths matching a LIKE pattern (`\` escape), path ASC.
///
/// The pattern must already be escaped/translated by the caller; it is bound
/// as a parameter either way.
pub async fn fetch_paths_like(
    pool: &PgPool,
    tenant_id: Uuid,
    agent_id: &str,
    like_pattern: &str,
    cap: i64,
) -> Result<Vec<String>> {
    let sql = format!(
        "SELECT e.path \
         FROM entries e \
         JOIN entry_versions v ON v.id = e.latest_version_id \
         WHERE e.tenant_id = $1 AND e.agent_id = $2 \
           AND e.path LIKE $3 ESCAPE '\\' AND {VISIBLE} \
         ORDER BY e.path ASC \
         LIMIT $4"
    );
    let rows = sqlx::query_scalar::<_, String>(&sql)
        .bind(tenant_id)
        .bind(agent_id)
        .bind(like_pattern)
        .bind(cap)
        .fetch_all(pool)
        .await
        .map_err(|e| db_error("fetch paths", e))?;
    Ok(rows)
}

#[derive(Debug, sqlx::FromRow)]
pub struct DumpRow {
    pub id: Uuid,
    pub path: String,
    pub value: Value,
    pub tags: Vec<String>,
    pub importance: f64,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// All visible latest versions for an agent, newest first.
pub async fn fetch_dump(
    pool: &PgPool,
    tenant_id: Uuid,
    agent_id: &str,
    limit: i64,
) -> Result<Vec<DumpRow>> {
    let sql = format!(
        "SELECT v.id, v.path, v.value, v.tags, v.importance, v.created_at, v.expires_at \
         FROM entries e \
         JOIN entry_versions v ON v.id = e.latest_version_id \
         WHERE e.tenant_id = $1 AND e.agent_id = $2 AND {VISIBLE} \
         ORDER BY v.created_at DESC \
         LIMIT $3"
    );
    sqlx::query_as::<_, DumpRow>(&sql)
        .bind(tenant_id)
        .bind(agent_id)
        .bind(limit)
        .fetch_all(pool)
        .await
        .map_err(|e| db_error("fetch dump", e))
}

#[derive(Debug, sqlx::FromRow)]
pub struct AgentCountRow {
    pub agent_id: String,
    pub memory_count: i64,
}

/// Distinct agents for a tenant with their visible entry counts.
pub async fn fetch_agents(pool: &PgPool, tenant_id: Uuid) -> Result<Vec<AgentCountRow>> {
    let sql = format!(
        "SELECT e.agent_id, count(*) AS memory_count \
         FROM entries e \
         JOIN entry_versions v ON v.id = e.latest_version_id \
         WHERE e.tenant_id = $1 AND {VISIBLE} \
         GROUP BY e.agent_id \
         ORDER BY e.agent_id ASC"
    );
    sqlx::query_as::<_, AgentCountRow>(&sql)
        .bind(tenant_id)
        .fetch_all(pool)
        .await
        .map_err(|e| db_error("fetch agents", e))
}

#[derive(Debug, sqlx::FromRow)]
pub struct VersionPayload {
    pub tenant_id: Uuid,
    pub agent_id: String,
    pub path: String,
    pub value: Value,
    pub tags: Vec<String>,
}

/// Load the payload of one version by id. The embedding worker reads this
/// to build the text it embeds.
pub async fn fetch_version_payload(
    pool: &PgPool,
    version_id: Uuid,
) -> Result<Option<VersionPayload>> {
    sqlx::query_as::<_, VersionPayload>(
        "SELECT tenant_id, agent_id, path, value, tags \
         FROM entry_versions WHERE id = $1",
    )
    .bind(version_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| db_error("fetch version payload", e))
}

/// Number of versions recorded for a triple (test and admin tooling).
pub async fn count_versions(
    pool: &PgPool,
    tenant_id: Uuid,
    agent_id: &str,
    path: &str,
) -> Result<i64> {
    sqlx::query_scalar::<_, i64>(
        "SELECT count(*) FROM entry_versions \
         WHERE tenant_id = $1 AND agent_id = $2 AND path = $3",
    )
    .bind(tenant_id)
    .bind(agent_id)
    .bind(path)
    .fetch_one(pool)
    .await
    .map_err(|e| db_error("count versions", e))
}
