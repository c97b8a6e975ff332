//! Embedding rows and the cosine-similarity search query.

use agentos_core::Result;
use chrono::{DateTime, Utc};
use pgvector::Vector;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db_error;

/// Insert or replace the embedding for a version. At most one embedding
/// exists per version; re-embedding replaces it.
pub async fn upsert_embedding(
    pool: &PgPool,
    version_id: Uuid,
    tenant_id: Uuid,
    agent_id: &str,
    path: &str,
    model: &str,
    embedding: Vector,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO embeddings (version_id, tenant_id, agent_id, path, model, embedding, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, now()) \
         ON CONFLICT (version_id) \
         DO UPDATE SET model = EXCLUDED.model, embedding = EXCLUDED.embedding, \
                       created_at = EXCLUDED.created_at",
    )
    .bind(version_id)
    .bind(tenant_id)
    .bind(agent_id)
    .bind(path)
    .bind(model)
    .bind(embedding)
    .execute(pool)
    .await
    .map_err(|e| db_error("upsert embedding", e))?;
    Ok(())
}

#[derive(Debug, sqlx::FromRow)]
pub struct SearchRow {
    pub version_id: Uuid,
    pub path: String,
    pub value: Value,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub similarity: f64,
}

/// Rank visible latest versions by cosine similarity to the query vector.
///
/// The join through `entries.latest_version_id` keeps superseded versions
/// out of the results even when their embeddings still exist. The optional
/// prefix pattern must be a LIKE-escaped literal prefix followed by `%`.
pub async fn search_similar(
    pool: &PgPool,
    tenant_id: Uuid,
    agent_id: &str,
    query: Vector,
    path_prefix_like: Option<&str>,
    limit: i64,
) -> Result<Vec<SearchRow>> {
    const BASE: &str = "SELECT emb.version_id, v.path, v.value, v.tags, v.created_at, \
                1 - (emb.embedding <=> $3) AS similarity \
         FROM embeddings emb \
         JOIN entries e ON e.tenant_id = emb.tenant_id AND e.agent_id = emb.agent_id \
                        AND e.latest_version_id = emb.version_id \
         JOIN entry_versions v ON v.id = emb.version_id \
         WHERE emb.tenant_id = $1 AND emb.agent_id = $2 \
           AND v.deleted_at IS NULL AND (v.expires_at IS NULL OR v.expires_at > now())";

    let rows = if let Some(prefix) = path_prefix_like {
        let sql = format!(
            "{BASE} AND v.path LIKE $5 ESCAPE '\\' \
             ORDER BY emb.embedding <=> $3 ASC LIMIT $4"
        );
        sqlx::query_as::<_, SearchRow>(&sql)
            .bind(tenant_id)
            .bind(agent_id)
            .bind(query)
            .bind(limit)
            .bind(prefix)
            .fetch_all(pool)
            .await
    } else {
        let sql = format!("{BASE} ORDER BY emb.embedding <=> $3 ASC LIMIT $4");
        sqlx::query_as::<_, SearchRow>(&sql)
            .bind(tenant_id)
            .bind(agent_id)
            .bind(query)
            .bind(limit)
            .fetch_all(pool)
            .await
    };

    rows.map_err(|e| db_error("search embeddings", e))
}

/// Count embeddings recorded for a version (test tooling).
pub async fn count_for_version(pool: &PgPool, version_id: Uuid) -> Result<i64> {
    sqlx::query_scalar::<_, i64>("SELECT count(*) FROM embeddings WHERE version_id = $1")
        .bind(version_id)
        .fetch_one(pool)
        .await
        .map_err(|e| db_error("count embeddings", e))
}
