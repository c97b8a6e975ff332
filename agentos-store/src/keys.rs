//! API key rows. Secrets are stored only as argon2 hashes; verification
//! happens in `agentos-auth`.

use agentos_core::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::db_error;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ApiKeyRow {
    pub id: String,
    pub tenant_id: Uuid,
    pub secret_hash: String,
    pub scopes: Vec<String>,
    pub revoked_at: Option<DateTime<Utc>>,
}

/// Look up a key by its public id.
pub async fn fetch(pool: &PgPool, key_id: &str) -> Result<Option<ApiKeyRow>> {
    sqlx::query_as::<_, ApiKeyRow>(
        "SELECT id, tenant_id, secret_hash, scopes, revoked_at \
         FROM api_keys WHERE id = $1",
    )
    .bind(key_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| db_error("fetch api key", e))
}

/// Store a freshly minted key.
pub async fn insert(
    pool: &PgPool,
    key_id: &str,
    tenant_id: Uuid,
    secret_hash: &str,
    scopes: &[String],
    label: &str,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO api_keys (id, tenant_id, secret_hash, scopes, label) \
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(key_id)
    .bind(tenant_id)
    .bind(secret_hash)
    .bind(scopes)
    .bind(label)
    .execute(pool)
    .await
    .map_err(|e| db_error("insert api key", e))?;
    Ok(())
}

/// Revoke a key by setting `revoked_at`. Returns whether a row was updated.
pub async fn revoke(pool: &PgPool, key_id: &str) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE api_keys SET revoked_at = now() WHERE id = $1 AND revoked_at IS NULL",
    )
    .bind(key_id)
    .execute(pool)
    .await
    .map_err(|e| db_error("revoke api key", e))?;
    Ok(result.rows_affected() > 0)
}
