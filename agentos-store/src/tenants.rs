//! Tenant rows. Tenants are created by the admin bootstrap path and never
//! mutated by the core.

use agentos_core::Result;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db_error;

pub async fn create(pool: &PgPool, tenant_id: Uuid, name: &str) -> Result<()> {
    sqlx::query("INSERT INTO tenants (id, name) VALUES ($1, $2) ON CONFLICT (id) DO NOTHING")
        .bind(tenant_id)
        .bind(name)
        .execute(pool)
        .await
        .map_err(|e| db_error("create tenant", e))?;
    Ok(())
}

pub async fn exists(pool: &PgPool, tenant_id: Uuid) -> Result<bool> {
    let found =
        sqlx::query_scalar::<_, i64>("SELECT count(*) FROM tenants WHERE id = $1")
            .bind(tenant_id)
            .fetch_one(pool)
            .await
            .map_err(|e| db_error("fetch tenant", e))?;
    Ok(found > 0)
}
