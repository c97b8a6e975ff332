//! Daily quota enforcement. Each check is a single counter upsert that
//! returns the new value; crossing the ceiling turns into a typed 429 and a
//! denial counter, never a silent clamp.

use agentos_core::{ApiError, Result, TenantId};
use agentos_store::{quota, PgPool};
use chrono::Utc;

#[derive(Debug, Clone)]
pub struct QuotaLimits {
    pub writes_per_day: i64,
    pub searches_per_day: i64,
    pub embed_tokens_per_day: i64,
}

impl Default for QuotaLimits {
    fn default() -> Self {
        Self { writes_per_day: 10_000, searches_per_day: 1_000, embed_tokens_per_day: 1_000_000 }
    }
}

#[derive(Clone)]
pub struct QuotaService {
    pool: PgPool,
    limits: QuotaLimits,
}

impl QuotaService {
    pub fn new(pool: PgPool, limits: QuotaLimits) -> Self {
        Self { pool, limits }
    }

    pub fn limits(&self) -> &QuotaLimits {
        &self.limits
    }

    /// Count one write of `bytes` serialized bytes against today's quota.
    pub async fn record_write(&self, tenant_id: TenantId, bytes: i64) -> Result<()> {
        let used =
            quota::add_write(&self.pool, tenant_id.as_uuid(), Utc::now().date_naive(), bytes)
                .await?;
        if used > self.limits.writes_per_day {
            metrics::counter!("agentos_quota_denials_total", "kind" => "writes").increment(1);
            return Err(ApiError::QuotaWrites);
        }
        Ok(())
    }

    /// Count one search against today's quota.
    pub async fn record_search(&self, tenant_id: TenantId) -> Result<()> {
        let used =
            quota::add_search(&self.pool, tenant_id.as_uuid(), Utc::now().date_naive()).await?;
        if used > self.limits.searches_per_day {
            metrics::counter!("agentos_quota_denials_total", "kind" => "searches").increment(1);
            return Err(ApiError::QuotaSearches);
        }
        Ok(())
    }
}
