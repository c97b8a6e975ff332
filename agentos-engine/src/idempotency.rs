//! Idempotent writes.
//!
//! A client retrying a PUT or DELETE under the same `Idempotency-Key` gets
//! the first response back verbatim for 24 hours; reusing the key with a
//! different body is a 422. The request hash is computed over canonical JSON
//! so `{a:1,b:2}` and `{b:2,a:1}` are the same request; a legacy hash over
//! the raw serialization is still accepted for records written before
//! canonicalization.

use std::time::Duration;

use agentos_core::{canonical_json, sha256_hex, ApiError, Result, TenantId};
use agentos_store::{idempotency, PgPool};
use chrono::Utc;
use serde_json::Value;
use tokio::sync::watch;

/// Cached responses expire after this long.
const IDEMPOTENCY_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// The background sweeper deletes expired rows this often.
pub const IDEMPOTENCY_SWEEP_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);

/// Validate the header value: ASCII `[A-Za-z0-9_-]`, 1 to 128 characters.
pub fn validate_key(key: &str) -> Result<()> {
    let ok = !key.is_empty()
        && key.len() <= 128
        && key.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
    if ok { Ok(()) } else { Err(ApiError::InvalidIdempotencyKey) }
}

/// `(canonical, legacy)` request hashes for a body.
pub fn request_hashes(body: &Value) -> (String, String) {
    let canonical = sha256_hex(canonical_json(body).as_bytes());
    let legacy = sha256_hex(body.to_string().as_bytes());
    (canonical, legacy)
}

#[derive(Clone)]
pub struct IdempotencyService {
    pool: PgPool,
}

impl IdempotencyService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Pre-handler lookup. Returns the cached response when the key was
    /// already used with an equivalent body; errors when it was used with a
    /// different one. Expired records are deleted on encounter.
    pub async fn lookup(
        &self,
        tenant_id: TenantId,
        key: &str,
        body: &Value,
    ) -> Result<Option<Value>> {
        validate_key(key)?;
        let Some(row) = idempotency::fetch(&self.pool, tenant_id.as_uuid(), key).await? else {
            return Ok(None);
        };

        if row.expires_at <= Utc::now() {
            idempotency::delete(&self.pool, tenant_id.as_uuid(), key).await?;
            return Ok(None);
        }

        let (canonical, legacy) = request_hashes(body);
        if row.request_hash == canonical || row.request_hash == legacy {
            Ok(Some(row.response))
        } else {
            Err(ApiError::IdempotencyKeyMismatch)
        }
    }

    /// Post-handler store. Insert-or-ignore so a concurrent retry cannot
    /// replace the response the first writer recorded.
    pub async fn store(
        &self,
        tenant_id: TenantId,
        key: &str,
        body: &Value,
        response: &Value,
    ) -> Result<()> {
        let (canonical, _) = request_hashes(body);
        let expires_at = Utc::now()
            + chrono::Duration::from_std(IDEMPOTENCY_TTL).unwrap_or(chrono::Duration::hours(24));
        idempotency::store(&self.pool, tenant_id.as_uuid(), key, &canonical, response, expires_at)
            .await
    }

    /// Delete all expired rows once; returns how many were removed.
    pub async fn sweep(&self) -> Result<u64> {
        idempotency::sweep_expired(&self.pool).await
    }

    /// Periodic sweep loop, exiting when the shutdown signal flips.
    pub async fn run_sweeper(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(IDEMPOTENCY_SWEEP_INTERVAL) => {}
                _ = shutdown.changed() => {}
            }
            if *shutdown.borrow() {
                break;
            }
            match self.sweep().await {
                Ok(0) => {}
                Ok(removed) => tracing::info!(removed, "swept expired idempotency keys"),
                Err(err) => tracing::error!(error = %err, "idempotency sweep failed"),
            }
        }
    }
}
