use agentos_core::{ApiError, KeyId, Result, Scope, TenantId};
use agentos_store::{keys, PgPool};
use argon2::password_hash::PasswordHash;
use argon2::{Argon2, PasswordVerifier};

use crate::bearer::parse_bearer;
use crate::cache::AuthCache;
use crate::lockout::FailureTracker;

/// The identity a verified request carries through the pipeline.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub tenant_id: TenantId,
    pub key_id: KeyId,
    pub scopes: Vec<Scope>,
}

impl AuthContext {
    pub fn has_scope(&self, scope: Scope) -> bool {
        self.scopes.contains(&scope) || self.scopes.contains(&Scope::Admin)
    }

    /// A handler requires one of the listed scopes (or `admin`).
    pub fn require_any_scope(&self, scopes: &[Scope]) -> Result<()> {
        if scopes.iter().any(|scope| self.has_scope(*scope)) {
            Ok(())
        } else {
            Err(ApiError::Forbidden)
        }
    }
}

/// Verifies bearer tokens against the `api_keys` table.
pub struct Authenticator {
    pool: PgPool,
    cache: AuthCache,
    lockout: FailureTracker,
}

impl Authenticator {
    pub fn new(pool: PgPool) -> Self {
        Self { pool, cache: AuthCache::new(), lockout: FailureTracker::new() }
    }

    /// Authenticate an `Authorization` header value.
    ///
    /// Order matters: lockout is checked before any database or argon2 work,
    /// the cache is consulted next, and only then does the slow path run.
    pub async fn authenticate(&self, header_value: &str) -> Result<AuthContext> {
        let (key_id, secret) = parse_bearer(header_value)?;

        if self.lockout.is_locked(&key_id) {
            metrics::counter!("agentos_auth_failures_total", "reason" => "lockout").increment(1);
            return Err(ApiError::AuthLockout);
        }

        let token = format!("{key_id}.{secret}");
        if let Some(context) = self.cache.get(&token) {
            return Ok(context);
        }

        let Some(row) = keys::fetch(&self.pool, &key_id).await? else {
            self.fail(&key_id, "unknown_key");
            return Err(ApiError::Unauthorized);
        };
        if row.revoked_at.is_some() {
            self.fail(&key_id, "revoked");
            return Err(ApiError::Unauthorized);
        }

        let parsed = PasswordHash::new(&row.secret_hash).map_err(|err| {
            tracing::error!(key_id = %key_id, error = %err, "stored secret hash is malformed");
            ApiError::internal("malformed secret hash")
        })?;
        if Argon2::default().verify_password(secret.as_bytes(), &parsed).is_err() {
            self.fail(&key_id, "bad_secret");
            return Err(ApiError::Unauthorized);
        }

        let context = AuthContext {
            tenant_id: TenantId::from(row.tenant_id),
            key_id: KeyId::from(row.id),
            scopes: row.scopes.iter().filter_map(|s| Scope::parse(s)).collect(),
        };
        self.lockout.clear(&key_id);
        self.cache.insert(token, context.clone());
        Ok(context)
    }

    /// Drop cached entries for a key id so a revocation takes effect without
    /// waiting out the cache TTL (on this instance).
    pub fn invalidate_key(&self, key_id: &str) {
        self.cache.invalidate_key(key_id);
    }

    fn fail(&self, key_id: &str, reason: &'static str) {
        self.lockout.record_failure(key_id);
        metrics::counter!("agentos_auth_failures_total", "reason" => reason).increment(1);
        tracing::debug!(key_id, reason, "authentication failed");
    }
}
