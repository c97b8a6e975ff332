//! Administrative key creation.
//!
//! A key is `<id>.<secret>`; the secret is returned exactly once and only
//! its argon2id hash is stored. When no tenant is supplied a fresh tenant is
//! minted, which is how a new account gets its first credential.

use agentos_core::{ApiError, Result, Scope, TenantId};
use agentos_store::{keys, tenants, PgPool};
use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHasher};
use rand::RngCore;
use uuid::Uuid;

/// Result of minting a key. `token` is the only copy of the secret.
#[derive(Debug)]
pub struct NewApiKey {
    pub key_id: String,
    pub token: String,
    pub tenant_id: TenantId,
}

/// Hash a secret with argon2id and default parameters.
pub fn hash_secret(secret: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| ApiError::internal(format!("argon2 hash: {err}")))
}

fn generate_key_id() -> String {
    let mut bytes = [0u8; 8];
    rand::rng().fill_bytes(&mut bytes);
    format!("ak_{}", hex::encode(bytes))
}

fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Mint an API key. Creates the tenant when `tenant_id` is absent.
pub async fn create_api_key(
    pool: &PgPool,
    tenant_id: Option<Uuid>,
    label: &str,
    scopes: &[Scope],
) -> Result<NewApiKey> {
    let tenant_id = match tenant_id {
        Some(id) => {
            tenants::create(pool, id, label).await?;
            id
        }
        None => {
            let id = Uuid::new_v4();
            tenants::create(pool, id, label).await?;
            id
        }
    };

    let key_id = generate_key_id();
    let secret = generate_secret();
    let secret_hash = hash_secret(&secret)?;
    let scope_strings: Vec<String> = scopes.iter().map(|s| s.as_str().to_string()).collect();

    keys::insert(pool, &key_id, tenant_id, &secret_hash, &scope_strings, label).await?;
    tracing::info!(key_id = %key_id, tenant_id = %tenant_id, "api key created");

    Ok(NewApiKey {
        token: format!("{key_id}.{secret}"),
        key_id,
        tenant_id: TenantId::from(tenant_id),
    })
}
