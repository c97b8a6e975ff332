//! Postgres persistence for the AgentOS memory store.
//!
//! Every query in this crate binds `tenant_id` (and any other user-derived
//! value) as a parameter; no user data is ever interpolated into SQL text.
//! Serialization of concurrent writers is delegated entirely to Postgres:
//! the latest pointer rides the `entries` primary key upsert inside the same
//! transaction as its version insert, and the embedding job claim uses
//! `FOR UPDATE SKIP LOCKED` so a row can only be claimed once per attempt.

pub mod embeddings;
pub mod entries;
pub mod idempotency;
pub mod jobs;
pub mod keys;
pub mod pool;
pub mod quota;
pub mod tenants;

pub use pool::{connect_with_retry, run_migrations};
pub use sqlx::PgPool;

use agentos_core::ApiError;

/// Map a database failure to the opaque internal error, logging the detail
/// server-side only.
pub(crate) fn db_error(context: &'static str, err: sqlx::Error) -> ApiError {
    tracing::error!(context, error = %err, "database operation failed");
    ApiError::internal(format!("{context}: {err}"))
}
