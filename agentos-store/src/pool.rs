use std::time::Duration;

use agentos_core::{ApiError, Result};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::db_error;

const WARMUP_ATTEMPTS: u32 = 5;

/// Open the shared connection pool, retrying the initial connection up to
/// five times with a linearly increasing delay so the process survives a
/// database that is still coming up.
pub async fn connect_with_retry(database_url: &str, max_connections: u32) -> Result<PgPool> {
    let options = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(10));

    let mut last_err = None;
    for attempt in 1..=WARMUP_ATTEMPTS {
        match options.clone().connect(database_url).await {
            Ok(pool) => {
                tracing::info!(attempt, "database pool ready");
                return Ok(pool);
            }
            Err(err) => {
                tracing::warn!(attempt, error = %err, "database connection failed");
                last_err = Some(err);
                if attempt < WARMUP_ATTEMPTS {
                    tokio::time::sleep(Duration::from_millis(500 * u64::from(attempt))).await;
                }
            }
        }
    }

    Err(match last_err {
        Some(err) => db_error("connect", err),
        None => ApiError::internal("database connection failed"),
    })
}

/// Apply the embedded migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|err| {
            tracing::error!(error = %err, "migration failed");
            ApiError::internal(format!("migrate: {err}"))
        })
}
