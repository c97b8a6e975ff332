//! The embedding worker: claim one job, embed it, record the outcome.
//!
//! Claims go through a single `FOR UPDATE SKIP LOCKED` statement, so any
//! number of workers can run side by side without processing a job twice in
//! the same attempt. Failed attempts return the job to the queue with
//! exponential backoff until the attempt budget is spent.

use std::sync::Arc;
use std::time::Duration;

use agentos_core::Result;
use agentos_store::jobs::{self, ClaimedJob, MAX_ATTEMPTS};
use agentos_store::{embeddings, entries, quota, PgPool};
use chrono::Utc;
use pgvector::Vector;
use tokio::sync::watch;

use crate::embedder::Embedder;
use crate::text::{approx_tokens, build_embedding_text, short_error};

/// How one worker iteration ended.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing claimable.
    Idle,
    /// Job embedded and marked done.
    Done,
    /// Job returned to the queue; the loop should back off this long.
    Retried(Duration),
    /// Job reached a terminal failure.
    Failed,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Daily embed-token ceiling per tenant.
    pub embed_tokens_quota_per_day: i64,
    /// Sleep between iterations when the queue is empty.
    pub idle_sleep: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { embed_tokens_quota_per_day: 1_000_000, idle_sleep: Duration::from_secs(1) }
    }
}

struct ProcessFailure {
    message: String,
    /// Terminal failures skip the retry budget (e.g. the version is gone).
    terminal: bool,
}

pub struct EmbedWorker {
    pool: PgPool,
    embedder: Arc<dyn Embedder>,
    config: WorkerConfig,
}

impl EmbedWorker {
    pub fn new(pool: PgPool, embedder: Arc<dyn Embedder>, config: WorkerConfig) -> Self {
        Self { pool, embedder, config }
    }

    /// Run until the shutdown signal flips. Sleeps when idle and after a
    /// retried failure; processes back-to-back while work is available.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(model = self.embedder.model(), "embedding worker started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            let pause = match self.run_once().await {
                Ok(Outcome::Done) => None,
                Ok(Outcome::Failed) => None,
                Ok(Outcome::Idle) => Some(self.config.idle_sleep),
                Ok(Outcome::Retried(backoff)) => Some(backoff),
                Err(err) => {
                    tracing::error!(error = %err, "worker iteration failed");
                    Some(self.config.idle_sleep)
                }
            };
            if let Some(duration) = pause {
                tokio::select! {
                    _ = tokio::time::sleep(duration) => {}
                    _ = shutdown.changed() => {}
                }
            }
        }
        tracing::info!("embedding worker stopped");
    }

    /// One claim-and-process iteration; `once` mode for tests and tooling.
    pub async fn run_once(&self) -> Result<Outcome> {
        let Some(job) = jobs::claim_next(&self.pool).await? else {
            return Ok(Outcome::Idle);
        };

        match self.process(&job).await {
            Ok(()) => {
                jobs::mark_done(&self.pool, job.version_id).await?;
                metrics::counter!("agentos_embed_jobs_total", "outcome" => "succeeded")
                    .increment(1);
                tracing::debug!(version_id = %job.version_id, "embedding job done");
                Ok(Outcome::Done)
            }
            Err(failure) => {
                let message = short_error(&failure.message);
                if failure.terminal || job.attempts >= MAX_ATTEMPTS {
                    jobs::mark_failed(&self.pool, job.version_id, &message).await?;
                    metrics::counter!("agentos_embed_jobs_total", "outcome" => "failed")
                        .increment(1);
                    tracing::warn!(
                        version_id = %job.version_id,
                        attempts = job.attempts,
                        error = %message,
                        "embedding job failed terminally"
                    );
                    Ok(Outcome::Failed)
                } else {
                    jobs::release_for_retry(&self.pool, job.version_id, &message).await?;
                    metrics::counter!("agentos_embed_jobs_total", "outcome" => "retried")
                        .increment(1);
                    tracing::debug!(
                        version_id = %job.version_id,
                        attempts = job.attempts,
                        "embedding job released for retry"
                    );
                    Ok(Outcome::Retried(backoff_for_attempt(job.attempts)))
                }
            }
        }
    }

    async fn process(&self, job: &ClaimedJob) -> std::result::Result<(), ProcessFailure> {
        let payload = entries::fetch_version_payload(&self.pool, job.version_id)
            .await
            .map_err(|err| ProcessFailure { message: err.to_string(), terminal: false })?;
        let Some(payload) = payload else {
            return Err(ProcessFailure {
                message: "version no longer exists".to_string(),
                terminal: true,
            });
        };

        let text = build_embedding_text(&payload.path, &payload.value, &payload.tags);
        let vector = self
            .embedder
            .embed(&text)
            .await
            .map_err(|err| ProcessFailure { message: err.to_string(), terminal: false })?;
        if vector.is_empty() || vector.iter().any(|v| !v.is_finite()) {
            return Err(ProcessFailure {
                message: "provider returned an invalid vector".to_string(),
                terminal: false,
            });
        }

        embeddings::upsert_embedding(
            &self.pool,
            job.version_id,
            job.tenant_id,
            &payload.agent_id,
            &payload.path,
            self.embedder.model(),
            Vector::from(vector),
        )
        .await
        .map_err(|err| ProcessFailure { message: err.to_string(), terminal: false })?;

        let tokens = approx_tokens(&text);
        let used =
            quota::add_embed_tokens(&self.pool, job.tenant_id, Utc::now().date_naive(), tokens)
                .await
                .map_err(|err| ProcessFailure { message: err.to_string(), terminal: false })?;
        if used > self.config.embed_tokens_quota_per_day {
            metrics::counter!("agentos_quota_denials_total", "kind" => "embed_tokens")
                .increment(1);
            tracing::warn!(tenant_id = %job.tenant_id, used, "embed token quota exceeded");
        }

        Ok(())
    }
}

/// `min(2^attempts, 32)` seconds.
pub fn backoff_for_attempt(attempts: i32) -> Duration {
    let exponent = attempts.clamp(0, 5) as u32;
    Duration::from_secs(u64::from(2u32.pow(exponent)).min(32))
}
