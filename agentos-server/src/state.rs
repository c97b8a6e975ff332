use std::sync::Arc;

use agentos_auth::Authenticator;
use agentos_embed::Embedder;
use agentos_engine::{IdempotencyService, MemoryEngine, QuotaLimits, QuotaService};
use agentos_store::PgPool;
use metrics_exporter_prometheus::PrometheusHandle;

use crate::config::ServerConfig;
use crate::ratelimit::{PreAuthBuckets, SlidingWindow};

/// Everything the handlers share. Cloning is cheap; all fields are handles.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub pool: PgPool,
    pub engine: Arc<MemoryEngine>,
    pub authenticator: Arc<Authenticator>,
    pub idempotency: IdempotencyService,
    /// Write quota is charged here, in pipeline order, before the
    /// idempotency lookup; the engine shares the same service for searches.
    pub quotas: QuotaService,
    pub windows: Arc<SlidingWindow>,
    pub preauth: Arc<PreAuthBuckets>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn build(
        config: ServerConfig,
        pool: PgPool,
        embedder: Option<Arc<dyn Embedder>>,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        let quotas = QuotaService::new(
            pool.clone(),
            QuotaLimits {
                writes_per_day: config.write_quota_per_day,
                searches_per_day: config.search_quota_per_day,
                embed_tokens_per_day: config.embed_tokens_quota_per_day,
            },
        );
        let preauth = Arc::new(PreAuthBuckets::new(config.preauth_rate_limit_per_minute));

        Self {
            engine: Arc::new(MemoryEngine::new(pool.clone(), quotas.clone(), embedder)),
            authenticator: Arc::new(Authenticator::new(pool.clone())),
            idempotency: IdempotencyService::new(pool.clone()),
            quotas,
            windows: Arc::new(SlidingWindow::new()),
            preauth,
            metrics,
            config: Arc::new(config),
            pool,
        }
    }
}
