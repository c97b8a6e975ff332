use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use agentos_embed::{EmbedWorker, Embedder, OpenAiEmbedder, WorkerConfig};
use agentos_server::{app, config::ServerConfig, error, observability, state::AppState};
use tokio::net::TcpListener;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init_tracing();

    let config = ServerConfig::from_env()?;
    error::set_production(config.production);

    let pool = agentos_store::connect_with_retry(&config.database_url, 10)
        .await
        .map_err(|err| anyhow::anyhow!("{err}"))?;
    agentos_store::run_migrations(&pool).await.map_err(|err| anyhow::anyhow!("{err}"))?;

    let embedder: Option<Arc<dyn Embedder>> = match &config.openai_api_key {
        Some(api_key) => {
            let client = OpenAiEmbedder::new(api_key, &config.openai_embed_model)
                .map_err(|err| anyhow::anyhow!("{err}"))?;
            tracing::info!(model = %config.openai_embed_model, "embeddings enabled");
            Some(Arc::new(client))
        }
        None => {
            tracing::warn!("OPENAI_API_KEY not set; search is disabled and jobs will queue");
            None
        }
    };

    let metrics_handle = if config.enable_metrics { observability::init_metrics() } else { None };
    let state = AppState::build(config.clone(), pool.clone(), embedder.clone(), metrics_handle);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    if let Some(embedder) = embedder {
        let worker = EmbedWorker::new(
            pool.clone(),
            embedder,
            WorkerConfig {
                embed_tokens_quota_per_day: config.embed_tokens_quota_per_day,
                ..WorkerConfig::default()
            },
        );
        tokio::spawn(worker.run(shutdown_rx.clone()));
    }

    let sweeper = state.idempotency.clone();
    let sweeper_shutdown = shutdown_rx.clone();
    tokio::spawn(async move { sweeper.run_sweeper(sweeper_shutdown).await });

    let preauth = state.preauth.clone();
    let mut eviction_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(60)) => preauth.evict_idle(),
                _ = eviction_shutdown.changed() => {
                    if *eviction_shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, production = config.production, "agentos-server listening");

    axum::serve(listener, app(state).into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await?;

    pool.close().await;
    tracing::info!("shutdown complete");
    Ok(())
}

/// Resolve on SIGINT or SIGTERM, flipping the worker/sweeper shutdown flag
/// before the server stops accepting connections.
async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => tracing::error!(error = %err, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("termination signal received, draining");
    let _ = shutdown_tx.send(true);
}
