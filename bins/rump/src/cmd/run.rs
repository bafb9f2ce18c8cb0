use std::future::Future;
use std::sync::Arc;

use pipeline::{Endpoint, Orchestrator, Outcome};
use rump_api::KeyValueStore;
use storage_redis::RedisStore;

use crate::config::Effective;
use crate::error::RumpError;

pub async fn run(eff: &Effective) -> Result<(), RumpError> {
    let cfg = &eff.pipeline;
    tracing::info!(from = %cfg.source, to = %cfg.target, ttl = cfg.track_ttl, "rump starting");

    let shutdown = shutdown_signal()?;

    // --- Connect stores ---
    let source = open_store(&cfg.source).await?;
    let target = open_store(&cfg.target).await?;

    let orchestrator = Orchestrator::from_config(cfg, source, target)?;
    match orchestrator.run(shutdown).await? {
        Outcome::Completed => tracing::info!("done"),
        Outcome::Cancelled => tracing::info!("stopped before completion"),
    }
    Ok(())
}

async fn open_store(endpoint: &Endpoint) -> Result<Option<Arc<dyn KeyValueStore>>, RumpError> {
    if !endpoint.is_store() {
        return Ok(None);
    }
    let store = RedisStore::connect(&endpoint.uri)
        .await
        .map_err(|source| RumpError::Connect { endpoint: endpoint.to_string(), source })?;
    tracing::info!(endpoint = %endpoint, "connected");
    Ok(Some(Arc::new(store)))
}

/// Resolves on Ctrl+C or, on Unix, SIGTERM.
///
/// Listeners are registered up front so a failure to install them is
/// reported before any data moves.
fn shutdown_signal() -> Result<impl Future<Output = ()> + Send + 'static, RumpError> {
    #[cfg(unix)]
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    Ok(async move {
        #[cfg(unix)]
        let terminated = async move {
            terminate.recv().await;
        };
        #[cfg(not(unix))]
        let terminated = std::future::pending::<()>();

        let interrupted = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "ctrl-c listener failed");
                std::future::pending::<()>().await;
            }
        };

        tokio::select! {
            _ = interrupted => tracing::info!("interrupt received"),
            _ = terminated => tracing::info!("SIGTERM received"),
        }
    })
}
