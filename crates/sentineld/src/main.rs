//! sentineld: the Sentinel anomaly-detection and alerting daemon.
//!
//! Boot order: tracing, configuration, engine assembly, history restore,
//! background loops, HTTP API. Ctrl-C broadcasts shutdown; the cleanup loop
//! persists history on its way out before the process exits.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use sentinel_lib::alerts::{HistoryStore, JsonFileHistoryStore};
use sentinel_lib::Engine;
use sentineld::api::{self, AppState};
use sentineld::config::DaemonConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = DaemonConfig::load().context("loading daemon configuration")?;
    let engine_config = config.engine_config();
    info!(
        port = config.port,
        tracked_metrics = engine_config.metrics.len(),
        "starting sentineld"
    );

    let engine = Arc::new(Engine::new(engine_config).context("assembling engine")?);

    let history_store: Option<Arc<dyn HistoryStore>> = config.persist_history.then(|| {
        Arc::new(JsonFileHistoryStore::new(&config.history_path)) as Arc<dyn HistoryStore>
    });
    if let Some(store) = history_store.as_deref() {
        match engine.load_history(store).await {
            Ok(count) => info!(records = count, "alert history restored"),
            Err(error) => warn!(%error, "alert history could not be restored"),
        }
    }

    let (shutdown, _) = broadcast::channel(1);
    let background = engine.spawn_background(history_store, &shutdown).await;

    let state = Arc::new(AppState {
        engine: engine.clone(),
    });
    let api = tokio::spawn(api::serve(config.port, state, shutdown.subscribe()));

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("shutdown signal received");

    let _ = shutdown.send(());
    engine.shutdown().await;
    for task in background {
        let _ = task.await;
    }
    match api.await {
        Ok(Ok(())) => {}
        Ok(Err(error)) => warn!(%error, "api server exited with an error"),
        Err(error) => warn!(%error, "api task aborted"),
    }
    info!("sentineld stopped");
    Ok(())
}
