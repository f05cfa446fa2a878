//! linkwise daemon: runs the refresh scheduler against the local link index.
//!
//! Reads `~/.linkwise/config.json`, opens `~/.linkwise/links.db` (or
//! `$LINKWISE_DB`), and refreshes stale brand catalogs every
//! `refreshIntervalSecs`. With `discoveryEndpoint` configured, ingestion runs
//! in-process; otherwise jobs are left pending for an external worker.

use std::sync::Arc;

use linkwise_lib::collaborators::IngestionDispatcher;
use linkwise_lib::embeddings::embedder_from_env;
use linkwise_lib::ingest::{HttpDiscovery, IngestionPipeline, PendingJobDispatcher};
use linkwise_lib::store::LinkStore;
use linkwise_lib::{load_config, refresh::RefreshScheduler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    linkwise_lib::init_logging();

    let config = load_config().map_err(|e| anyhow::anyhow!("Failed to load config: {e}"))?;
    let store =
        Arc::new(LinkStore::open().map_err(|e| anyhow::anyhow!("Failed to open database: {e}"))?);

    let embedder = embedder_from_env(config.embedding_model.clone(), config.collaborator_timeout());

    let dispatcher: Arc<dyn IngestionDispatcher> = match config.discovery_endpoint.clone() {
        Some(endpoint) => {
            let discovery = HttpDiscovery::new(endpoint, config.collaborator_timeout())
                .map_err(|e| anyhow::anyhow!(e))?;
            Arc::new(IngestionPipeline::new(
                store.clone(),
                store.clone(),
                Arc::new(discovery),
                embedder,
                config.clone(),
            ))
        }
        None => {
            log::info!("No discoveryEndpoint configured; import jobs stay pending");
            Arc::new(PendingJobDispatcher)
        }
    };

    log::info!(
        "linkwise refresh scheduler starting (interval {}s, stale after {} days)",
        config.refresh_interval_secs,
        config.stale_after_days
    );
    let scheduler = RefreshScheduler::new(store, dispatcher, config);
    scheduler.run().await;

    Ok(())
}
