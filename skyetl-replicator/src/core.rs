use secrecy::ExposeSecret;
use skyetl::clients::bsky::BskyClient;
use skyetl::destination::Destination;
use skyetl::destination::memory::MemoryDestination;
use skyetl::destination::parquet_duckdb::ParquetDuckDbDestination;
use skyetl::encryption::install_crypto_provider;
use skyetl::error::ErrorKind;
use skyetl::etl_error;
use skyetl::pipeline::Pipeline;
use skyetl::source::EventSource;
use skyetl::source::firehose::FirehoseSource;
use skyetl_config::shared::{BskyConfig, DestinationConfig, ReplicatorConfig};
use tokio::signal::unix::{SignalKind, signal};
use tracing::{debug, info, warn};

use crate::error::ReplicatorResult;

/// Builds the source and destination described by `replicator_config` and runs the pipeline
/// until a shutdown signal arrives or it fails.
pub async fn start_replicator_with_config(
    replicator_config: ReplicatorConfig,
) -> ReplicatorResult<()> {
    info!("starting skyetl replicator");

    install_crypto_provider();
    log_config(&replicator_config);

    let source = FirehoseSource::new(&replicator_config.source);

    // One arm per destination keeps dispatch static.
    match &replicator_config.destination {
        DestinationConfig::Memory => {
            let destination = MemoryDestination::new();
            start_pipeline(replicator_config, source, destination).await?;
        }
        DestinationConfig::DuckDb {
            output_dir,
            database,
            pool_size,
        } => {
            let destination =
                ParquetDuckDbDestination::new(output_dir, database.as_deref(), *pool_size)?;
            start_pipeline(replicator_config, source, destination).await?;
        }
    }

    info!("skyetl replicator stopped");

    Ok(())
}

async fn start_pipeline<E, D>(
    replicator_config: ReplicatorConfig,
    source: E,
    destination: D,
) -> ReplicatorResult<()>
where
    E: EventSource + Send + 'static,
    D: Destination + Clone + Send + Sync + 'static,
{
    let backfill_enabled = replicator_config.pipeline.backfill.enabled;
    let page_limit = replicator_config.pipeline.backfill.page_limit;
    let mut pipeline = Pipeline::new(replicator_config.pipeline, source, destination);

    if backfill_enabled {
        let client = login(&replicator_config.bsky, page_limit).await?;
        pipeline.start_with_backfill(&client).await?;
    } else {
        pipeline.start().await?;
    }

    // Registered before spawning so a failure surfaces as an error instead of a panic.
    let mut sigterm = signal(SignalKind::terminate())?;
    let shutdown_tx = pipeline.shutdown_tx();
    let shutdown_handle = tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("sigint (ctrl+c) received, shutting down pipeline");
            }
            _ = sigterm.recv() => {
                info!("sigterm received, shutting down pipeline");
            }
        }

        if let Err(err) = shutdown_tx.shutdown() {
            warn!(error = ?err, "failed to send shutdown signal");
            return;
        }

        info!("shutdown signal sent to the pipeline");
    });

    let result = pipeline.wait().await;

    // The pipeline may also stop on its own, e.g. when the ingest worker fails.
    shutdown_handle.abort();
    let _ = shutdown_handle.await;

    result?;

    Ok(())
}

async fn login(bsky: &BskyConfig, page_limit: u32) -> ReplicatorResult<BskyClient> {
    let (Some(identifier), Some(password)) = (&bsky.identifier, &bsky.password) else {
        return Err(etl_error!(
            ErrorKind::ConfigError,
            "Missing Bluesky credentials",
            "set bsky.identifier and bsky.password, or BSKY_USERNAME and BSKY_PASSWORD, or disable pipeline.backfill"
        )
        .into());
    };

    let client = BskyClient::login(&bsky.service_url, identifier, password, page_limit).await?;

    Ok(client)
}

fn log_config(config: &ReplicatorConfig) {
    info!(
        hashtags = ?config.pipeline.hashtags,
        max_batch_size = config.pipeline.batch.max_size,
        flush_interval_secs = config.pipeline.batch.flush_interval_secs,
        backfill = config.pipeline.backfill.enabled,
        "pipeline config"
    );
    debug!(
        url = %config.source.url,
        initial_backoff_ms = config.source.initial_backoff_ms,
        max_backoff_ms = config.source.max_backoff_ms,
        "using firehose source config"
    );
    debug!(
        service_url = %config.bsky.service_url,
        identifier = config.bsky.identifier.as_deref(),
        has_password = config.bsky.password.as_ref().is_some_and(|p| !p.expose_secret().is_empty()),
        "using bluesky search config"
    );

    match &config.destination {
        DestinationConfig::Memory => {
            debug!("using memory destination config");
        }
        DestinationConfig::DuckDb {
            output_dir,
            database,
            pool_size,
        } => {
            debug!(
                output_dir = %output_dir.display(),
                database = database.as_deref().unwrap_or(":memory:"),
                pool_size,
                "using parquet + duckdb destination config"
            );
        }
    }
}
