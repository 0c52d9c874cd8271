//! Service binary ingesting hashtag posts from the Bluesky firehose.
//!
//! Loads configuration, sets up telemetry and runs the pipeline until SIGINT or SIGTERM.

use skyetl_config::shared::ReplicatorConfig;
use skyetl_telemetry::metrics::init_metrics;
use skyetl_telemetry::tracing::init_tracing;
use tracing::error;

use crate::config::load_replicator_config;
use crate::core::start_replicator_with_config;
use crate::error::{ReplicatorError, ReplicatorResult};

mod config;
mod core;
mod error;

fn main() {
    if let Err(err) = run() {
        eprint!("{}", err.render_report());
        std::process::exit(1);
    }
}

fn run() -> ReplicatorResult<()> {
    let replicator_config = load_replicator_config()?;

    let _log_flusher = init_tracing(env!("CARGO_BIN_NAME")).map_err(ReplicatorError::config)?;

    init_metrics(env!("CARGO_BIN_NAME")).map_err(ReplicatorError::config)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(replicator_config))
}

async fn async_main(replicator_config: ReplicatorConfig) -> ReplicatorResult<()> {
    if let Err(err) = start_replicator_with_config(replicator_config).await {
        error!(category = err.category(), "{err}");

        return Err(err);
    }

    Ok(())
}
