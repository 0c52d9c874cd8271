//! Ingestion controller tying the event path, the timer path and the final flush together.

use skyetl_config::shared::PipelineConfig;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

use crate::bail;
use crate::clients::PostSearch;
use crate::concurrency::shutdown::{ShutdownTx, create_shutdown_channel};
use crate::destination::Destination;
use crate::error::{ErrorKind, EtlResult};
use crate::filter::HashtagFilter;
use crate::ingest::{BatchFlusher, CommitProcessor, FlushTrigger, run_backfill};
use crate::source::EventSource;
use crate::state::SharedIngestState;
use crate::workers::flush::{FlushWorker, FlushWorkerHandle};
use crate::workers::ingest::{IngestWorker, IngestWorkerHandle};

/// Lifecycle phase of a [`Pipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelinePhase {
    /// Created but not started.
    Idle,
    /// Running the historical backfill and the initial flush.
    Initializing,
    /// Ingesting live events and flushing on the timer.
    Live,
    /// Shutdown was requested; workers stop and the final flush runs.
    Terminating,
}

impl fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self {
            PipelinePhase::Idle => "idle",
            PipelinePhase::Initializing => "initializing",
            PipelinePhase::Live => "live",
            PipelinePhase::Terminating => "terminating",
        };
        f.write_str(phase)
    }
}

#[derive(Debug)]
enum PipelineState<E> {
    NotStarted {
        source: E,
    },
    Started {
        ingest_worker: IngestWorkerHandle,
        flush_worker: FlushWorkerHandle,
    },
    Failed,
}

/// Hashtag ingestion pipeline.
///
/// [`Pipeline::start`] (or [`Pipeline::start_with_backfill`]) moves the pipeline to
/// [`PipelinePhase::Live`], spawning one worker for the event path and one for the timer path.
/// [`Pipeline::wait`] returns once both workers stopped, after a final flush of whatever is
/// still buffered.
#[derive(Debug)]
pub struct Pipeline<E, D> {
    config: Arc<PipelineConfig>,
    filter: HashtagFilter,
    state: SharedIngestState,
    flusher: BatchFlusher<D>,
    pipeline_state: PipelineState<E>,
    phase_tx: watch::Sender<PipelinePhase>,
    shutdown_tx: ShutdownTx,
}

impl<E, D> Pipeline<E, D>
where
    E: EventSource + Send + 'static,
    D: Destination + Clone + Send + Sync + 'static,
{
    pub fn new(config: PipelineConfig, source: E, destination: D) -> Self {
        let (shutdown_tx, _) = create_shutdown_channel();
        let (phase_tx, _) = watch::channel(PipelinePhase::Idle);
        let filter = HashtagFilter::new(&config.hashtags);
        let state = SharedIngestState::new(config.batch.max_size);
        let flusher = BatchFlusher::new(destination, state.clone());

        Self {
            config: Arc::new(config),
            filter,
            state,
            flusher,
            pipeline_state: PipelineState::NotStarted { source },
            phase_tx,
            shutdown_tx,
        }
    }

    pub fn phase(&self) -> PipelinePhase {
        *self.phase_tx.borrow()
    }

    /// Returns a receiver observing every phase change.
    pub fn subscribe_phase(&self) -> watch::Receiver<PipelinePhase> {
        self.phase_tx.subscribe()
    }

    pub fn shutdown_tx(&self) -> ShutdownTx {
        self.shutdown_tx.clone()
    }

    pub fn ingest_state(&self) -> &SharedIngestState {
        &self.state
    }

    pub fn destination(&self) -> &D {
        self.flusher.destination()
    }

    /// Starts live ingestion without a historical backfill.
    pub async fn start(&mut self) -> EtlResult<()> {
        self.begin_initializing()?;
        info!("backfill skipped");

        self.go_live().await
    }

    /// Backfills every configured hashtag through `search`, then starts live ingestion.
    ///
    /// Backfill errors are fatal: the pipeline is left unusable and the error is returned.
    pub async fn start_with_backfill<S>(&mut self, search: &S) -> EtlResult<()>
    where
        S: PostSearch + Sync,
    {
        self.begin_initializing()?;

        match run_backfill(search, &self.filter, &self.state, &self.flusher).await {
            Ok(report) => {
                info!(
                    posts = report.posts,
                    pages = report.pages,
                    "backfill completed"
                );
            }
            Err(err) => {
                error!(error = %err, "backfill failed");
                self.pipeline_state = PipelineState::Failed;
                self.phase_tx.send_replace(PipelinePhase::Terminating);

                return Err(err);
            }
        }

        self.go_live().await
    }

    fn begin_initializing(&mut self) -> EtlResult<()> {
        if self.phase() != PipelinePhase::Idle {
            bail!(
                ErrorKind::InvalidState,
                "Pipeline already started",
                format!("pipeline is {}", self.phase())
            );
        }

        if self.filter.is_empty() {
            bail!(
                ErrorKind::ConfigError,
                "No hashtag configured",
                "at least one non-empty hashtag is required"
            );
        }

        info!(
            hashtags = ?self.filter.tags(),
            max_batch_size = self.config.batch.max_size,
            flush_interval_secs = self.config.batch.flush_interval_secs,
            "starting pipeline"
        );
        self.phase_tx.send_replace(PipelinePhase::Initializing);

        Ok(())
    }

    async fn go_live(&mut self) -> EtlResult<()> {
        // Loads backfilled rows, and any batch files left by a previous run, before live
        // events start arriving.
        self.flusher.flush(FlushTrigger::Backfill).await;

        let PipelineState::NotStarted { source } =
            std::mem::replace(&mut self.pipeline_state, PipelineState::Failed)
        else {
            bail!(ErrorKind::InvalidState, "Pipeline source already consumed");
        };

        let processor = CommitProcessor::new(self.filter.clone(), self.state.clone());
        let ingest_worker = IngestWorker::new(
            source,
            processor,
            self.flusher.clone(),
            self.shutdown_tx.subscribe(),
        )
        .spawn();
        let flush_worker = FlushWorker::new(
            self.flusher.clone(),
            self.config.batch.flush_interval(),
            self.shutdown_tx.subscribe(),
        )
        .spawn();

        self.pipeline_state = PipelineState::Started {
            ingest_worker,
            flush_worker,
        };
        self.phase_tx.send_replace(PipelinePhase::Live);
        info!("pipeline is live");

        Ok(())
    }

    /// Waits for both workers to stop, then runs the final flush and shuts the destination down.
    ///
    /// The flush worker only stops on shutdown, so this returns after [`Pipeline::shutdown`]
    /// is called or after the ingest worker fails.
    pub async fn wait(self) -> EtlResult<()> {
        let PipelineState::Started {
            ingest_worker,
            flush_worker,
        } = self.pipeline_state
        else {
            info!("pipeline was not started, nothing to wait for");

            return Ok(());
        };

        let mut errors = vec![];

        info!("waiting for ingest worker to complete");
        match ingest_worker.wait().await {
            Ok(summary) => {
                info!(
                    frames = summary.frames,
                    matched = summary.matched_posts,
                    "ingest worker completed"
                );
            }
            Err(err) => {
                errors.push(err);

                let _ = self.shutdown_tx.shutdown();
                info!("ingest worker completed with an error, shutting down flush worker");
            }
        }

        info!("waiting for flush worker to complete");
        if let Err(err) = flush_worker.wait().await {
            errors.push(err);
        }

        self.phase_tx.send_replace(PipelinePhase::Terminating);

        let report = self.flusher.flush(FlushTrigger::Shutdown).await;
        info!(
            rows = report.file.as_ref().map(|file| file.rows).unwrap_or_default(),
            warehouse_rows = ?report.warehouse_rows,
            "final flush completed"
        );

        if let Err(err) = self.flusher.destination().shutdown().await {
            error!(error = %err, "failed to shut down destination");
            errors.push(err);
        }

        if !errors.is_empty() {
            return Err(errors.into());
        }

        Ok(())
    }

    /// Signals every worker to stop.
    pub fn shutdown(&self) {
        info!("trying to shut down the pipeline");

        if self.phase() == PipelinePhase::Live {
            self.phase_tx.send_replace(PipelinePhase::Terminating);
        }

        if let Err(err) = self.shutdown_tx.shutdown() {
            error!("failed to send shutdown signal to the pipeline: {}", err);
            return;
        }

        info!("shut down signal successfully sent to all workers");
    }

    pub async fn shutdown_and_wait(self) -> EtlResult<()> {
        self.shutdown();
        self.wait().await
    }
}
