use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{Instrument, debug, info};

use crate::concurrency::shutdown::ShutdownRx;
use crate::destination::Destination;
use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;
use crate::ingest::{BatchFlusher, FlushTrigger};

/// Handle for waiting on the flush worker.
#[derive(Debug)]
pub struct FlushWorkerHandle {
    handle: Option<JoinHandle<EtlResult<()>>>,
}

impl FlushWorkerHandle {
    /// Waits for the flush worker to stop after shutdown was signalled.
    pub async fn wait(mut self) -> EtlResult<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        handle.await.map_err(|err| {
            etl_error!(ErrorKind::FlushWorkerPanic, "Flush worker panicked", err)
        })??;

        Ok(())
    }
}

/// Periodically flushes whatever the buffer holds and reloads the warehouse.
///
/// The first flush happens one full interval after the worker starts. A tick that fires while
/// a flush is still running is delayed rather than bunched up.
#[derive(Debug)]
pub struct FlushWorker<D> {
    flusher: BatchFlusher<D>,
    flush_interval: Duration,
    shutdown_rx: ShutdownRx,
}

impl<D> FlushWorker<D>
where
    D: Destination + Send + Sync + 'static,
{
    pub fn new(flusher: BatchFlusher<D>, flush_interval: Duration, shutdown_rx: ShutdownRx) -> Self {
        Self {
            flusher,
            flush_interval,
            shutdown_rx,
        }
    }

    /// Spawns the worker on the tokio runtime.
    pub fn spawn(self) -> FlushWorkerHandle {
        let span = tracing::info_span!(
            "flush_worker",
            interval_secs = self.flush_interval.as_secs_f64()
        );
        let handle = tokio::spawn(self.run().instrument(span.or_current()));

        FlushWorkerHandle {
            handle: Some(handle),
        }
    }

    async fn run(mut self) -> EtlResult<()> {
        info!("starting flush worker");

        let mut ticker = interval_at(Instant::now() + self.flush_interval, self.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown_rx.wait_for_shutdown() => {
                    info!("shutting down flush worker");
                    break;
                }
                _ = ticker.tick() => {
                    debug!("flush interval elapsed");
                    self.flusher.flush(FlushTrigger::Timer).await;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concurrency::shutdown::create_shutdown_channel;
    use crate::destination::memory::MemoryDestination;
    use crate::state::SharedIngestState;
    use crate::test_utils::builders::row;
    use crate::test_utils::test_destination_wrapper::TestDestinationWrapper;

    #[tokio::test(start_paused = true)]
    async fn flushes_on_every_tick() {
        let state = SharedIngestState::new(700);
        state.lock().unwrap().append(row("at://1", "rust"));
        let destination = TestDestinationWrapper::wrap(MemoryDestination::new());
        let flusher = BatchFlusher::new(destination.clone(), state.clone());
        let (tx, rx) = create_shutdown_channel();

        let handle = FlushWorker::new(flusher, Duration::from_secs(60), rx).spawn();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(destination.reload_calls(), 0);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(destination.persisted_rows(), 1);
        assert_eq!(destination.reload_calls(), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(destination.reload_calls(), 2);

        tx.shutdown().unwrap();
        handle.wait().await.unwrap();
    }

    #[tokio::test]
    async fn stops_on_shutdown_without_flushing() {
        let destination = TestDestinationWrapper::wrap(MemoryDestination::new());
        let flusher = BatchFlusher::new(destination.clone(), SharedIngestState::new(700));
        let (tx, rx) = create_shutdown_channel();

        let handle = FlushWorker::new(flusher, Duration::from_secs(3600), rx).spawn();
        tx.shutdown().unwrap();
        handle.wait().await.unwrap();

        assert_eq!(destination.persist_calls(), 0);
    }
}
