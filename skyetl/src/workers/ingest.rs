use bytes::Bytes;
use metrics::counter;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, warn};

use crate::concurrency::shutdown::ShutdownRx;
use crate::conversions::decode_frame;
use crate::destination::Destination;
use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;
use crate::ingest::{BatchFlusher, CommitProcessor, FlushTrigger};
use crate::metrics::{SKYETL_FRAMES_MALFORMED_TOTAL, SKYETL_FRAMES_RECEIVED_TOTAL};
use crate::source::EventSource;
use crate::types::FirehoseMessage;

/// Counters collected by the ingest worker over its lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub frames: u64,
    pub malformed_frames: u64,
    pub commits: u64,
    pub matched_posts: u64,
}

/// Handle for waiting on the ingest worker.
#[derive(Debug)]
pub struct IngestWorkerHandle {
    handle: Option<JoinHandle<EtlResult<IngestSummary>>>,
}

impl IngestWorkerHandle {
    /// Waits for the ingest worker to stop.
    ///
    /// The worker stops when shutdown is signalled, when its source is exhausted or when the
    /// source fails. A panic inside the worker is returned as an error.
    pub async fn wait(mut self) -> EtlResult<IngestSummary> {
        let Some(handle) = self.handle.take() else {
            return Ok(IngestSummary::default());
        };

        handle.await.map_err(|err| {
            etl_error!(ErrorKind::IngestWorkerPanic, "Ingest worker panicked", err)
        })?
    }
}

/// Reads frames from an [`EventSource`] and runs the event path for every commit.
///
/// Frames are handled strictly in arrival order. When a commit fills a batch, the batch is
/// persisted and the warehouse reloaded before the next frame is read.
#[derive(Debug)]
pub struct IngestWorker<E, D> {
    source: E,
    processor: CommitProcessor,
    flusher: BatchFlusher<D>,
    shutdown_rx: ShutdownRx,
}

impl<E, D> IngestWorker<E, D>
where
    E: EventSource + Send + 'static,
    D: Destination + Send + Sync + 'static,
{
    pub fn new(
        source: E,
        processor: CommitProcessor,
        flusher: BatchFlusher<D>,
        shutdown_rx: ShutdownRx,
    ) -> Self {
        Self {
            source,
            processor,
            flusher,
            shutdown_rx,
        }
    }

    /// Spawns the worker on the tokio runtime.
    pub fn spawn(self) -> IngestWorkerHandle {
        let span = tracing::info_span!("ingest_worker", source = E::name());
        let handle = tokio::spawn(self.run().instrument(span.or_current()));

        IngestWorkerHandle {
            handle: Some(handle),
        }
    }

    async fn run(mut self) -> EtlResult<IngestSummary> {
        info!("starting ingest worker");

        let mut summary = IngestSummary::default();
        let result = loop {
            // Only the read is raced against shutdown. Once a frame is in hand it is processed
            // to completion, including any threshold flush it triggers.
            let frame = tokio::select! {
                biased;

                _ = self.shutdown_rx.wait_for_shutdown() => {
                    info!("shutting down ingest worker");
                    break Ok(());
                }
                frame = self.source.next_frame() => frame,
            };

            match frame {
                Ok(Some(frame)) => self.handle_frame(frame, &mut summary).await,
                Ok(None) => {
                    info!("event source exhausted");
                    break Ok(());
                }
                Err(err) => {
                    error!(error = %err, "event source failed");
                    break Err(err);
                }
            }
        };

        self.source.close().await;
        info!(
            frames = summary.frames,
            commits = summary.commits,
            matched = summary.matched_posts,
            "ingest worker stopped"
        );

        result.map(|_| summary)
    }

    async fn handle_frame(&mut self, frame: Bytes, summary: &mut IngestSummary) {
        summary.frames += 1;
        counter!(SKYETL_FRAMES_RECEIVED_TOTAL).increment(1);

        let message = match decode_frame(&frame) {
            Ok(message) => message,
            Err(err) => {
                summary.malformed_frames += 1;
                counter!(SKYETL_FRAMES_MALFORMED_TOTAL).increment(1);
                debug!(error = %err, "skipping malformed frame");
                return;
            }
        };

        match message {
            FirehoseMessage::Commit(commit) => {
                summary.commits += 1;

                let result = self.processor.process(&commit);
                summary.matched_posts += result.matched() as u64;

                for batch in result.ready {
                    self.flusher.flush_rows(batch, FlushTrigger::Threshold).await;
                }
            }
            FirehoseMessage::Info { name, message } => {
                info!(%name, message = message.as_deref().unwrap_or_default(), "upstream info");
            }
            FirehoseMessage::Error { error, message } => {
                warn!(%error, message = message.as_deref().unwrap_or_default(), "upstream error frame");
            }
            FirehoseMessage::Other { kind } => {
                debug!(%kind, "ignoring frame");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concurrency::shutdown::{ShutdownTx, create_shutdown_channel};
    use crate::destination::memory::MemoryDestination;
    use crate::filter::HashtagFilter;
    use crate::state::SharedIngestState;
    use crate::test_utils::builders::{CommitBuilder, PostBlock, info_frame};
    use crate::test_utils::source::VecSource;
    use std::cell::Cell;

    fn worker(
        frames: Vec<Bytes>,
        batch_size: usize,
    ) -> (
        IngestWorker<VecSource, MemoryDestination>,
        MemoryDestination,
        SharedIngestState,
        ShutdownTx,
    ) {
        let state = SharedIngestState::new(batch_size);
        let destination = MemoryDestination::new();
        let processor = CommitProcessor::new(HashtagFilter::new(["rust"]), state.clone());
        let flusher = BatchFlusher::new(destination.clone(), state.clone());
        let (tx, rx) = create_shutdown_channel();

        (
            IngestWorker::new(VecSource::new(frames), processor, flusher, rx),
            destination,
            state,
            tx,
        )
    }

    #[tokio::test]
    async fn processes_frames_until_source_is_exhausted() {
        let (cid, block) = PostBlock::new("learning #rust").encode();
        let frames = vec![
            Bytes::from_static(b"garbage"),
            info_frame("OutdatedCursor"),
            CommitBuilder::new(1, "did:plc:a")
                .create_post("1", cid, block)
                .to_frame(),
        ];
        let (worker, destination, state, _shutdown_tx) = worker(frames, 700);

        let summary = worker.spawn().wait().await.unwrap();

        assert_eq!(summary.frames, 3);
        assert_eq!(summary.malformed_frames, 1);
        assert_eq!(summary.commits, 1);
        assert_eq!(summary.matched_posts, 1);
        assert_eq!(state.buffered().unwrap(), 1);
        assert!(destination.batches().await.is_empty());
    }

    #[tokio::test]
    async fn full_batches_are_flushed_before_the_next_frame() {
        let frames = (0..3)
            .map(|n| {
                let (cid, block) = PostBlock::new(&format!("post {n} #rust")).encode();
                CommitBuilder::new(n, "did:plc:a")
                    .create_post(&n.to_string(), cid, block)
                    .to_frame()
            })
            .collect();
        let (worker, destination, state, _shutdown_tx) = worker(frames, 2);

        worker.spawn().wait().await.unwrap();

        assert_eq!(destination.batches().await.len(), 1);
        assert_eq!(destination.loaded_rows().await, 2);
        assert_eq!(state.buffered().unwrap(), 1);
    }

    /// Source that is `Send` but not `Sync`.
    struct CountingSource {
        inner: VecSource,
        reads: Cell<usize>,
    }

    impl EventSource for CountingSource {
        fn name() -> &'static str {
            "counting"
        }

        async fn next_frame(&mut self) -> EtlResult<Option<Bytes>> {
            self.reads.set(self.reads.get() + 1);
            self.inner.next_frame().await
        }
    }

    #[tokio::test]
    async fn sources_need_not_be_sync_for_threshold_flushes() {
        let frames = (0..2)
            .map(|n| {
                let (cid, block) = PostBlock::new(&format!("post {n} #rust")).encode();
                CommitBuilder::new(n, "did:plc:a")
                    .create_post(&n.to_string(), cid, block)
                    .to_frame()
            })
            .collect();
        let state = SharedIngestState::new(2);
        let destination = MemoryDestination::new();
        let processor = CommitProcessor::new(HashtagFilter::new(["rust"]), state.clone());
        let flusher = BatchFlusher::new(destination.clone(), state.clone());
        let (_shutdown_tx, rx) = create_shutdown_channel();
        let source = CountingSource {
            inner: VecSource::new(frames),
            reads: Cell::new(0),
        };

        let summary = IngestWorker::new(source, processor, flusher, rx)
            .spawn()
            .wait()
            .await
            .unwrap();

        assert_eq!(summary.matched_posts, 2);
        assert_eq!(destination.batches().await.len(), 1);
        assert_eq!(state.buffered().unwrap(), 0);
    }

    #[tokio::test]
    async fn stops_on_shutdown() {
        let state = SharedIngestState::new(700);
        let processor = CommitProcessor::new(HashtagFilter::new(["rust"]), state.clone());
        let flusher = BatchFlusher::new(MemoryDestination::new(), state);
        let (tx, rx) = create_shutdown_channel();
        let source = VecSource::new(vec![]).pending_when_exhausted();

        let handle = IngestWorker::new(source, processor, flusher, rx).spawn();
        tx.shutdown().unwrap();

        let summary = handle.wait().await.unwrap();
        assert_eq!(summary, IngestSummary::default());
    }
}
