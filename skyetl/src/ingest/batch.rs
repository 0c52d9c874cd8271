//! Persisting drained batches and reloading the warehouse.

use metrics::{counter, gauge, histogram};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::destination::Destination;
use crate::metrics::{
    DESTINATION_LABEL, ERROR_KIND_LABEL, SKYETL_BATCHES_PERSISTED_TOTAL, SKYETL_BUFFERED_ROWS,
    SKYETL_FLUSH_DURATION_SECONDS, SKYETL_PERSIST_FAILURES_TOTAL, SKYETL_RELOAD_FAILURES_TOTAL,
    SKYETL_ROWS_PERSISTED_TOTAL, SKYETL_WAREHOUSE_ROWS, TRIGGER_LABEL,
};
use crate::state::SharedIngestState;
use crate::types::{BatchFile, PostRow};

/// Reason a flush was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    /// End of the historical backfill, or a full batch during it.
    Backfill,
    /// The buffer reached its size threshold on the event path.
    Threshold,
    /// The periodic timer fired.
    Timer,
    /// Final flush while the pipeline terminates.
    Shutdown,
}

impl FlushTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlushTrigger::Backfill => "backfill",
            FlushTrigger::Threshold => "threshold",
            FlushTrigger::Timer => "timer",
            FlushTrigger::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for FlushTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single flush.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// File written by the persist step, if there were rows to write.
    pub file: Option<BatchFile>,
    /// Rows lost because the persist step failed after they were drained.
    pub dropped_rows: usize,
    /// Warehouse row count after the reload, `None` if the reload failed.
    pub warehouse_rows: Option<u64>,
}

/// Runs persist followed by reload against a [`Destination`].
///
/// Flushes are serialized: the event path, the timer and the final shutdown flush may all
/// request one, but file writes and reloads never interleave. Failures are logged and reported
/// in the [`FlushReport`], never returned, so that callers keep ingesting.
#[derive(Debug)]
pub struct BatchFlusher<D> {
    destination: D,
    state: SharedIngestState,
    flush_lock: Arc<Mutex<()>>,
}

impl<D: Clone> Clone for BatchFlusher<D> {
    fn clone(&self) -> Self {
        Self {
            destination: self.destination.clone(),
            state: self.state.clone(),
            flush_lock: self.flush_lock.clone(),
        }
    }
}

impl<D> BatchFlusher<D>
where
    D: Destination + Send + Sync,
{
    pub fn new(destination: D, state: SharedIngestState) -> Self {
        Self {
            destination,
            state,
            flush_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn destination(&self) -> &D {
        &self.destination
    }

    /// Drains the whole buffer, persists it and reloads the warehouse.
    ///
    /// The reload runs even when the buffer is empty.
    pub async fn flush(&self, trigger: FlushTrigger) -> FlushReport {
        let _guard = self.flush_lock.lock().await;

        let rows = match self.state.drain() {
            Ok(rows) => rows,
            Err(err) => {
                error!(%trigger, error = %err, "failed to drain batch buffer");
                Vec::new()
            }
        };

        self.persist_and_reload(rows, trigger).await
    }

    /// Persists rows that were already drained from the buffer, then reloads the warehouse.
    pub async fn flush_rows(&self, rows: Vec<PostRow>, trigger: FlushTrigger) -> FlushReport {
        let _guard = self.flush_lock.lock().await;

        self.persist_and_reload(rows, trigger).await
    }

    async fn persist_and_reload(&self, rows: Vec<PostRow>, trigger: FlushTrigger) -> FlushReport {
        let started = Instant::now();
        let row_count = rows.len();
        let mut report = FlushReport::default();

        debug!(%trigger, rows = row_count, "flushing batch");

        match self.destination.persist(rows).await {
            Ok(Some(file)) => {
                counter!(
                    SKYETL_BATCHES_PERSISTED_TOTAL,
                    DESTINATION_LABEL => D::name(),
                    TRIGGER_LABEL => trigger.as_str()
                )
                .increment(1);
                counter!(SKYETL_ROWS_PERSISTED_TOTAL, DESTINATION_LABEL => D::name())
                    .increment(file.rows as u64);
                info!(%trigger, path = %file.path.display(), rows = file.rows, "wrote batch");

                report.file = Some(file);
            }
            Ok(None) => {}
            Err(err) => {
                counter!(
                    SKYETL_PERSIST_FAILURES_TOTAL,
                    DESTINATION_LABEL => D::name(),
                    ERROR_KIND_LABEL => format!("{:?}", err.kind())
                )
                .increment(1);
                error!(%trigger, rows = row_count, error = %err, "failed to persist batch, rows are dropped");

                report.dropped_rows = row_count;
            }
        }

        match self.destination.reload().await {
            Ok(rows) => {
                gauge!(SKYETL_WAREHOUSE_ROWS, DESTINATION_LABEL => D::name()).set(rows as f64);
                info!(%trigger, rows, "loaded posts into warehouse");

                report.warehouse_rows = Some(rows);
            }
            Err(err) => {
                counter!(
                    SKYETL_RELOAD_FAILURES_TOTAL,
                    DESTINATION_LABEL => D::name(),
                    ERROR_KIND_LABEL => format!("{:?}", err.kind())
                )
                .increment(1);
                error!(%trigger, error = %err, "failed to reload warehouse");
            }
        }

        if let Ok(buffered) = self.state.buffered() {
            gauge!(SKYETL_BUFFERED_ROWS).set(buffered as f64);
        }
        histogram!(SKYETL_FLUSH_DURATION_SECONDS, TRIGGER_LABEL => trigger.as_str())
            .record(started.elapsed().as_secs_f64());

        report
    }
}
