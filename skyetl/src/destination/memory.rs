use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::destination::Destination;
use crate::error::EtlResult;
use crate::types::{BatchFile, PostRow};

#[derive(Debug, Default)]
struct Inner {
    batches: Vec<Vec<PostRow>>,
    loaded_rows: u64,
}

/// In-memory destination for testing and development purposes.
///
/// Every persisted batch is kept as-is, so tests can inspect exactly which rows were flushed
/// and in which batch. All data is lost when the process terminates.
#[derive(Debug, Clone, Default)]
pub struct MemoryDestination {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryDestination {
    /// Creates a new empty memory destination.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every persisted batch, oldest first.
    pub async fn batches(&self) -> Vec<Vec<PostRow>> {
        let inner = self.inner.lock().await;
        inner.batches.clone()
    }

    /// Returns every persisted row, in persist order.
    pub async fn rows(&self) -> Vec<PostRow> {
        let inner = self.inner.lock().await;
        inner.batches.iter().flatten().cloned().collect()
    }

    /// Returns the row count observed by the last reload.
    pub async fn loaded_rows(&self) -> u64 {
        self.inner.lock().await.loaded_rows
    }
}

impl Destination for MemoryDestination {
    fn name() -> &'static str {
        "memory"
    }

    async fn persist(&self, rows: Vec<PostRow>) -> EtlResult<Option<BatchFile>> {
        if rows.is_empty() {
            return Ok(None);
        }

        let mut inner = self.inner.lock().await;

        info!("persisting a batch of {} rows in memory", rows.len());

        let file = BatchFile {
            path: PathBuf::from(format!("memory/batch_{:06}", inner.batches.len())),
            rows: rows.len(),
        };
        inner.batches.push(rows);

        Ok(Some(file))
    }

    async fn reload(&self) -> EtlResult<u64> {
        let mut inner = self.inner.lock().await;

        let total = inner.batches.iter().map(Vec::len).sum::<usize>() as u64;
        inner.loaded_rows = total;

        Ok(total)
    }
}
