use std::path::PathBuf;
use tracing::info;

use crate::destination::Destination;
use crate::destination::duckdb::DuckDbWarehouse;
use crate::destination::parquet::ParquetBatchWriter;
use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;
use crate::types::{BatchFile, PostRow};

/// Destination that appends Parquet batch files and rebuilds a DuckDB table from them.
///
/// The batch directory is the source of truth: each reload scans every file in it, so the
/// warehouse converges to the full history even after a failed reload.
#[derive(Clone)]
pub struct ParquetDuckDbDestination {
    writer: ParquetBatchWriter,
    warehouse: DuckDbWarehouse,
}

impl ParquetDuckDbDestination {
    /// Creates a destination writing to `output_dir` and loading into the DuckDB database
    /// at `database`, or into an in-memory database when `database` is `None`.
    pub fn new(
        output_dir: impl Into<PathBuf>,
        database: Option<&str>,
        pool_size: u32,
    ) -> EtlResult<Self> {
        let writer = ParquetBatchWriter::new(output_dir)?;
        let warehouse = match database {
            Some(database) => DuckDbWarehouse::new(database, pool_size)?,
            None => DuckDbWarehouse::new_in_memory(pool_size)?,
        };

        Ok(Self { writer, warehouse })
    }

    pub fn writer(&self) -> &ParquetBatchWriter {
        &self.writer
    }

    pub fn warehouse(&self) -> &DuckDbWarehouse {
        &self.warehouse
    }
}

impl Destination for ParquetDuckDbDestination {
    fn name() -> &'static str {
        "parquet_duckdb"
    }

    async fn persist(&self, rows: Vec<PostRow>) -> EtlResult<Option<BatchFile>> {
        if rows.is_empty() {
            return Ok(None);
        }

        let writer = self.writer.clone();
        let file = tokio::task::spawn_blocking(move || writer.write(&rows))
            .await
            .map_err(|_| {
                etl_error!(
                    ErrorKind::DestinationTaskPanic,
                    "Parquet writer task panicked"
                )
            })??;

        if let Some(file) = &file {
            info!(path = %file.path.display(), rows = file.rows, "persisted batch file");
        }

        Ok(file)
    }

    async fn reload(&self) -> EtlResult<u64> {
        let writer = self.writer.clone();
        let files = tokio::task::spawn_blocking(move || writer.batch_files())
            .await
            .map_err(|_| {
                etl_error!(
                    ErrorKind::DestinationTaskPanic,
                    "Batch file listing task panicked"
                )
            })??;

        let file_count = files.len();
        let rows = self.warehouse.reload(files).await?;
        info!(files = file_count, rows, "reloaded warehouse table");

        Ok(rows)
    }
}
