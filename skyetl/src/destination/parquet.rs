//! Parquet batch files.

use arrow::array::{ArrayRef, StringArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;
use crate::types::{BatchFile, PostRow};

/// Prefix of every batch file name.
const BATCH_FILE_PREFIX: &str = "posts_";
/// Extension of every batch file name.
const BATCH_FILE_EXTENSION: &str = "parquet";
/// Timestamp layout embedded in batch file names.
const BATCH_FILE_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
/// Upper bound on same-second suffixes tried before giving up.
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Returns the Arrow schema of persisted posts.
pub fn posts_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("uri", DataType::Utf8, false),
        Field::new("cid", DataType::Utf8, false),
        Field::new("author", DataType::Utf8, false),
        Field::new("text", DataType::Utf8, false),
        Field::new("created_at", DataType::Utf8, true),
        Field::new("hashtag", DataType::Utf8, false),
        Field::new("langs", DataType::Utf8, true),
    ]))
}

/// Converts rows into a single record batch matching [`posts_schema`].
pub fn rows_to_record_batch(rows: &[PostRow]) -> EtlResult<RecordBatch> {
    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.uri.as_str()))),
        Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.cid.as_str()))),
        Arc::new(StringArray::from_iter_values(
            rows.iter().map(|r| r.author.as_str()),
        )),
        Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.text.as_str()))),
        Arc::new(StringArray::from_iter(
            rows.iter().map(|r| r.created_at.as_deref()),
        )),
        Arc::new(StringArray::from_iter_values(
            rows.iter().map(|r| r.hashtag.as_str()),
        )),
        Arc::new(StringArray::from_iter(rows.iter().map(|r| r.langs.as_deref()))),
    ];

    Ok(RecordBatch::try_new(posts_schema(), columns)?)
}

/// Writes batches of posts as timestamped Parquet files in a single directory.
///
/// The directory is append-only from the writer's point of view: a file is created with
/// `create_new` and never reopened.
#[derive(Debug, Clone)]
pub struct ParquetBatchWriter {
    output_dir: PathBuf,
}

impl ParquetBatchWriter {
    /// Creates a writer for `output_dir`, creating the directory if needed.
    pub fn new(output_dir: impl Into<PathBuf>) -> EtlResult<Self> {
        let output_dir = output_dir.into();
        fs::create_dir_all(&output_dir).map_err(|e| {
            etl_error!(
                ErrorKind::DestinationIoError,
                "Failed to create batch output directory",
                output_dir.display(),
                source: e
            )
        })?;

        Ok(Self { output_dir })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Writes `rows` to a new file named after the current UTC time.
    pub fn write(&self, rows: &[PostRow]) -> EtlResult<Option<BatchFile>> {
        self.write_at(rows, Utc::now())
    }

    /// Writes `rows` to a new file named after `now`.
    ///
    /// When a file for the same second already exists, a numeric suffix is appended
    /// (`posts_20240101_000000_1.parquet`), which keeps names in chronological order.
    pub fn write_at(&self, rows: &[PostRow], now: DateTime<Utc>) -> EtlResult<Option<BatchFile>> {
        if rows.is_empty() {
            return Ok(None);
        }

        let batch = rows_to_record_batch(rows)?;
        let (path, file) = self.create_batch_file(now)?;

        if let Err(err) = write_parquet(file, &batch) {
            // A partial file would break every later reload.
            if let Err(remove_err) = fs::remove_file(&path) {
                warn!(path = %path.display(), error = %remove_err, "failed to remove partial batch file");
            }
            return Err(err);
        }

        debug!(path = %path.display(), rows = rows.len(), "wrote parquet batch");

        Ok(Some(BatchFile {
            path,
            rows: rows.len(),
        }))
    }

    /// Lists every batch file in the output directory, sorted by name.
    pub fn batch_files(&self) -> EtlResult<Vec<PathBuf>> {
        let entries = fs::read_dir(&self.output_dir).map_err(|e| {
            etl_error!(
                ErrorKind::DestinationIoError,
                "Failed to list batch output directory",
                self.output_dir.display(),
                source: e
            )
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.is_file() && is_batch_file_name(&path) {
                files.push(path);
            }
        }
        files.sort();

        Ok(files)
    }

    fn create_batch_file(&self, now: DateTime<Utc>) -> EtlResult<(PathBuf, File)> {
        let stem = format!(
            "{BATCH_FILE_PREFIX}{}",
            now.format(BATCH_FILE_TIMESTAMP_FORMAT)
        );

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let name = if attempt == 0 {
                format!("{stem}.{BATCH_FILE_EXTENSION}")
            } else {
                format!("{stem}_{attempt}.{BATCH_FILE_EXTENSION}")
            };
            let path = self.output_dir.join(name);

            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((path, file)),
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(err) => {
                    return Err(etl_error!(
                        ErrorKind::DestinationIoError,
                        "Failed to create batch file",
                        path.display(),
                        source: err
                    ));
                }
            }
        }

        bail!(
            ErrorKind::DestinationIoError,
            "Too many batch files for the same second",
            stem
        );
    }
}

fn write_parquet(file: File, batch: &RecordBatch) -> EtlResult<()> {
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
    writer.write(batch)?;
    writer.close()?;

    Ok(())
}

fn is_batch_file_name(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
        return false;
    };

    name.starts_with(BATCH_FILE_PREFIX)
        && path.extension().and_then(|ext| ext.to_str()) == Some(BATCH_FILE_EXTENSION)
}
