//! DuckDB warehouse rebuilt from Parquet batch files.

use duckdb::DuckdbConnectionManager;
use r2d2::{Pool, PooledConnection};
use std::path::PathBuf;
use tracing::debug;

use crate::destination::parquet::posts_schema;
use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;

/// Name of the warehouse table holding every persisted post row.
pub const POSTS_TABLE: &str = "posts";

/// A DuckDB database whose `posts` table mirrors the batch files on disk.
///
/// The database may be a local file, an in-memory database or a MotherDuck `md:` path. An
/// [`r2d2`] pool keeps connections open between reloads while DuckDB's synchronous API runs on
/// the blocking thread pool.
#[derive(Clone)]
pub struct DuckDbWarehouse {
    pool: Pool<DuckdbConnectionManager>,
}

impl DuckDbWarehouse {
    /// Opens the database at `path`, creating it if it does not exist.
    pub fn new(path: impl Into<String>, pool_size: u32) -> EtlResult<Self> {
        let path = path.into();
        let manager = DuckdbConnectionManager::file(&path).map_err(|e| {
            etl_error!(
                ErrorKind::DestinationConnectionFailed,
                "Failed to create DuckDB connection manager",
                path,
                source: e
            )
        })?;

        Self::from_manager(manager, pool_size)
    }

    /// Opens a private in-memory database, destroyed with the last pooled connection.
    pub fn new_in_memory(pool_size: u32) -> EtlResult<Self> {
        let manager = DuckdbConnectionManager::memory().map_err(|e| {
            etl_error!(
                ErrorKind::DestinationConnectionFailed,
                "Failed to create in-memory DuckDB connection manager",
                source: e
            )
        })?;

        Self::from_manager(manager, pool_size)
    }

    fn from_manager(manager: DuckdbConnectionManager, pool_size: u32) -> EtlResult<Self> {
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(|e| {
                etl_error!(
                    ErrorKind::DestinationConnectionFailed,
                    "Failed to build DuckDB connection pool",
                    source: e
                )
            })?;

        Ok(Self { pool })
    }

    /// Replaces the `posts` table with the union of `files` and returns its row count.
    ///
    /// With no files the table is replaced by an empty one, so rows from files that no longer
    /// exist never survive a reload.
    pub async fn reload(&self, files: Vec<PathBuf>) -> EtlResult<u64> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> EtlResult<u64> {
            let conn = get_connection(&pool)?;
            let sql = build_reload_sql(&files);
            debug!(files = files.len(), "reloading warehouse table");

            conn.execute_batch(&sql).map_err(|e| {
                etl_error!(
                    ErrorKind::DestinationQueryFailed,
                    "DuckDB table reload failed",
                    source: e
                )
            })?;

            count_rows(&conn)
        })
        .await
        .map_err(|_| {
            etl_error!(
                ErrorKind::DestinationTaskPanic,
                "DuckDB blocking task panicked"
            )
        })?
    }

    /// Returns the current row count of the `posts` table.
    pub async fn count(&self) -> EtlResult<u64> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> EtlResult<u64> {
            let conn = get_connection(&pool)?;
            count_rows(&conn)
        })
        .await
        .map_err(|_| {
            etl_error!(
                ErrorKind::DestinationTaskPanic,
                "DuckDB blocking task panicked"
            )
        })?
    }
}

fn get_connection(
    pool: &Pool<DuckdbConnectionManager>,
) -> EtlResult<PooledConnection<DuckdbConnectionManager>> {
    pool.get().map_err(|e| {
        etl_error!(
            ErrorKind::DestinationConnectionFailed,
            "Failed to get DuckDB connection from pool",
            source: e
        )
    })
}

fn count_rows(conn: &duckdb::Connection) -> EtlResult<u64> {
    let count: i64 = conn
        .query_row(&format!("SELECT COUNT(*) FROM \"{POSTS_TABLE}\""), [], |row| {
            row.get(0)
        })
        .map_err(|e| {
            etl_error!(
                ErrorKind::DestinationQueryFailed,
                "DuckDB row count failed",
                source: e
            )
        })?;

    Ok(count.max(0) as u64)
}

/// Builds the statement that replaces the posts table with the contents of `files`.
pub fn build_reload_sql(files: &[PathBuf]) -> String {
    if files.is_empty() {
        return build_empty_table_sql();
    }

    let files = files
        .iter()
        .map(|file| quote_literal(&file.to_string_lossy()))
        .collect::<Vec<_>>()
        .join(", ");

    format!("CREATE OR REPLACE TABLE \"{POSTS_TABLE}\" AS SELECT * FROM read_parquet([{files}])")
}

fn build_empty_table_sql() -> String {
    let columns = posts_schema()
        .fields()
        .iter()
        .map(|field| {
            let null = if field.is_nullable() { "" } else { " NOT NULL" };
            format!("\"{}\" VARCHAR{null}", field.name())
        })
        .collect::<Vec<_>>()
        .join(", ");

    format!("CREATE OR REPLACE TABLE \"{POSTS_TABLE}\" ({columns})")
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reload_sql_lists_every_file() {
        let sql = build_reload_sql(&[
            PathBuf::from("data/posts_20240101_000000.parquet"),
            PathBuf::from("data/o'brien/posts_20240101_000001.parquet"),
        ]);

        assert_eq!(
            sql,
            "CREATE OR REPLACE TABLE \"posts\" AS SELECT * FROM read_parquet(['data/posts_20240101_000000.parquet', 'data/o''brien/posts_20240101_000001.parquet'])"
        );
    }

    #[test]
    fn reload_sql_without_files_creates_an_empty_table() {
        assert_eq!(
            build_reload_sql(&[]),
            "CREATE OR REPLACE TABLE \"posts\" (\"uri\" VARCHAR NOT NULL, \"cid\" VARCHAR NOT NULL, \"author\" VARCHAR NOT NULL, \"text\" VARCHAR NOT NULL, \"created_at\" VARCHAR, \"hashtag\" VARCHAR NOT NULL, \"langs\" VARCHAR)"
        );
    }

    #[tokio::test]
    async fn reload_without_files_creates_an_empty_table() {
        let warehouse = DuckDbWarehouse::new_in_memory(1).unwrap();

        assert_eq!(warehouse.reload(vec![]).await.unwrap(), 0);
        assert_eq!(warehouse.count().await.unwrap(), 0);
    }
}
