use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::shared::ValidationError;

const fn default_pool_size() -> u32 {
    DestinationConfig::DEFAULT_POOL_SIZE
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(DestinationConfig::DEFAULT_OUTPUT_DIR)
}

/// Where matched posts are stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DestinationConfig {
    /// Keeps batches in process memory. Everything is lost on exit.
    Memory,
    /// Writes Parquet batch files and reloads them into a DuckDB table.
    DuckDb {
        /// Directory receiving one Parquet file per flushed batch.
        #[serde(default = "default_output_dir")]
        output_dir: PathBuf,
        /// DuckDB database: a file path, `:memory:` or a MotherDuck `md:` path.
        ///
        /// Defaults to an in-memory database.
        database: Option<String>,
        /// Maximum number of pooled DuckDB connections.
        #[serde(default = "default_pool_size")]
        pool_size: u32,
    },
}

impl DestinationConfig {
    pub const DEFAULT_POOL_SIZE: u32 = 4;

    pub const DEFAULT_OUTPUT_DIR: &'static str = "data";

    pub fn validate(&self) -> Result<(), ValidationError> {
        if let DestinationConfig::DuckDb { pool_size: 0, .. } = self {
            return Err(ValidationError::InvalidFieldValue {
                field: "destination.duck_db.pool_size".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}
