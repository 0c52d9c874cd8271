use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::shared::ValidationError;

/// Batching and flush timing for the ingestion pipeline.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct BatchConfig {
    /// Number of buffered rows that triggers an immediate flush.
    #[serde(default = "default_batch_max_size")]
    pub max_size: usize,
    /// Seconds between two timer-driven flushes.
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,
}

impl BatchConfig {
    pub const DEFAULT_MAX_SIZE: usize = 700;

    pub const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 60;

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_size == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "pipeline.batch.max_size".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        if self.flush_interval_secs == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "pipeline.batch.flush_interval_secs".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_size: default_batch_max_size(),
            flush_interval_secs: default_flush_interval_secs(),
        }
    }
}

fn default_batch_max_size() -> usize {
    BatchConfig::DEFAULT_MAX_SIZE
}

fn default_flush_interval_secs() -> u64 {
    BatchConfig::DEFAULT_FLUSH_INTERVAL_SECS
}
