use serde::{Deserialize, Serialize};

use crate::shared::{BackfillConfig, BatchConfig, ValidationError};

/// Configuration of the ingestion pipeline.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct PipelineConfig {
    /// Hashtags to collect, with or without a leading `#`. Matching is case-insensitive.
    pub hashtags: Vec<String>,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub backfill: BackfillConfig,
}

impl PipelineConfig {
    /// Validates pipeline configuration settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.hashtags.is_empty() {
            return Err(ValidationError::NoHashtags);
        }

        if let Some(position) = self
            .hashtags
            .iter()
            .position(|tag| tag.trim().trim_start_matches('#').trim().is_empty())
        {
            return Err(ValidationError::EmptyHashtag(position));
        }

        self.batch.validate()?;
        self.backfill.validate()
    }
}
