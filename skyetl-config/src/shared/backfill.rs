use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Historical search run once before live ingestion starts.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct BackfillConfig {
    /// Whether to search for already published posts at startup.
    ///
    /// When disabled no Bluesky credentials are required.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Posts requested per search page.
    #[serde(default = "default_page_limit")]
    pub page_limit: u32,
}

impl BackfillConfig {
    pub const DEFAULT_PAGE_LIMIT: u32 = 25;

    /// Largest page the search endpoint accepts.
    pub const MAX_PAGE_LIMIT: u32 = 100;

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(1..=Self::MAX_PAGE_LIMIT).contains(&self.page_limit) {
            return Err(ValidationError::InvalidFieldValue {
                field: "pipeline.backfill.page_limit".to_string(),
                constraint: format!("must be between 1 and {}", Self::MAX_PAGE_LIMIT),
            });
        }

        Ok(())
    }
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            page_limit: default_page_limit(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_page_limit() -> u32 {
    BackfillConfig::DEFAULT_PAGE_LIMIT
}
