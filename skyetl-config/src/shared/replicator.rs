use serde::Deserialize;

use crate::Config;
use crate::shared::{BskyConfig, DestinationConfig, PipelineConfig, SourceConfig, ValidationError};

/// Complete configuration of the replicator service.
///
/// This intentionally does not implement [`serde::Serialize`] to avoid leaking secrets.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplicatorConfig {
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub bsky: BskyConfig,
    pub destination: DestinationConfig,
}

impl ReplicatorConfig {
    /// Validates the complete replicator configuration.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.pipeline.validate()?;
        self.destination.validate()
    }
}

impl Config for ReplicatorConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &["pipeline.hashtags"];
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn deserializes_duck_db_destination() {
        let config: ReplicatorConfig = serde_json::from_str(
            r##"{
                "pipeline": {"hashtags": ["#DataBS", "datasky"]},
                "destination": {"duck_db": {"database": "md:posts"}}
            }"##,
        )
        .unwrap();

        assert_eq!(
            config.destination,
            DestinationConfig::DuckDb {
                output_dir: PathBuf::from("data"),
                database: Some("md:posts".to_string()),
                pool_size: 4,
            }
        );
        assert_eq!(config.source, SourceConfig::default());
        assert_eq!(config.bsky.service_url, "https://bsky.social");
        assert!(config.bsky.password.is_none());
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn deserializes_memory_destination() {
        let config: ReplicatorConfig = serde_json::from_str(
            r#"{"pipeline": {"hashtags": ["databs"]}, "destination": "memory"}"#,
        )
        .unwrap();

        assert_eq!(config.destination, DestinationConfig::Memory);
    }

    #[test]
    fn zero_pool_size_is_rejected() {
        let config: ReplicatorConfig = serde_json::from_str(
            r#"{
                "pipeline": {"hashtags": ["databs"]},
                "destination": {"duck_db": {"pool_size": 0}}
            }"#,
        )
        .unwrap();

        assert!(config.validate().is_err());
    }
}
