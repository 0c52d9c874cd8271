use skyetl_config::shared::{BackfillConfig, BatchConfig, PipelineConfig};

use crate::destination::Destination;
use crate::pipeline::Pipeline;
use crate::source::EventSource;

/// Builds a pipeline configuration for `hashtags` with a long flush interval, so that tests
/// only observe timer flushes they explicitly wait for.
pub fn test_pipeline_config(hashtags: &[&str], max_size: usize) -> PipelineConfig {
    PipelineConfig {
        hashtags: hashtags.iter().map(|tag| tag.to_string()).collect(),
        batch: BatchConfig {
            max_size,
            flush_interval_secs: 3600,
        },
        backfill: BackfillConfig::default(),
    }
}

/// Creates a pipeline over `source` and `destination` with [`test_pipeline_config`].
pub fn create_pipeline<E, D>(
    hashtags: &[&str],
    max_size: usize,
    source: E,
    destination: D,
) -> Pipeline<E, D>
where
    E: EventSource + Send + 'static,
    D: Destination + Clone + Send + Sync + 'static,
{
    Pipeline::new(test_pipeline_config(hashtags, max_size), source, destination)
}
