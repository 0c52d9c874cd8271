//! Configuration types shared by the skyetl crates.

mod backfill;
mod base;
mod batch;
mod bsky;
mod destination;
mod pipeline;
mod replicator;
mod source;

pub use backfill::BackfillConfig;
pub use base::ValidationError;
pub use batch::BatchConfig;
pub use bsky::BskyConfig;
pub use destination::DestinationConfig;
pub use pipeline::PipelineConfig;
pub use replicator::ReplicatorConfig;
pub use source::SourceConfig;
