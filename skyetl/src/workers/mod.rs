//! Long-running tasks spawned by the pipeline.

pub mod flush;
pub mod ingest;
