//! Logging and metrics setup shared by the skyetl binaries and tests.

pub mod metrics;
pub mod tracing;
