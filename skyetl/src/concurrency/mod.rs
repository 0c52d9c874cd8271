//! Concurrency primitives for coordinating the pipeline workers.

pub mod shutdown;
