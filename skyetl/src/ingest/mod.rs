//! Ingestion logic shared by the pipeline workers.

pub mod backfill;
pub mod batch;
pub mod commit;

pub use backfill::{BackfillReport, run_backfill};
pub use batch::{BatchFlusher, FlushReport, FlushTrigger};
pub use commit::{CommitProcessor, CommitResult, OpOutcome};
