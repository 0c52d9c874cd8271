//! Metrics definitions for ingestion monitoring.

/// Label for the destination name in metrics.
pub const DESTINATION_LABEL: &str = "destination";

/// Label for the flush trigger in metrics.
pub const TRIGGER_LABEL: &str = "trigger";

/// Label for the error kind in metrics.
pub const ERROR_KIND_LABEL: &str = "error_kind";

// Ingest metrics

/// Counter for upstream frames received.
pub const SKYETL_FRAMES_RECEIVED_TOTAL: &str = "skyetl_frames_received_total";

/// Counter for upstream frames that could not be decoded.
pub const SKYETL_FRAMES_MALFORMED_TOTAL: &str = "skyetl_frames_malformed_total";

/// Counter for commits received.
pub const SKYETL_COMMITS_RECEIVED_TOTAL: &str = "skyetl_commits_received_total";

/// Counter for commits skipped because upstream did not inline their blocks.
pub const SKYETL_COMMITS_TOO_BIG_TOTAL: &str = "skyetl_commits_too_big_total";

/// Counter for post records decoded from commits.
pub const SKYETL_RECORDS_DECODED_TOTAL: &str = "skyetl_records_decoded_total";

/// Counter for posts matching at least one hashtag.
pub const SKYETL_POSTS_MATCHED_TOTAL: &str = "skyetl_posts_matched_total";

/// Counter for matching posts skipped as duplicates.
pub const SKYETL_POSTS_DUPLICATE_TOTAL: &str = "skyetl_posts_duplicate_total";

/// Counter for rows appended to the batch buffer.
pub const SKYETL_ROWS_BUFFERED_TOTAL: &str = "skyetl_rows_buffered_total";

/// Gauge for rows currently waiting in the batch buffer.
pub const SKYETL_BUFFERED_ROWS: &str = "skyetl_buffered_rows";

/// Gauge for post keys held by the dedup set.
pub const SKYETL_SEEN_POSTS: &str = "skyetl_seen_posts";

// Flush metrics

/// Counter for batches persisted.
pub const SKYETL_BATCHES_PERSISTED_TOTAL: &str = "skyetl_batches_persisted_total";

/// Counter for rows persisted.
pub const SKYETL_ROWS_PERSISTED_TOTAL: &str = "skyetl_rows_persisted_total";

/// Counter for failed persists. Rows of a failed persist are lost.
pub const SKYETL_PERSIST_FAILURES_TOTAL: &str = "skyetl_persist_failures_total";

/// Counter for failed warehouse reloads.
pub const SKYETL_RELOAD_FAILURES_TOTAL: &str = "skyetl_reload_failures_total";

/// Gauge for the warehouse row count after the last reload.
pub const SKYETL_WAREHOUSE_ROWS: &str = "skyetl_warehouse_rows";

/// Histogram for persist plus reload duration in seconds.
pub const SKYETL_FLUSH_DURATION_SECONDS: &str = "skyetl_flush_duration_seconds";

// Source metrics

/// Counter for upstream connection attempts.
pub const SKYETL_SOURCE_CONNECTION_ATTEMPTS_TOTAL: &str = "skyetl_source_connection_attempts_total";

/// Gauge for consecutive upstream connection failures.
pub const SKYETL_SOURCE_CONSECUTIVE_FAILURES: &str = "skyetl_source_consecutive_failures";
