use std::future::Future;

use crate::error::EtlResult;
use crate::types::{BatchFile, PostRow};

/// Trait for sinks that store batches of matched posts.
///
/// A [`Destination`] keeps an append-only history of persisted batches and can rebuild its
/// queryable view from that history at any time. Calls to [`Destination::persist`] and
/// [`Destination::reload`] are serialized by the pipeline, so implementations do not need to
/// guard against two flushes running at once.
///
/// The trait also provides an optional [`Destination::shutdown`] method with a default no-op
/// implementation.
pub trait Destination {
    /// Returns the name of the destination.
    fn name() -> &'static str;

    /// Propagates the shutdown signal to the destination.
    ///
    /// Called once, after the final flush. The default implementation is a no-op.
    fn shutdown(&self) -> impl Future<Output = EtlResult<()>> + Send {
        async { Ok(()) }
    }

    /// Persists `rows` as a new batch.
    ///
    /// Returns `None` without side effects when `rows` is empty. Existing batches are never
    /// rewritten or merged.
    fn persist(
        &self,
        rows: Vec<PostRow>,
    ) -> impl Future<Output = EtlResult<Option<BatchFile>>> + Send;

    /// Rebuilds the queryable view from every persisted batch and returns its row count.
    ///
    /// Reloading is idempotent: two calls with no persist in between return the same count.
    fn reload(&self) -> impl Future<Output = EtlResult<u64>> + Send;
}
