use bytes::Bytes;
use std::future::Future;

use crate::error::EtlResult;

/// Trait for upstream subscriptions delivering raw repository event frames.
///
/// Frames must be returned in the order upstream delivered them. A source is read by a single
/// worker, so implementations only need `&mut self` access.
pub trait EventSource {
    /// Returns the name of the source.
    fn name() -> &'static str;

    /// Returns the next binary frame.
    ///
    /// Returns `Ok(None)` when the source is exhausted and will never produce another frame.
    /// The returned future must be cancel safe: the worker drops it when shutdown is signalled.
    fn next_frame(&mut self) -> impl Future<Output = EtlResult<Option<Bytes>>> + Send;

    /// Releases the underlying connection.
    ///
    /// The default implementation is a no-op.
    fn close(&mut self) -> impl Future<Output = ()> + Send {
        async {}
    }
}
