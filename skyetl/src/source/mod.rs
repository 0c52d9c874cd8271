//! Upstream event subscriptions.

mod base;
pub mod firehose;

pub use base::EventSource;
