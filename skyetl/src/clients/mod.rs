//! Clients for external services.

pub mod bsky;

pub use bsky::{BskyClient, PostSearch};
