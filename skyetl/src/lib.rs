mod macros;

pub mod clients;
pub mod concurrency;
pub mod conversions;
pub mod destination;
pub mod encryption;
pub mod error;
pub mod filter;
pub mod ingest;
pub mod metrics;
pub mod pipeline;
pub mod source;
pub mod state;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;
pub mod workers;
