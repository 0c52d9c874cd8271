//! Testing utilities for the ingestion pipeline.
//!
//! Builders produce wire-accurate frames, archives and records so tests exercise the real
//! decoders. The stub source, search client and destination wrapper let pipeline tests run
//! without network access.

pub mod builders;
pub mod notify;
pub mod pipeline;
pub mod search;
pub mod source;
pub mod test_destination_wrapper;
