//! Sinks for matched posts.
//!
//! This module provides the [`Destination`] trait and its implementations: Parquet batch files
//! backed by a DuckDB warehouse for production, and an in-memory destination for tests.

mod base;
pub mod duckdb;
pub mod memory;
pub mod parquet;
pub mod parquet_duckdb;

pub use base::Destination;
