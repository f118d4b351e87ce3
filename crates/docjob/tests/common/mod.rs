//! Shared test utilities for docjob integration tests.
//!
//! This module provides:
//! - `TestHarness` wiring a coordinator to a SQLite store in a temp directory
//! - Builders for backdated job records and config JSON

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::TestHarness;
