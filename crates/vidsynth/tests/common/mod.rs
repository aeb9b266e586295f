//! Shared test utilities for vidsynth integration tests.
//!
//! This module provides:
//! - `TestHarness` for isolated workflow runs with temp directories
//! - Builders for requests and provider sets backed by the fakes

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::TestHarness;
