//! Test utilities for the benchmark crates.
//!
//! See the modules for all available utilities.

pub mod tracing;
