//! An object storage throughput benchmark.
//!
//! This builds on top of [`s3bench_service`] and drives four strictly sequential phases against a
//! pool of S3-compatible buckets: *Write*, *Read*, *Stat* and *Remove*. While a phase runs, a live
//! sampler prints the operation rate every second. Reads and stats verify the etag and size of
//! every object against what the write phase recorded.
//!
//! The [`timeseries`] module implements the offline side: it merges the sample lines of several
//! benchmark logs and reports the peak rate of every operation.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod cli;
pub mod config;
pub mod driver;
pub mod error;
pub mod observability;
pub mod operation;
pub mod registry;
pub mod sampler;
pub mod timeseries;
pub mod workload;

pub use driver::{BenchmarkDriver, DriverOptions, DriverState, PhaseSummary};
pub use error::{Error, Result};
pub use operation::OperationKind;
