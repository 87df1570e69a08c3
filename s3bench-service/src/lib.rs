//! The transport layer of the benchmark.
//!
//! This crate models a storage bucket as a [`Backend`](backend::Backend) and layers the benchmark's
//! request semantics on top of it: every call of an [`Endpoint`] is bounded by a timeout and
//! retried according to a [`RetryPolicy`], whose decisions are driven by the [`ErrorClass`] of a
//! failure. An [`EndpointPool`] shards benchmark workers across several endpoints.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod backend;
pub mod classify;
mod endpoint;
mod error;
mod pool;
pub mod retry;

pub use classify::ErrorClass;
pub use endpoint::{Endpoint, EndpointConfig, GetResult, PutResult};
pub use error::{Error, Result};
pub use pool::{EndpointId, EndpointPool};
pub use retry::RetryPolicy;
