//! Storage transports the benchmark can run against.

pub mod common;
pub mod in_memory;
pub mod s3_compatible;

pub use common::{
    Backend, BackendError, BackendResult, BoxedBackend, ObjectStat, PayloadStream, PutResponse,
};
pub use in_memory::{BackendOp, Fault, InMemoryBackend};
pub use s3_compatible::{S3CompatibleBackend, S3CompatibleBackendConfig};
