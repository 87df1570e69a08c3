use std::io;

use thiserror::Error;

use crate::operation::OperationKind;

/// Errors that abort a benchmark run.
#[derive(Debug, Error)]
pub enum Error {
    /// A downloaded object or its metadata differs from what was written.
    #[error(
        "check failed for {key}: size {expected_size} == {actual_size} : etag {expected_etag} == {actual_etag}"
    )]
    IntegrityMismatch {
        /// The key of the object.
        key: String,
        /// The etag reported when the object was written.
        expected_etag: String,
        /// The etag reported when reading the object back.
        actual_etag: String,
        /// The size of the written object.
        expected_size: u64,
        /// The size of the object read back.
        actual_size: u64,
    },

    /// A storage request failed for good.
    #[error(transparent)]
    Endpoint(#[from] s3bench_service::Error),

    /// Draining a downloaded object failed.
    #[error("failed to read object contents")]
    Io(#[from] io::Error),

    /// A phase referred to an object the write phase did not record.
    #[error("no object recorded for sequence id {sequence_id}")]
    MissingRecord {
        /// The sequence id that was looked up.
        sequence_id: usize,
    },

    /// The write phase finished without recording every object.
    #[error("expected {expected} recorded objects, found {actual}")]
    IncompleteRegistry {
        /// The number of objects the run was configured with.
        expected: usize,
        /// The number of recorded objects.
        actual: usize,
    },

    /// A phase was started out of order.
    #[error("cannot run {requested} phase, expected {}", display_expected(.expected))]
    PhaseOrder {
        /// The phase due next, or `None` if the run is complete.
        expected: Option<OperationKind>,
        /// The phase that was requested.
        requested: OperationKind,
    },

    /// A worker task panicked or was cancelled.
    #[error("benchmark worker failed")]
    Worker(#[from] tokio::task::JoinError),
}

fn display_expected(expected: &Option<OperationKind>) -> &'static str {
    expected.map_or("no further phase", OperationKind::as_str)
}

/// A convenience alias that defaults our [`Error`] type.
pub type Result<T, E = Error> = std::result::Result<T, E>;
