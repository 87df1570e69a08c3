use thiserror::Error;

use crate::backend::BackendError;

/// Errors returned by an [`Endpoint`](crate::Endpoint) after retries have been applied.
#[derive(Debug, Error)]
pub enum Error {
    /// The object does not exist. This is never retried.
    #[error("not found: {key}")]
    NotFound {
        /// The key that was requested.
        key: String,
    },

    /// The request kept failing until the attempt budget was used up.
    #[error("giving up on `{key}` after {attempts} attempts")]
    RetryExhausted {
        /// The key of the failed request.
        key: String,
        /// The number of attempts made, including the initial one.
        attempts: u32,
        /// The error of the last attempt.
        #[source]
        source: BackendError,
    },

    /// The backend accepted an object but did not report its etag.
    #[error("expected to get an etag from the backend for `{key}`")]
    MissingEtag {
        /// The key of the written object.
        key: String,
    },

    /// An error the retry policy refused to retry.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// An [`EndpointPool`](crate::EndpointPool) needs at least one endpoint.
    #[error("no endpoints configured")]
    EmptyPool,
}

/// A convenience alias that defaults our [`Error`] type.
pub type Result<T, E = Error> = std::result::Result<T, E>;
