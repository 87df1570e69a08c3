use std::fmt::Debug;
use std::io;
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::BoxStream;
use thiserror::Error;

/// A type-erased [`Backend`] instance.
pub type BoxedBackend = Box<dyn Backend>;

/// The streamed contents of an object.
pub type PayloadStream = BoxStream<'static, io::Result<Bytes>>;

/// Metadata the backend reports for a stored object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectStat {
    /// The backend-supplied content identifier, without surrounding quotes.
    pub etag: String,
    /// The object size in bytes.
    pub size: u64,
    /// The last-modified timestamp as reported by the backend, if any.
    pub last_modified: Option<String>,
}

/// Response of a successful [`Backend::put_object`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PutResponse {
    /// The etag returned by the backend. Some backends may omit it.
    pub etag: Option<String>,
}

/// The raw storage transport of one bucket.
///
/// Implementations do not retry. Retries, timeouts and error translation are layered on top by
/// [`Endpoint`](crate::Endpoint).
#[async_trait::async_trait]
pub trait Backend: Debug + Send + Sync + 'static {
    /// The backend name, used for diagnostics.
    fn name(&self) -> &'static str;

    /// Stores `contents` at `key`, overwriting any existing object.
    async fn put_object(&self, key: &str, contents: Bytes) -> BackendResult<PutResponse>;

    /// Retrieves the metadata of the object at `key`.
    async fn head_object(&self, key: &str) -> BackendResult<ObjectStat>;

    /// Retrieves the object at `key`, returning its metadata and a stream of its contents.
    async fn get_object(&self, key: &str) -> BackendResult<(ObjectStat, PayloadStream)>;

    /// Deletes the object at `key`.
    async fn delete_object(&self, key: &str) -> BackendResult<()>;

    /// Copies the object at `src` to `dst` within the same bucket.
    async fn copy_object(&self, dst: &str, src: &str) -> BackendResult<()>;
}

/// Errors reported by a storage [`Backend`].
#[derive(Debug, Error)]
pub enum BackendError {
    /// The requested object does not exist.
    #[error("object not found")]
    NotFound,

    /// The backend answered with an unsuccessful HTTP status.
    #[error("unexpected status {status}: {body}")]
    Status {
        /// The HTTP status code.
        status: u16,
        /// The (possibly empty) response body.
        body: String,
    },

    /// The HTTP transport failed before a response arrived, e.g. a refused connection.
    #[error("transport error: {context}")]
    Transport {
        /// What the backend was doing.
        context: String,
        /// The client error.
        #[source]
        cause: Box<dyn std::error::Error + Send + Sync>,
    },

    /// IO errors related to payload streaming or the underlying sockets.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// The request did not complete within the configured timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Any other error stemming from one of the storage backends.
    #[error("storage backend error: {context}")]
    Generic {
        /// What the backend was doing.
        context: String,
        /// The underlying error.
        #[source]
        cause: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Removes the double quotes S3-compatible services put around etags.
pub fn strip_etag(etag: &str) -> String {
    etag.replace('"', "")
}
