//! A storage bucket wrapped with retries and timeouts.

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;

use crate::backend::{
    BackendError, BackendResult, BoxedBackend, InMemoryBackend, ObjectStat, PayloadStream,
    S3CompatibleBackend, S3CompatibleBackendConfig,
};
use crate::error::{Error, Result};
use crate::retry::RetryPolicy;

/// Describes the transport of an [`Endpoint`].
#[derive(Clone, Debug)]
pub enum EndpointConfig {
    /// An S3-compatible service, addressed path-style.
    S3Compatible(S3CompatibleBackendConfig),
    /// A process-local store, see [`InMemoryBackend`].
    InMemory(InMemoryBackend),
}

/// The result of a successful [`Endpoint::put`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PutResult {
    /// The etag of the stored object, without surrounding quotes.
    pub etag: String,
    /// The number of bytes stored.
    pub size: u64,
}

/// The result of a successful [`Endpoint::get`].
pub struct GetResult {
    /// Metadata reported alongside the contents.
    pub stat: ObjectStat,
    /// The object contents. Errors while draining this stream are not retried.
    pub stream: PayloadStream,
}

impl std::fmt::Debug for GetResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GetResult")
            .field("stat", &self.stat)
            .finish_non_exhaustive()
    }
}

/// One benchmark target, usually a bucket.
///
/// Every call is bounded by the request timeout and retried according to the endpoint's
/// [`RetryPolicy`]. The policy also keeps the number of recoverable errors seen by this endpoint.
#[derive(Debug)]
pub struct Endpoint {
    name: String,
    backend: BoxedBackend,
    retry: RetryPolicy,
    timeout: Option<Duration>,
}

impl Endpoint {
    /// Creates an endpoint from an existing backend.
    pub fn new(
        name: impl Into<String>,
        backend: BoxedBackend,
        retry: RetryPolicy,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            name: name.into(),
            backend,
            retry,
            timeout,
        }
    }

    /// Creates an endpoint, constructing its backend from `config`.
    ///
    /// S3 endpoints adopt the configured request timeout for the wrapper as well.
    pub fn from_config(
        name: impl Into<String>,
        config: EndpointConfig,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let (backend, timeout): (BoxedBackend, _) = match config {
            EndpointConfig::S3Compatible(config) => {
                let timeout = config.request_timeout;
                (Box::new(S3CompatibleBackend::new(config)?), timeout)
            }
            EndpointConfig::InMemory(backend) => (Box::new(backend), None),
        };

        Ok(Self::new(name, backend, retry, timeout))
    }

    /// The name of this endpoint, usually the bucket name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The retry policy wrapping every call.
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// The number of recoverable errors since the last reset.
    pub fn retry_count(&self) -> u64 {
        self.retry.retry_count()
    }

    /// Counts a recoverable error handled by the caller.
    pub fn record_retry(&self) {
        self.retry.record_retry();
    }

    /// Resets the recoverable error counter.
    pub fn reset_retries(&self) {
        self.retry.reset();
    }

    async fn bounded<T>(
        &self,
        request: impl Future<Output = BackendResult<T>>,
    ) -> BackendResult<T> {
        match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, request)
                .await
                .unwrap_or(Err(BackendError::Timeout(timeout))),
            None => request.await,
        }
    }

    /// Stores `contents` at `key`.
    ///
    /// Fails with [`Error::MissingEtag`] if the backend accepts the object without an etag.
    pub async fn put(&self, key: &str, contents: Bytes) -> Result<PutResult> {
        let size = contents.len() as u64;
        let response = self
            .retry
            .run(key, || self.bounded(self.backend.put_object(key, contents.clone())))
            .await?;

        let etag = response.etag.ok_or_else(|| Error::MissingEtag {
            key: key.to_owned(),
        })?;
        Ok(PutResult { etag, size })
    }

    /// Retrieves the metadata of the object at `key`.
    pub async fn head(&self, key: &str) -> Result<ObjectStat> {
        self.retry
            .run(key, || self.bounded(self.backend.head_object(key)))
            .await
    }

    /// Retrieves the object at `key`.
    pub async fn get(&self, key: &str) -> Result<GetResult> {
        let (stat, stream) = self
            .retry
            .run(key, || self.bounded(self.backend.get_object(key)))
            .await?;
        Ok(GetResult { stat, stream })
    }

    /// Deletes the object at `key`.
    pub async fn delete(&self, key: &str) -> Result<()> {
        self.retry
            .run(key, || self.bounded(self.backend.delete_object(key)))
            .await
    }

    /// Copies the object at `src` to `dst`. A missing source fails with [`Error::NotFound`].
    pub async fn copy(&self, dst: &str, src: &str) -> Result<()> {
        self.retry
            .run(src, || self.bounded(self.backend.copy_object(dst, src)))
            .await
    }
}
