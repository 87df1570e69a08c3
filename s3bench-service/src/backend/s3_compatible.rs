use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{StreamExt, stream};
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::request::ResponseData;
use s3::{Bucket, Region};

use super::common::{
    Backend, BackendError, BackendResult, ObjectStat, PayloadStream, PutResponse, strip_etag,
};

/// Configuration of an [`S3CompatibleBackend`].
#[derive(Clone, Debug, Default)]
pub struct S3CompatibleBackendConfig {
    /// Base URL of the service, e.g. `https://example.r2.cloudflarestorage.com:443`.
    pub url: String,
    /// The bucket all requests go to.
    pub bucket: String,
    /// The signing region, `auto` for most S3-compatible services.
    pub region: String,
    /// Static access key. Anonymous requests are sent if unset.
    pub access_key: Option<String>,
    /// Static secret key.
    pub secret_key: Option<String>,
    /// Upper bound for a single request, including connection setup.
    pub request_timeout: Option<Duration>,
}

/// A backend talking to an S3-compatible service with path-style addressing.
pub struct S3CompatibleBackend {
    bucket: Box<Bucket>,
}

impl S3CompatibleBackend {
    /// Creates a new S3 compatible backend bound to the given bucket.
    pub fn new(config: S3CompatibleBackendConfig) -> BackendResult<Self> {
        let credentials = Credentials::new(
            config.access_key.as_deref(),
            config.secret_key.as_deref(),
            None,
            None,
            None,
        )
        .map_err(|cause| BackendError::Generic {
            context: "invalid S3 credentials".into(),
            cause: Box::new(cause),
        })?;

        let region = Region::Custom {
            region: config.region,
            endpoint: config.url,
        };

        let mut bucket = Bucket::new(&config.bucket, region, credentials)
            .map_err(|err| from_s3_error("failed to create bucket handle", err))?
            .with_path_style();

        if let Some(request_timeout) = config.request_timeout {
            bucket = bucket
                .with_request_timeout(request_timeout)
                .map_err(|err| from_s3_error("failed to configure request timeout", err))?;
        }

        Ok(Self { bucket })
    }
}

impl fmt::Debug for S3CompatibleBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Compatible")
            .field("bucket", &self.bucket.name())
            .field("endpoint", &self.bucket.host())
            .finish_non_exhaustive()
    }
}

fn from_s3_error(context: &str, error: S3Error) -> BackendError {
    match error {
        S3Error::HttpFailWithBody(404, _) => BackendError::NotFound,
        S3Error::HttpFailWithBody(status, body) => BackendError::Status { status, body },
        S3Error::Hyper(cause) => BackendError::Transport {
            context: context.to_owned(),
            cause: Box::new(cause),
        },
        S3Error::Http(cause) => BackendError::Generic {
            context: format!("{context}: invalid request"),
            cause: Box::new(cause),
        },
        S3Error::Io(err) => BackendError::Io(err),
        other => BackendError::Generic {
            context: context.to_owned(),
            cause: Box::new(other),
        },
    }
}

fn check_status(status: u16, body: &[u8]) -> BackendResult<()> {
    match status {
        404 => Err(BackendError::NotFound),
        200..=299 => Ok(()),
        status => Err(BackendError::Status {
            status,
            body: String::from_utf8_lossy(body).into_owned(),
        }),
    }
}

fn check_response(response: &ResponseData) -> BackendResult<()> {
    check_status(response.status_code(), response.bytes())
}

#[async_trait::async_trait]
impl Backend for S3CompatibleBackend {
    fn name(&self) -> &'static str {
        "s3-compatible"
    }

    #[tracing::instrument(level = "trace", fields(?key), skip_all)]
    async fn put_object(&self, key: &str, contents: Bytes) -> BackendResult<PutResponse> {
        tracing::trace!(size = contents.len(), "Writing to s3_compatible backend");
        let response = self
            .bucket
            .put_object(key, &contents)
            .await
            .map_err(|err| from_s3_error("failed to put object", err))?;
        check_response(&response)?;

        let etag = response.headers().get("etag").map(|etag| strip_etag(etag));
        Ok(PutResponse { etag })
    }

    #[tracing::instrument(level = "trace", fields(?key), skip_all)]
    async fn head_object(&self, key: &str) -> BackendResult<ObjectStat> {
        tracing::trace!("Stating in s3_compatible backend");
        let (head, status) = self
            .bucket
            .head_object(key)
            .await
            .map_err(|err| from_s3_error("failed to head object", err))?;
        check_status(status, &[])?;

        Ok(ObjectStat {
            etag: head.e_tag.as_deref().map(strip_etag).unwrap_or_default(),
            size: head
                .content_length
                .and_then(|len| u64::try_from(len).ok())
                .unwrap_or_default(),
            last_modified: head.last_modified,
        })
    }

    #[tracing::instrument(level = "trace", fields(?key), skip_all)]
    async fn get_object(&self, key: &str) -> BackendResult<(ObjectStat, PayloadStream)> {
        tracing::trace!("Reading from s3_compatible backend");
        let response = self
            .bucket
            .get_object(key)
            .await
            .map_err(|err| from_s3_error("failed to get object", err))?;
        check_response(&response)?;

        let headers = response.headers();
        let bytes = Bytes::from(response.to_vec());
        let stat = ObjectStat {
            etag: headers
                .get("etag")
                .map(|etag| strip_etag(etag))
                .unwrap_or_default(),
            size: headers
                .get("content-length")
                .and_then(|len| len.parse().ok())
                .unwrap_or(bytes.len() as u64),
            last_modified: headers.get("last-modified").cloned(),
        };

        let stream = stream::once(async move { Ok(bytes) }).boxed();
        Ok((stat, stream))
    }

    #[tracing::instrument(level = "trace", fields(?key), skip_all)]
    async fn delete_object(&self, key: &str) -> BackendResult<()> {
        tracing::trace!("Deleting from s3_compatible backend");
        let response = self
            .bucket
            .delete_object(key)
            .await
            .map_err(|err| from_s3_error("failed to delete object", err))?;
        check_response(&response)
    }

    #[tracing::instrument(level = "trace", fields(?dst, ?src), skip_all)]
    async fn copy_object(&self, dst: &str, src: &str) -> BackendResult<()> {
        tracing::trace!("Copying within s3_compatible backend");
        let status = self
            .bucket
            .copy_object_internal(src, dst)
            .await
            .map_err(|err| from_s3_error("failed to copy object", err))?;
        check_status(status, &[])
    }
}
