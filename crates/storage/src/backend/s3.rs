//! S3-compatible object store.
//!
//! This module provides a [`RemoteStore`] implementation for S3-compatible
//! services including AWS S3, Backblaze B2, Tigris (Fly.io), and others.
//!
//! # Credentials
//!
//! Credentials are provided explicitly via the configuration file
//! (`store.key_id` and `store.key_secret`).
//!
//! # Large objects
//!
//! Streamed bodies are sent as a multipart upload so the file never has to
//! sit in memory as a whole. Parts are cut at `part_size` bytes; S3 requires
//! every part except the last to be at least 5 MiB.

use crate::progress::{Tracked, TransferProgress};
use crate::{
    ObjectBody, ObjectPage, PutReceipt, RemoteStore,
    error::{ErrorKind, Result},
    validate_key,
};
use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    config::{BehaviorVersion, Credentials, Region, http::HttpResponse, retry::RetryConfig},
    error::{DisplayErrorContext, SdkError},
    primitives::ByteStream as SdkByteStream,
    types::{CompletedMultipartUpload, CompletedPart},
};
use bytes::{Bytes, BytesMut};
use exn::{OptionExt, ResultExt};
use futures::TryStreamExt;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Generous default for concurrent S3 requests.
const DEFAULT_CONCURRENT_REQUESTS: usize = 100;
/// Smallest part S3 accepts for anything but the final part.
pub const MIN_PART_SIZE: usize = 5 * 1024 * 1024;
const DEFAULT_PART_SIZE: usize = 8 * 1024 * 1024;

/// S3-compatible object store bound to a single bucket.
///
/// # Supported Services
///
/// - AWS S3
/// - Backblaze B2 (via S3-compatible API)
/// - Tigris (Fly.io storage)
/// - MinIO
/// - Other S3-compatible services
///
/// # Examples
///
/// ```no_run
/// use shoebox_storage::backend::S3Store;
///
/// # fn example() {
/// let store = S3Store::new(
///     "b2",
///     "my-media",
///     "us-west-004",
///     Some("https://s3.us-west-004.backblazeb2.com"),
///     "access_key_id",
///     "secret_access_key",
/// );
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct S3Store {
    name: String,
    client: Client,
    bucket: String,
    part_size: usize,
    /// Rate limiter for concurrent S3 requests.
    rate_limiter: Arc<Semaphore>,
}

impl S3Store {
    /// Create a new S3 store.
    ///
    /// # Arguments
    /// * `name` - A name for this store (used in logging)
    /// * `bucket` - S3 bucket name
    /// * `region` - AWS region or provider-specific region (e.g., "us-west-004" for Backblaze)
    /// * `endpoint` - Custom endpoint URL for S3-compatible services
    /// * `key_id` - AWS/provider access key ID
    /// * `key_secret` - AWS/provider secret access key
    pub fn new(
        name: impl Into<String>,
        bucket: impl Into<String>,
        region: impl Into<String>,
        endpoint: Option<impl Into<String>>,
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
    ) -> Self {
        let region = Region::new(region.into());
        let credentials = Credentials::new(key_id, key_secret, None, None, "shoebox-config");
        let mut config_builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(region)
            // Configure retry policy with exponential backoff (1 initial + 3 retries)
            .retry_config(RetryConfig::standard().with_max_attempts(4))
            // Use path-style addressing for better compatibility with
            // S3-compatible services (Backblaze, MinIO, etc.)
            .force_path_style(true);
        if let Some(endpoint_url) = endpoint {
            config_builder = config_builder.endpoint_url(endpoint_url);
        }
        Self::with_client(name, bucket, Client::from_conf(config_builder.build()))
    }

    /// Wrap an already configured client.
    pub fn with_client(name: impl Into<String>, bucket: impl Into<String>, client: Client) -> Self {
        Self {
            name: name.into(),
            client,
            bucket: bucket.into(),
            part_size: DEFAULT_PART_SIZE,
            rate_limiter: Arc::new(Semaphore::new(DEFAULT_CONCURRENT_REQUESTS)),
        }
    }

    /// Change the multipart part size (clamped to [`MIN_PART_SIZE`]).
    pub fn with_part_size(mut self, part_size: usize) -> Self {
        self.part_size = part_size.max(MIN_PART_SIZE);
        self
    }

    /// Acquire a rate limiter permit before making an S3 API call.
    async fn acquire_permit(&self) -> Result<OwnedSemaphorePermit> {
        self.rate_limiter
            .clone()
            .acquire_owned()
            .await
            .or_raise(|| ErrorKind::BackendError("S3 rate limiter closed".to_string()))
    }

    async fn put_single(&self, key: &str, data: Bytes, content_type: &str) -> Result<()> {
        let _permit = self.acquire_permit().await?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(SdkByteStream::from(data))
            .send()
            .await
            .map_err(request_error)?;
        Ok(())
    }

    async fn put_multipart(
        &self,
        key: &str,
        stream: crate::ByteStream,
        length: u64,
        content_type: &str,
        progress: Option<&dyn TransferProgress>,
    ) -> Result<()> {
        let created = {
            let _permit = self.acquire_permit().await?;
            self.client
                .create_multipart_upload()
                .bucket(&self.bucket)
                .key(key)
                .content_type(content_type)
                .send()
                .await
                .map_err(request_error)?
        };
        let upload_id = created
            .upload_id()
            .map(str::to_string)
            .ok_or_raise(|| ErrorKind::BackendError("S3 returned no multipart upload id".to_string()))?;
        let tracked = Tracked::new(stream, length, progress);
        match self.upload_parts(key, &upload_id, tracked).await {
            Ok(parts) => {
                let _permit = self.acquire_permit().await?;
                self.client
                    .complete_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .multipart_upload(CompletedMultipartUpload::builder().set_parts(Some(parts)).build())
                    .send()
                    .await
                    .map_err(request_error)?;
                Ok(())
            },
            Err(err) => {
                // Leaving the upload open keeps the parts billed forever.
                let _permit = self.acquire_permit().await?;
                if let Err(abort) =
                    self.client.abort_multipart_upload().bucket(&self.bucket).key(key).upload_id(&upload_id).send().await
                {
                    tracing::warn!(store = %self.name, key, error = %DisplayErrorContext(abort), "failed to abort multipart upload");
                }
                Err(err)
            },
        }
    }

    async fn upload_parts(&self, key: &str, upload_id: &str, mut tracked: Tracked<'_, crate::ByteStream>) -> Result<Vec<CompletedPart>> {
        let mut parts = Vec::new();
        let mut buffer = BytesMut::with_capacity(self.part_size);
        loop {
            let chunk = tracked.try_next().await.map_err(ErrorKind::Io)?;
            let finished = chunk.is_none();
            if let Some(chunk) = chunk {
                buffer.extend_from_slice(&chunk);
            }
            while buffer.len() >= self.part_size || (finished && !buffer.is_empty()) {
                let take = buffer.len().min(self.part_size);
                let part = buffer.split_to(take).freeze();
                let number = parts.len() + 1;
                let completed = self.upload_part(key, upload_id, number, part).await?;
                parts.push(completed);
            }
            if finished {
                break;
            }
        }
        // Zero byte files still need one (empty) part.
        if parts.is_empty() {
            parts.push(self.upload_part(key, upload_id, 1, Bytes::new()).await?);
        }
        Ok(parts)
    }

    async fn upload_part(&self, key: &str, upload_id: &str, number: usize, data: Bytes) -> Result<CompletedPart> {
        let number = i32::try_from(number).or_raise(|| ErrorKind::Transfer(key.to_string()))?;
        let _permit = self.acquire_permit().await?;
        let uploaded = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(number)
            .body(SdkByteStream::from(data))
            .send()
            .await
            .map_err(request_error)?;
        tracing::trace!(store = %self.name, key, part = number, "uploaded part");
        Ok(CompletedPart::builder().set_e_tag(uploaded.e_tag().map(str::to_string)).part_number(number).build())
    }
}

/// Rejected credentials become [`PermissionDenied`](ErrorKind::PermissionDenied);
/// anything else is a [`Network`](ErrorKind::Network) error.
fn request_error<E: std::error::Error + 'static>(err: SdkError<E, HttpResponse>) -> ErrorKind {
    let status = err.raw_response().map(|response| response.status().as_u16());
    let message = DisplayErrorContext(err).to_string();
    match status {
        Some(401 | 403) => ErrorKind::PermissionDenied(message),
        _ => ErrorKind::Network(message),
    }
}

#[async_trait]
impl RemoteStore for S3Store {
    fn name(&self) -> &str {
        &self.name
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn head_bucket(&self) -> Result<()> {
        let _permit = self.acquire_permit().await?;
        let result = self.client.head_bucket().bucket(&self.bucket).send().await.map_err(request_error);
        match result {
            Ok(_) => Ok(()),
            Err(kind @ ErrorKind::PermissionDenied(_)) => Err(kind.into()),
            Err(kind) => Err(kind).or_raise(|| ErrorKind::Connectivity(self.bucket.clone())),
        }
    }

    async fn put_object(
        &self,
        key: &str,
        body: ObjectBody,
        content_type: &str,
        progress: Option<&dyn TransferProgress>,
    ) -> Result<PutReceipt> {
        let key = validate_key(key)?;
        let result = match body {
            ObjectBody::Buffered(data) => {
                let total = data.len() as u64;
                let result = self.put_single(&key, data, content_type).await;
                if let (Ok(()), Some(progress)) = (&result, progress) {
                    progress.on_progress(total, total);
                }
                result
            },
            ObjectBody::Stream { stream, length } => {
                self.put_multipart(&key, stream, length, content_type, progress).await
            },
        };
        result.or_raise(|| ErrorKind::Transfer(key.clone()))?;
        Ok(PutReceipt { key })
    }

    async fn list_objects(&self, prefix: &str, continuation: Option<String>) -> Result<ObjectPage> {
        let _permit = self.acquire_permit().await?;
        let output = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .set_continuation_token(continuation)
            .send()
            .await
            .map_err(request_error)
            .or_raise(|| ErrorKind::Listing(prefix.to_string()))?;
        let keys = output.contents().iter().filter_map(|object| object.key().map(str::to_string)).collect();
        let next_token = match output.is_truncated() {
            Some(true) => output.next_continuation_token().map(str::to_string),
            _ => None,
        };
        Ok(ObjectPage { keys, next_token })
    }
}
