//! Remote store trait and implementations.
//!
//! This module defines the [`RemoteStore`] trait, the whole contract the
//! backup engine has with remote object storage: a connectivity probe, a
//! single-object put, and a paginated key listing.

#[cfg(any(test, feature = "mock"))]
mod mock;
#[cfg(feature = "s3")]
mod s3;

#[cfg(any(test, feature = "mock"))]
pub use self::mock::MockStore;
#[cfg(feature = "s3")]
pub use self::s3::S3Store;
use crate::error::{Error, Result};
use crate::models::{ObjectBody, ObjectPage, PutReceipt};
use crate::progress::TransferProgress;
use async_stream::try_stream;
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use std::pin::Pin;

pub(crate) type KeyStream<'a> = Pin<Box<dyn Stream<Item = Result<String>> + Send + 'a>>;
pub(crate) type PageStream<'a> = Pin<Box<dyn Stream<Item = Result<ObjectPage>> + Send + 'a>>;

/// Unified interface for remote object stores.
///
/// Each store is bound to exactly one bucket when it is constructed, so none
/// of the methods take a bucket argument. Keys are full object keys (any
/// configured prefix included); callers compose them with
/// [`join_key`](crate::join_key).
///
/// # Examples
///
/// ```
/// use shoebox_storage::{ObjectBody, RemoteStore, error::Result};
///
/// async fn upload_note(store: &dyn RemoteStore) -> Result<String> {
///     store.head_bucket().await?;
///     let body = ObjectBody::from(b"hello".to_vec());
///     let receipt = store.put_object("notes/hello.txt", body, "text/plain", None).await?;
///     Ok(receipt.key)
/// }
/// ```
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Name of the configured store (used for logging only).
    fn name(&self) -> &str;

    /// Name of the bucket every operation targets.
    fn bucket(&self) -> &str;

    /// Probe that the store is reachable and the bucket exists.
    ///
    /// Returns [`Connectivity`](crate::error::ErrorKind::Connectivity) when
    /// it isn't.
    async fn head_bucket(&self) -> Result<()>;

    /// Write one object, replacing any existing object at `key`.
    ///
    /// For [`ObjectBody::Stream`] bodies the store reports byte-level
    /// progress to `progress` as it consumes the stream. Buffered bodies may
    /// report once or not at all.
    async fn put_object(
        &self,
        key: &str,
        body: ObjectBody,
        content_type: &str,
        progress: Option<&dyn TransferProgress>,
    ) -> Result<PutReceipt>;

    /// Fetch one page of keys under `prefix`, resuming from `continuation`.
    async fn list_objects(&self, prefix: &str, continuation: Option<String>) -> Result<ObjectPage>;

    /// Stream every page under `prefix`, following continuation tokens until
    /// the store reports no further pages.
    fn list_pages<'a>(&'a self, prefix: &'a str) -> PageStream<'a> {
        Box::pin(try_stream! {
            let mut continuation = None;
            let mut pages = 0usize;
            loop {
                let mut page = self.list_objects(prefix, continuation.take()).await?;
                pages += 1;
                tracing::trace!(store = self.name(), prefix, pages, keys = page.keys.len(), "listed page");
                continuation = page.next_token.take();
                let last = continuation.is_none();
                yield page;
                if last {
                    break;
                }
            }
        })
    }

    /// Stream every key under `prefix`, one page at a time.
    ///
    /// # Examples
    ///
    /// ```
    /// use futures::TryStreamExt;
    /// # use shoebox_storage::{RemoteStore, error::Result};
    /// # async fn example(store: &dyn RemoteStore) -> Result<()> {
    /// let mut keys = store.list_keys("Photos/");
    /// while let Some(key) = keys.try_next().await? {
    ///     println!("{key}");
    /// }
    /// # Ok(())
    /// # }
    /// ```
    fn list_keys<'a>(&'a self, prefix: &'a str) -> KeyStream<'a> {
        Box::pin(
            self.list_pages(prefix)
                .map_ok(|page| futures::stream::iter(page.keys.into_iter().map(Ok::<_, Error>)))
                .try_flatten(),
        )
    }

    /// Collect every key under `prefix`.
    ///
    /// Default implementation collects [`list_keys()`](Self::list_keys).
    async fn list_all(&self, prefix: &str) -> Result<Vec<String>> {
        self.list_keys(prefix).try_collect().await
    }
}
