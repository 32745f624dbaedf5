//! In-memory object store for testing.

use crate::error::{ErrorKind, Result};
use crate::key::validate as validate_key;
use crate::models::{ObjectBody, ObjectPage, PutReceipt};
use crate::progress::{Tracked, TransferProgress};
use crate::RemoteStore;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use exn::ResultExt;
use futures::TryStreamExt;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// Listing page size used by S3 and friends.
const DEFAULT_PAGE_SIZE: usize = 1000;

/// A stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockObject {
    pub data: Bytes,
    pub content_type: String,
}

/// In-memory object store for testing.
///
/// Objects live in a [`BTreeMap`] behind a [`RwLock`] so listings come back
/// in key order, the same as S3. Failures can be injected per key, for
/// listings, or for the whole store (offline), which is everything the
/// backup engine's failure paths need.
///
/// # Examples
///
/// ```
/// use shoebox_storage::backend::MockStore;
/// use shoebox_storage::RemoteStore;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let store = MockStore::with_keys(["Photos/a.jpg", "Photos/b.jpg"]).with_page_size(1);
/// let keys = store.list_all("Photos").await.unwrap();
/// assert_eq!(keys, vec!["Photos/a.jpg", "Photos/b.jpg"]);
/// assert_eq!(store.list_calls(), 2);
/// # Ok(())
/// # }
/// ```
pub struct MockStore {
    name: String,
    bucket: String,
    page_size: usize,
    objects: RwLock<BTreeMap<String, MockObject>>,
    failing_keys: RwLock<HashSet<String>>,
    offline: AtomicBool,
    listing_fails: AtomicBool,
    list_calls: AtomicUsize,
}

impl MockStore {
    /// Create a mock store pre-populated with empty objects at `keys`.
    ///
    /// Panics if any key fails validation. If test setup is wrong, then the
    /// test should not pass.
    pub fn with_keys(keys: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        let mut objects = BTreeMap::new();
        for key in keys {
            let key = key.as_ref();
            let Ok(validated) = validate_key(key) else {
                // The panic here is DELIBERATE. MockStore is intended to be
                // used in tests; panics are expected. There is no error result.
                panic!("MockStore::with_keys: invalid key {key}");
            };
            objects.insert(validated, MockObject { data: Bytes::new(), content_type: String::new() });
        }
        Self { objects: RwLock::new(objects), ..Self::default() }
    }

    /// Change the name of the mock store.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Change how many keys a single [`list_objects`](RemoteStore::list_objects) call returns.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Make every `put_object` to `key` fail.
    pub async fn fail_puts_to(&self, key: impl Into<String>) {
        self.failing_keys.write().await.insert(key.into());
    }

    /// Simulate an unreachable store: every operation fails.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Make listings fail (after counting the call).
    pub fn set_listing_fails(&self, fails: bool) {
        self.listing_fails.store(fails, Ordering::SeqCst);
    }

    /// Number of `list_objects` calls made so far.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Fetch a stored object.
    pub async fn object(&self, key: &str) -> Option<MockObject> {
        self.objects.read().await.get(key).cloned()
    }

    /// All stored keys, in order.
    pub async fn keys(&self) -> Vec<String> {
        self.objects.read().await.keys().cloned().collect()
    }

    fn ensure_online(&self) -> Result<()> {
        match self.offline.load(Ordering::SeqCst) {
            true => exn::bail!(ErrorKind::Network("mock store is offline".to_string())),
            false => Ok(()),
        }
    }

    fn ensure_listable(&self) -> Result<()> {
        self.ensure_online()?;
        match self.listing_fails.load(Ordering::SeqCst) {
            true => exn::bail!(ErrorKind::BackendError("mock store rejected the listing".to_string())),
            false => Ok(()),
        }
    }
}
impl Default for MockStore {
    fn default() -> Self {
        Self {
            name: "mock".to_string(),
            bucket: "mock-bucket".to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            objects: RwLock::new(BTreeMap::new()),
            failing_keys: RwLock::new(HashSet::new()),
            offline: AtomicBool::new(false),
            listing_fails: AtomicBool::new(false),
            list_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl RemoteStore for MockStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn head_bucket(&self) -> Result<()> {
        self.ensure_online().or_raise(|| ErrorKind::Connectivity(self.bucket.clone()))
    }

    async fn put_object(
        &self,
        key: &str,
        body: ObjectBody,
        content_type: &str,
        progress: Option<&dyn TransferProgress>,
    ) -> Result<PutReceipt> {
        let key = validate_key(key)?;
        self.ensure_online().or_raise(|| ErrorKind::Transfer(key.clone()))?;
        let data = match body {
            ObjectBody::Buffered(bytes) => bytes,
            ObjectBody::Stream { stream, length } => {
                // Drain the stream exactly like a real upload would, so
                // progress callbacks fire and read errors surface.
                let mut buffer = BytesMut::with_capacity(usize::try_from(length).unwrap_or(0));
                let mut tracked = Tracked::new(stream, length, progress);
                while let Some(chunk) = tracked.try_next().await.map_err(ErrorKind::Io)? {
                    buffer.extend_from_slice(&chunk);
                }
                buffer.freeze()
            },
        };
        if self.failing_keys.read().await.contains(&key) {
            exn::bail!(ErrorKind::Transfer(key));
        }
        let object = MockObject { data, content_type: content_type.to_string() };
        self.objects.write().await.insert(key.clone(), object);
        Ok(PutReceipt { key })
    }

    async fn list_objects(&self, prefix: &str, continuation: Option<String>) -> Result<ObjectPage> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.ensure_listable().or_raise(|| ErrorKind::Listing(prefix.to_string()))?;
        // Continuation token is simply the last key of the previous page.
        let guard = self.objects.read().await;
        let mut matching = guard
            .keys()
            .filter(|key| key.starts_with(prefix))
            .filter(|key| continuation.as_deref().is_none_or(|after| key.as_str() > after));
        let keys: Vec<String> = matching.by_ref().take(self.page_size).cloned().collect();
        let next_token = match matching.next() {
            Some(_) => keys.last().cloned(),
            None => None,
        };
        Ok(ObjectPage { keys, next_token })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_put_buffered() {
        let store = MockStore::default();
        let receipt = store.put_object("a/b.jpg", b"jpeg".to_vec().into(), "image/jpeg", None).await.unwrap();
        assert_eq!(receipt.key, "a/b.jpg");
        let object = store.object("a/b.jpg").await.unwrap();
        assert_eq!(object.data, Bytes::from_static(b"jpeg"));
        assert_eq!(object.content_type, "image/jpeg");
    }

    #[tokio::test]
    async fn test_put_stream_reports_progress() {
        let store = MockStore::default();
        let seen = Mutex::new(Vec::new());
        let recorder = |loaded: u64, total: u64| seen.lock().unwrap().push((loaded, total));
        let chunks = stream::iter([Ok::<_, std::io::Error>(Bytes::from_static(b"12345")), Ok(Bytes::from_static(b"67890"))]);
        let body = ObjectBody::Stream { stream: Box::pin(chunks), length: 10 };
        store.put_object("clip.mp4", body, "video/mp4", Some(&recorder)).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![(5, 10), (10, 10)]);
        assert_eq!(store.object("clip.mp4").await.unwrap().data.len(), 10);
    }

    #[tokio::test]
    async fn test_injected_put_failure() {
        let store = MockStore::default();
        store.fail_puts_to("bad.jpg").await;
        let err = store.put_object("bad.jpg", Vec::<u8>::new().into(), "image/jpeg", None).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Transfer(_)));
        assert!(store.object("bad.jpg").await.is_none());
    }

    #[tokio::test]
    async fn test_offline_head_bucket() {
        let store = MockStore::default();
        store.head_bucket().await.unwrap();
        store.set_offline(true);
        let err = store.head_bucket().await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Connectivity(_)));
    }

    #[tokio::test]
    async fn test_pagination() {
        let keys: Vec<String> = (0..25).map(|i| format!("Photos/{i:03}.jpg")).collect();
        let store = MockStore::with_keys(&keys).with_page_size(10);
        let first = store.list_objects("Photos/", None).await.unwrap();
        assert_eq!(first.keys.len(), 10);
        assert_eq!(first.next_token.as_deref(), Some("Photos/009.jpg"));
        let all = store.list_all("Photos/").await.unwrap();
        assert_eq!(all, keys);
        // One direct call plus three pages.
        assert_eq!(store.list_calls(), 4);
    }

    #[tokio::test]
    async fn test_list_pages_follows_tokens() {
        let store = MockStore::with_keys(["p/a", "p/b", "p/c", "q/d"]).with_page_size(2);
        let pages: Vec<ObjectPage> = store.list_pages("p/").try_collect().await.unwrap();
        let sizes: Vec<usize> = pages.iter().map(|page| page.keys.len()).collect();
        assert_eq!(sizes, vec![2, 1]);
        assert!(pages.iter().all(|page| page.next_token.is_none()));
        assert_eq!(store.list_calls(), 2);
    }

    #[tokio::test]
    async fn test_exact_page_boundary_has_no_trailing_token() {
        let store = MockStore::with_keys(["p/a", "p/b"]).with_page_size(2);
        let page = store.list_objects("p/", None).await.unwrap();
        assert_eq!(page.keys.len(), 2);
        assert_eq!(page.next_token, None);
    }

    #[tokio::test]
    async fn test_listing_failure() {
        let store = MockStore::with_keys(["p/a"]);
        store.set_listing_fails(true);
        let err = store.list_all("p/").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Listing(_)));
    }

    #[test]
    #[should_panic(expected = "invalid key")]
    fn test_with_keys_panics_on_bad_key() {
        MockStore::with_keys(["../escape"]);
    }
}
