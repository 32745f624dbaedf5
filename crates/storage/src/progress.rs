//! Byte-level transfer progress.
//!
//! Stores report progress for streamed bodies through [`TransferProgress`].
//! The easiest way to do that is to wrap the incoming stream in [`Tracked`],
//! which reports after every chunk it yields.

use bytes::Bytes;
use futures::Stream;
use pin_project_lite::pin_project;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Receives `(loaded, total)` byte counts while an object is uploading.
///
/// Called from inside the store's upload loop, so implementations must be
/// quick and must not block.
pub trait TransferProgress: Send + Sync {
    fn on_progress(&self, loaded: u64, total: u64);
}

impl<F> TransferProgress for F
where
    F: Fn(u64, u64) + Send + Sync,
{
    fn on_progress(&self, loaded: u64, total: u64) {
        self(loaded, total)
    }
}

pin_project! {
    /// Stream adaptor reporting cumulative bytes to a [`TransferProgress`].
    pub struct Tracked<'a, S> {
        #[pin]
        inner: S,
        progress: Option<&'a dyn TransferProgress>,
        loaded: u64,
        total: u64,
    }
}

impl<'a, S> Tracked<'a, S> {
    pub fn new(inner: S, total: u64, progress: Option<&'a dyn TransferProgress>) -> Self {
        Self { inner, progress, loaded: 0, total }
    }

    /// Bytes yielded so far.
    pub fn loaded(&self) -> u64 {
        self.loaded
    }
}

impl<S> Stream for Tracked<'_, S>
where
    S: Stream<Item = io::Result<Bytes>>,
{
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        let polled = this.inner.poll_next(cx);
        if let Poll::Ready(Some(Ok(chunk))) = &polled {
            *this.loaded += chunk.len() as u64;
            if let Some(progress) = this.progress {
                progress.on_progress(*this.loaded, *this.total);
            }
        }
        polled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{StreamExt, TryStreamExt, stream};
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_reports_cumulative_bytes() {
        let seen = Mutex::new(Vec::new());
        let recorder = |loaded: u64, total: u64| seen.lock().unwrap().push((loaded, total));
        let chunks = stream::iter([Ok::<_, io::Error>(Bytes::from_static(b"abc")), Ok(Bytes::from_static(b"defg"))]);
        let tracked = Tracked::new(chunks, 7, Some(&recorder));
        let collected: Vec<Bytes> = tracked.try_collect().await.unwrap();
        assert_eq!(collected.concat(), b"abcdefg");
        assert_eq!(*seen.lock().unwrap(), vec![(3, 7), (7, 7)]);
    }

    #[tokio::test]
    async fn test_errors_pass_through_without_report() {
        let seen = Mutex::new(0usize);
        let recorder = |_: u64, _: u64| *seen.lock().unwrap() += 1;
        let chunks = stream::iter([Err::<Bytes, _>(io::Error::other("disk on fire"))]);
        let mut tracked = Tracked::new(chunks, 10, Some(&recorder));
        assert!(tracked.next().await.unwrap().is_err());
        assert_eq!(tracked.loaded(), 0);
        assert_eq!(*seen.lock().unwrap(), 0);
    }
}
