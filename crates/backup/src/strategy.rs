use crate::error::{ErrorKind, Result};
use bytes::Bytes;
use exn::ResultExt;
use shoebox_storage::ObjectBody;
use std::path::Path;
use tokio::fs::File;
use tokio_util::io::ReaderStream;

/// Files strictly larger than this are streamed instead of read whole.
pub const DEFAULT_STREAMING_THRESHOLD: u64 = 100 * 1024 * 1024;

/// How a file's bytes get to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStrategy {
    /// Read the whole file into memory and put it in one request.
    Buffered,
    /// Hand the store a read stream; it reports byte-level progress.
    Streaming,
}

impl TransferStrategy {
    /// Pick a strategy using [`DEFAULT_STREAMING_THRESHOLD`].
    ///
    /// ```
    /// use shoebox_backup::TransferStrategy;
    ///
    /// assert_eq!(TransferStrategy::for_size(100 * 1024 * 1024), TransferStrategy::Buffered);
    /// assert_eq!(TransferStrategy::for_size(100 * 1024 * 1024 + 1), TransferStrategy::Streaming);
    /// ```
    pub fn for_size(bytes: u64) -> Self {
        Self::with_threshold(bytes, DEFAULT_STREAMING_THRESHOLD)
    }

    pub fn with_threshold(bytes: u64, threshold: u64) -> Self {
        match bytes > threshold {
            true => Self::Streaming,
            false => Self::Buffered,
        }
    }

    /// Open `path` as an object body for this strategy.
    pub async fn open(self, path: &Path) -> Result<ObjectBody> {
        match self {
            Self::Buffered => {
                let data = tokio::fs::read(path).await.or_raise(|| ErrorKind::ReadFile(path.to_path_buf()))?;
                Ok(ObjectBody::Buffered(Bytes::from(data)))
            },
            Self::Streaming => {
                let file = File::open(path).await.or_raise(|| ErrorKind::ReadFile(path.to_path_buf()))?;
                // Size as of opening; the scan may be stale.
                let length = file.metadata().await.or_raise(|| ErrorKind::ReadFile(path.to_path_buf()))?.len();
                Ok(ObjectBody::Stream {
                    stream: Box::pin(ReaderStream::new(file)),
                    length,
                })
            },
        }
    }
}
