//! Request and response types shared by every [`RemoteStore`](crate::RemoteStore).

use bytes::Bytes;
use futures::Stream;
use std::fmt;
use std::io;
use std::pin::Pin;

/// A pull-based stream of file chunks, read lazily by the store as it uploads.
pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send + 'static>>;

/// Content handed to [`put_object`](crate::RemoteStore::put_object).
pub enum ObjectBody {
    /// The whole object, already in memory.
    Buffered(Bytes),
    /// A stream of chunks with the total length known up front.
    Stream { stream: ByteStream, length: u64 },
}
impl ObjectBody {
    /// Total object size in bytes.
    pub fn len(&self) -> u64 {
        match self {
            Self::Buffered(bytes) => bytes.len() as u64,
            Self::Stream { length, .. } => *length,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
impl fmt::Debug for ObjectBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buffered(bytes) => f.debug_tuple("Buffered").field(&bytes.len()).finish(),
            Self::Stream { length, .. } => f.debug_struct("Stream").field("length", length).finish_non_exhaustive(),
        }
    }
}
impl From<Vec<u8>> for ObjectBody {
    fn from(data: Vec<u8>) -> Self {
        Self::Buffered(Bytes::from(data))
    }
}

/// Acknowledgement of a successful put.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutReceipt {
    pub key: String,
}

/// One page of a key listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectPage {
    /// Full keys (prefix included) in this page.
    pub keys: Vec<String>,
    /// Cursor for the next page; `None` once the listing is exhausted.
    pub next_token: Option<String>,
}
