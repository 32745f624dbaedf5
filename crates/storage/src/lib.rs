//! Remote object store gateway.
//!
//! The rest of shoebox only ever talks to remote storage through the
//! [`RemoteStore`] trait: probe the bucket, put an object, list a page of
//! keys. Everything else (retries, timeouts, multipart uploads) is the
//! concern of the implementation behind it.

pub mod backend;
pub mod error;
mod key;
mod models;
pub mod progress;

pub use crate::backend::RemoteStore;
pub use crate::key::{join as join_key, strip_prefix as strip_key_prefix, validate as validate_key};
pub use crate::models::{ByteStream, ObjectBody, ObjectPage, PutReceipt};
pub use crate::progress::TransferProgress;
use std::sync::Arc;

pub type StoreHandle = Arc<dyn RemoteStore + Send + Sync>;
