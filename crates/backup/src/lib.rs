//! Backup engine: moves local media into remote storage and works out what
//! is already there.
//!
//! - [`Uploader`] transfers a batch of files as a tracked upload job.
//! - [`compute_status`] and [`Reconciler`] compare a local inventory against
//!   remote listings, directly or as a tracked `scan_check` job.
//!
//! Both report through a [`JobRegistry`](shoebox_jobs::JobRegistry), so any
//! number of observers can follow along.

pub mod error;
mod keys;
mod reconcile;
mod strategy;
mod upload;

pub use crate::keys::{KeyClock, destination_key, remote_key};
pub use crate::reconcile::{DEFAULT_RECONCILE_BATCH, Reconciler, SyncStatus, compute_status};
pub use crate::strategy::{DEFAULT_STREAMING_THRESHOLD, TransferStrategy};
pub use crate::upload::{UploadRequest, Uploader};
