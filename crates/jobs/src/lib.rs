//! Job tracking for long-running operations.
//!
//! The [`JobRegistry`] owns every [`Job`] and enforces its state machine;
//! it doubles as the event broadcaster, fanning [`Event`]s out to every
//! [`Subscription`]. New subscribers are bootstrapped with a snapshot of all
//! tracked jobs, so joining mid-upload never misses in-flight state.

mod broadcast;
pub mod error;
mod events;
mod models;
mod registry;

pub use crate::broadcast::Subscription;
pub use crate::events::Event;
pub use crate::models::{Job, JobId, JobKind, JobStatus, TransferOutcome};
pub use crate::registry::{DEFAULT_CAPACITY, DEFAULT_RETIRE_AFTER, JobRegistry};
