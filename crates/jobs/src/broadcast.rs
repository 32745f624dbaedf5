//! Delivery side of the event stream.
//!
//! Delivery is best-effort: there is no replay, and per-subscriber order
//! matches publish order.

use crate::{Event, Job};
use futures::Stream;
use std::fmt;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};

/// One observer's view of the event stream.
///
/// Dropping the subscription disconnects it. A subscriber that falls more
/// than the channel capacity behind skips the messages it missed.
pub struct Subscription {
    snapshot: Option<Vec<Job>>,
    receiver: broadcast::Receiver<Event>,
}

impl Subscription {
    pub(crate) fn new(snapshot: Vec<Job>, receiver: broadcast::Receiver<Event>) -> Self {
        Self {
            snapshot: Some(snapshot),
            receiver,
        }
    }

    /// Wait for the next event. `None` once the registry is gone.
    pub async fn recv(&mut self) -> Option<Event> {
        if let Some(jobs) = self.snapshot.take() {
            return Some(Event::JobsSnapshot { jobs });
        }
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "subscriber lagging, events dropped");
                },
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// The next event if one is already waiting.
    pub fn try_recv(&mut self) -> Option<Event> {
        if let Some(jobs) = self.snapshot.take() {
            return Some(Event::JobsSnapshot { jobs });
        }
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "subscriber lagging, events dropped");
                },
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = Event> + Send + 'static {
        futures::stream::unfold(self, |mut subscription| async move {
            subscription.recv().await.map(|event| (event, subscription))
        })
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("snapshot_pending", &self.snapshot.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{JobKind, JobRegistry};
    use std::time::Duration;

    #[tokio::test]
    async fn test_lagging_subscriber_skips_ahead() {
        let registry = JobRegistry::new(2, Duration::from_secs(30));
        let job = registry.create(JobKind::Upload, 10);
        let mut events = registry.subscribe();
        for completed in 1..=5 {
            registry.update_progress(job.id, completed, None, None).unwrap();
        }
        assert!(matches!(events.recv().await, Some(Event::JobsSnapshot { .. })));
        let Some(Event::JobUpdate { job: next }) = events.recv().await else {
            panic!("expected an update");
        };
        // Capacity two: only the last two updates survive.
        assert_eq!(next.completed, 4);
    }

    #[tokio::test]
    async fn test_closed_when_registry_dropped() {
        let registry = JobRegistry::new(16, Duration::from_secs(30));
        let mut events = registry.subscribe();
        drop(registry);
        assert!(matches!(events.recv().await, Some(Event::JobsSnapshot { .. })));
        assert!(events.recv().await.is_none());
    }
}
