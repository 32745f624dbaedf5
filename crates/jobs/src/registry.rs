use crate::broadcast::Subscription;
use crate::error::{ErrorKind, Result};
use crate::{Event, Job, JobId, JobKind, JobStatus};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::broadcast;

/// How long a finished job stays visible before it's dropped.
pub const DEFAULT_RETIRE_AFTER: Duration = Duration::from_secs(30);
/// Messages buffered per subscriber before it starts lagging.
pub const DEFAULT_CAPACITY: usize = 256;

struct Inner {
    jobs: Mutex<HashMap<JobId, Job>>,
    sender: broadcast::Sender<Event>,
    retire_after: Duration,
}

impl Inner {
    fn jobs(&self) -> MutexGuard<'_, HashMap<JobId, Job>> {
        // Nothing panics while holding the lock, but don't turn a poisoned
        // lock into a second panic either.
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The single owner of every tracked [`Job`], and the event broadcaster.
///
/// Cloning is cheap and every clone shares the same jobs and subscribers.
/// Every mutation publishes a [`JobUpdate`](Event::JobUpdate) while still
/// holding the lock, so subscribers see updates in mutation order and
/// [`subscribe`](Self::subscribe) can take a snapshot that nothing slips
/// past.
///
/// Terminal jobs are retired (removed) after `retire_after` by a timer task
/// on the current Tokio runtime.
///
/// # Examples
///
/// ```
/// use shoebox_jobs::{Event, JobKind, JobRegistry};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let registry = JobRegistry::default();
/// let job = registry.create(JobKind::Upload, 2);
/// let mut events = registry.subscribe();
///
/// registry.update_progress(job.id, 1, Some("a.jpg".to_string()), None).unwrap();
///
/// assert!(matches!(events.recv().await, Some(Event::JobsSnapshot { jobs }) if jobs.len() == 1));
/// assert!(matches!(events.recv().await, Some(Event::JobUpdate { job }) if job.progress == 50));
/// # }
/// ```
#[derive(Clone)]
pub struct JobRegistry {
    inner: Arc<Inner>,
}

impl JobRegistry {
    pub fn new(capacity: usize, retire_after: Duration) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                jobs: Mutex::new(HashMap::new()),
                sender,
                retire_after,
            }),
        }
    }

    /// Start tracking a new running job.
    pub fn create(&self, kind: JobKind, total: u64) -> Job {
        let job = Job::new(kind, total);
        let mut jobs = self.inner.jobs();
        jobs.insert(job.id, job.clone());
        self.send(Event::JobUpdate { job: job.clone() });
        tracing::debug!(job = %job.id, kind = %kind, total, "job created");
        job
    }

    /// Record progress on a running job.
    ///
    /// `current_item` replaces the label when given. An `error` is appended
    /// to the job's errors and counts as one failed item.
    pub fn update_progress(
        &self,
        id: JobId,
        completed: u64,
        current_item: Option<String>,
        error: Option<String>,
    ) -> Result<Job> {
        self.mutate(id, |job| {
            job.completed = completed;
            job.progress = Job::progress_of(completed, job.total);
            if let Some(label) = current_item {
                job.current_item = Some(label);
            }
            if let Some(error) = error {
                job.failed += 1;
                job.errors.push(error);
            }
        })
    }

    /// Mark a job completed. Progress is forced to 100 and the label cleared.
    pub fn complete(&self, id: JobId) -> Result<Job> {
        let job = self.mutate(id, |job| {
            job.status = JobStatus::Completed;
            job.progress = 100;
            job.current_item = None;
        })?;
        tracing::info!(job = %id, kind = %job.kind, completed = job.completed, failed = job.failed, "job completed");
        self.schedule_retirement(id);
        Ok(job)
    }

    /// Mark a job failed, appending `error`.
    pub fn fail(&self, id: JobId, error: impl Into<String>) -> Result<Job> {
        let error = error.into();
        let job = self.mutate(id, |job| {
            job.status = JobStatus::Failed;
            job.errors.push(error);
        })?;
        tracing::warn!(job = %id, kind = %job.kind, errors = ?job.errors, "job failed");
        self.schedule_retirement(id);
        Ok(job)
    }

    pub fn get(&self, id: JobId) -> Option<Job> {
        self.inner.jobs().get(&id).cloned()
    }

    /// Every tracked job, oldest first.
    pub fn snapshot(&self) -> Vec<Job> {
        Self::snapshot_of(&self.inner.jobs())
    }

    /// Broadcast an event to every current subscriber.
    ///
    /// Returns how many subscribers it reached; nobody listening is fine.
    pub fn publish(&self, event: Event) -> usize {
        let _jobs = self.inner.jobs();
        self.send(event)
    }

    /// Open a subscription. The first message it yields is a
    /// [`JobsSnapshot`](Event::JobsSnapshot) of every tracked job.
    pub fn subscribe(&self) -> Subscription {
        let jobs = self.inner.jobs();
        let receiver = self.inner.sender.subscribe();
        Subscription::new(Self::snapshot_of(&jobs), receiver)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.sender.receiver_count()
    }

    fn mutate(&self, id: JobId, apply: impl FnOnce(&mut Job)) -> Result<Job> {
        let mut jobs = self.inner.jobs();
        let Some(job) = jobs.get_mut(&id) else {
            exn::bail!(ErrorKind::NotFound(id));
        };
        if job.is_terminal() {
            exn::bail!(ErrorKind::AlreadyTerminal(id));
        }
        apply(job);
        let job = job.clone();
        self.send(Event::JobUpdate { job: job.clone() });
        Ok(job)
    }

    fn send(&self, event: Event) -> usize {
        // Only fails when there are no receivers.
        self.inner.sender.send(event).unwrap_or(0)
    }

    fn snapshot_of(jobs: &HashMap<JobId, Job>) -> Vec<Job> {
        let mut snapshot: Vec<Job> = jobs.values().cloned().collect();
        snapshot.sort_by(|a, b| a.started_at.cmp(&b.started_at).then(a.id.cmp(&b.id)));
        snapshot
    }

    fn schedule_retirement(&self, id: JobId) {
        let Ok(runtime) = Handle::try_current() else {
            tracing::warn!(job = %id, "no async runtime, finished job will not be retired");
            return;
        };
        let inner = Arc::downgrade(&self.inner);
        let delay = self.inner.retire_after;
        runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = inner.upgrade()
                && inner.jobs().remove(&id).is_some()
            {
                tracing::debug!(job = %id, "job retired");
            }
        });
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_RETIRE_AFTER)
    }
}

impl fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobRegistry")
            .field("jobs", &self.inner.jobs().len())
            .field("subscribers", &self.subscriber_count())
            .field("retire_after", &self.inner.retire_after)
            .finish()
    }
}
