use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

/// Unique identifier for a tracked job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    /// Create a new random job id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for JobId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// What a job is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Tracked reconciliation of a local tree against remote listings.
    ScanCheck,
    /// A batch upload.
    Upload,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ScanCheck => "scan_check",
            Self::Upload => "upload",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a job.
///
/// ```text
/// Running ──→ Completed
///    └──────→ Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    /// Terminal states never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A long-running operation as seen by observers.
///
/// Jobs are owned by the [`JobRegistry`](crate::JobRegistry); everything
/// else only ever holds clones taken at some point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub status: JobStatus,
    pub total: u64,
    pub completed: u64,
    pub failed: u64,
    /// Percentage, see [`Job::progress_of`].
    pub progress: u8,
    pub current_item: Option<String>,
    pub errors: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
}

impl Job {
    pub(crate) fn new(kind: JobKind, total: u64) -> Self {
        Self {
            id: JobId::new(),
            kind,
            status: JobStatus::Running,
            total,
            completed: 0,
            failed: 0,
            progress: Self::progress_of(0, total),
            current_item: None,
            errors: Vec::new(),
            started_at: OffsetDateTime::now_utc(),
        }
    }

    /// `floor(completed / total * 100)`, capped at 100.
    ///
    /// A job with nothing to do is 100% done.
    pub fn progress_of(completed: u64, total: u64) -> u8 {
        if total == 0 {
            return 100;
        }
        let percent = u128::from(completed) * 100 / u128::from(total);
        u8::try_from(percent.min(100)).unwrap_or(100)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Result of transferring a single file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferOutcome {
    pub success: bool,
    pub local_path: PathBuf,
    pub destination_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TransferOutcome {
    pub fn succeeded(local_path: impl Into<PathBuf>, destination_key: impl Into<String>) -> Self {
        Self {
            success: true,
            local_path: local_path.into(),
            destination_key: destination_key.into(),
            error: None,
        }
    }

    pub fn failed(local_path: impl Into<PathBuf>, destination_key: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            local_path: local_path.into(),
            destination_key: destination_key.into(),
            error: Some(error.into()),
        }
    }
}
