//! Messages delivered to subscribers.
//!
//! Every message is a JSON object tagged by `type`, so observers can
//! dispatch on a single field:
//!
//! ```json
//! {"type": "JobUpdate", "job": {"id": "…", "status": "running", …}}
//! ```

use crate::{Job, JobId, TransferOutcome};
use serde::{Deserialize, Serialize};
use shoebox_inventory::FileEntry;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum Event {
    /// Every tracked job; always the first message a subscriber sees.
    JobsSnapshot { jobs: Vec<Job> },
    /// A job changed state or progress.
    JobUpdate { job: Job },
    /// The full result of a tracked reconciliation, keyed by relative path.
    SyncResult {
        job_id: JobId,
        sync_status: BTreeMap<String, FileEntry>,
        remote_object_count: usize,
    },
    /// One file of an upload batch made it to the store.
    FileUploadSucceeded {
        job_id: JobId,
        relative_path: String,
        destination_key: String,
        context_ids: Vec<String>,
    },
    /// Per-file outcomes for a whole upload batch.
    BatchUploadResult {
        job_id: JobId,
        outcomes: Vec<TransferOutcome>,
        context_ids: Vec<String>,
    },
}

impl Event {
    /// The job this event belongs to, if it concerns exactly one.
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            Self::JobsSnapshot { .. } => None,
            Self::JobUpdate { job } => Some(job.id),
            Self::SyncResult { job_id, .. }
            | Self::FileUploadSucceeded { job_id, .. }
            | Self::BatchUploadResult { job_id, .. } => Some(*job_id),
        }
    }

    /// Name of the message, as found in its `type` field.
    pub fn name(&self) -> &'static str {
        match self {
            Self::JobsSnapshot { .. } => "JobsSnapshot",
            Self::JobUpdate { .. } => "JobUpdate",
            Self::SyncResult { .. } => "SyncResult",
            Self::FileUploadSucceeded { .. } => "FileUploadSucceeded",
            Self::BatchUploadResult { .. } => "BatchUploadResult",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tagged_camel_case() {
        let job_id = JobId::new();
        let event = Event::FileUploadSucceeded {
            job_id,
            relative_path: "Photos/a.jpg".to_string(),
            destination_key: "media/Photos/a.jpg".to_string(),
            context_ids: vec!["ctx-1".to_string()],
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "type": "FileUploadSucceeded",
                "jobId": job_id.to_string(),
                "relativePath": "Photos/a.jpg",
                "destinationKey": "media/Photos/a.jpg",
                "contextIds": ["ctx-1"],
            })
        );
        assert_eq!(event.job_id(), Some(job_id));
        assert_eq!(event.name(), "FileUploadSucceeded");
    }

    #[test]
    fn test_sync_result_shape() {
        let job_id = JobId::new();
        let event = Event::SyncResult { job_id, sync_status: BTreeMap::new(), remote_object_count: 3 };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "SyncResult");
        assert_eq!(json["remoteObjectCount"], 3);
        assert_eq!(json["syncStatus"], json!({}));
        assert_eq!(serde_json::from_value::<Event>(json).unwrap(), event);
    }

    #[test]
    fn test_snapshot_has_no_job_id() {
        let event = Event::JobsSnapshot { jobs: Vec::new() };
        assert_eq!(event.job_id(), None);
        assert_eq!(serde_json::to_value(&event).unwrap(), json!({"type": "JobsSnapshot", "jobs": []}));
    }
}
