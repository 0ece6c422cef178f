//! Job status events.
//!
//! Everything that happens after dispatch is observable only here and in the logs.

use quicktrain_training::{ProgressEvent, ProgressSink, PublishedArtifact};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::info;

/// Capacity of the event broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Lifecycle event for one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    /// The worker picked the job up.
    Started { job_id: String, model_type: String },
    /// The backend reported progress.
    Progress { job_id: String, event: ProgressEvent },
    /// The model was published.
    Completed { job_id: String, artifact: PublishedArtifact },
    /// The backend failed.
    Failed { job_id: String, error: String },
    /// The backend ran past its environment's timeout and was stopped.
    TimedOut { job_id: String, timeout_secs: u64 },
}

impl JobEvent {
    #[must_use]
    pub fn job_id(&self) -> &str {
        match self {
            Self::Started { job_id, .. }
            | Self::Progress { job_id, .. }
            | Self::Completed { job_id, .. }
            | Self::Failed { job_id, .. }
            | Self::TimedOut { job_id, .. } => job_id,
        }
    }

    /// Whether no further events follow for this job.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. } | Self::TimedOut { .. })
    }
}

/// Forwards backend progress onto the job event channel.
#[derive(Debug, Clone)]
pub struct BroadcastProgressSink {
    job_id: String,
    events: broadcast::Sender<JobEvent>,
}

impl BroadcastProgressSink {
    #[must_use]
    pub fn new(job_id: String, events: broadcast::Sender<JobEvent>) -> Self {
        Self { job_id, events }
    }
}

impl ProgressSink for BroadcastProgressSink {
    fn on_event(&self, event: ProgressEvent) {
        info!(job_id = %self.job_id, progress = ?event, "Job progress");
        // No subscribers is fine
        let _ = self.events.send(JobEvent::Progress { job_id: self.job_id.clone(), event });
    }
}
