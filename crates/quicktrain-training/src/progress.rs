use serde::{Deserialize, Serialize};
use tracing::info;

/// Pipeline stage a job is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Assembling,
    Fitting,
    Publishing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Stage { job_id: String, stage: Stage },
    Message { job_id: String, message: String },
}

pub trait ProgressSink: Send + Sync {
    fn on_event(&self, event: ProgressEvent);
}

/// Sink that only logs.
#[derive(Debug, Default)]
pub struct TracingProgressSink;

impl ProgressSink for TracingProgressSink {
    fn on_event(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Stage { job_id, stage } => info!(job_id = %job_id, stage = ?stage, "Job stage"),
            ProgressEvent::Message { job_id, message } => info!(job_id = %job_id, "{message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_shape() {
        let event = ProgressEvent::Stage { job_id: "j1".to_string(), stage: Stage::Fitting };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "stage");
        assert_eq!(json["stage"], "fitting");
    }
}
