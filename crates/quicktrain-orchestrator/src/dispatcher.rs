//! Job dispatcher.
//!
//! Validates an inbound request, resolves its backend, binds the positional
//! arguments and hands the resulting invocation to a [`JobLauncher`]. Nothing
//! about the job's outcome flows back through here.

use crate::error::{DispatchError, LaunchError, Result};
use crate::registry::BackendRegistry;
use quicktrain_training::{JobInvocation, TrainingRequest};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// One-way job hand-off. Must return without waiting for the job.
pub trait JobLauncher: Send + Sync {
    /// Queues an invocation for execution.
    ///
    /// # Errors
    /// Returns a `LaunchError` if the invocation cannot be queued.
    fn launch(&self, invocation: JobInvocation) -> std::result::Result<(), LaunchError>;
}

/// Response to an accepted request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Acknowledgement {
    pub message: String,
    pub job_id: String,
    pub model_type: String,
}

/// Validates requests and launches the matching backend.
#[derive(Clone)]
pub struct JobDispatcher {
    registry: Arc<BackendRegistry>,
    launcher: Arc<dyn JobLauncher>,
}

impl std::fmt::Debug for JobDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobDispatcher").field("registry", &self.registry).finish_non_exhaustive()
    }
}

impl JobDispatcher {
    #[must_use]
    pub fn new(registry: Arc<BackendRegistry>, launcher: Arc<dyn JobLauncher>) -> Self {
        Self { registry, launcher }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    /// Validates `request` and launches its job.
    ///
    /// Checks run in order: `jobId`, `modelType`, backend lookup, presence of any
    /// file reference, then argument binding. The launcher is called only when all
    /// of them pass.
    ///
    /// # Errors
    /// Returns a client-side `DispatchError` for invalid requests and
    /// `DispatchError::LaunchFailed` if the job could not be queued.
    pub fn dispatch(&self, request: &TrainingRequest) -> Result<Acknowledgement> {
        let job_id = request.job_id().ok_or(DispatchError::MissingIdentifier)?;
        let token = request.model_type().ok_or(DispatchError::MissingModelType)?;
        let descriptor = self
            .registry
            .resolve(&token)
            .ok_or_else(|| DispatchError::UnsupportedModelType(token.clone()))?;

        if request.file_refs().is_empty() {
            return Err(DispatchError::MissingFileReference);
        }

        let args = descriptor.bind(request)?;
        let invocation = JobInvocation {
            job_id: job_id.to_string(),
            model_type: descriptor.model_type.clone(),
            capability: descriptor.capability.clone(),
            environment: descriptor.environment.clone(),
            args,
        };

        if let Err(e) = self.launcher.launch(invocation) {
            warn!(job_id = %job_id, model_type = %descriptor.model_type, error = %e, "Launch failed");
            return Err(e.into());
        }

        info!(
            job_id = %job_id,
            model_type = %descriptor.model_type,
            capability = %descriptor.capability,
            "Training job dispatched"
        );

        Ok(Acknowledgement {
            message: format!("Training started for job {job_id}"),
            job_id: job_id.to_string(),
            model_type: descriptor.model_type.clone(),
        })
    }
}
