// Error types for dispatch, registration and launch

use thiserror::Error;

/// Result type for dispatch operations
pub type Result<T> = std::result::Result<T, DispatchError>;

/// Failure to hand a job to the queue.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LaunchError {
    /// The queue has no free slot.
    #[error("Job queue is full (capacity {0})")]
    QueueFull(usize),

    /// The worker side of the queue is gone.
    #[error("Job queue is closed")]
    Closed,
}

/// Dispatch errors
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The request has no `jobId`.
    #[error("Missing required field 'jobId'")]
    MissingIdentifier,

    /// The request has no `modelType`.
    #[error("Missing required field 'modelType'")]
    MissingModelType,

    /// No backend is registered under the token.
    #[error("Unsupported model type: {0}")]
    UnsupportedModelType(String),

    /// The request names no file at all.
    #[error("Missing file reference: at least one training file is required")]
    MissingFileReference,

    /// The backend rejected the request's fields.
    #[error("Invalid input for '{model_type}': {reason}")]
    InvalidBackendInput {
        /// Canonical model type
        model_type: String,
        /// What was wrong
        reason: String,
    },

    /// The job could not be enqueued.
    #[error("Failed to launch job: {0}")]
    LaunchFailed(#[from] LaunchError),
}

impl DispatchError {
    /// Whether the caller caused this error (as opposed to the service).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::LaunchFailed(_))
    }
}

/// Errors raised while building the registry or wiring backends to it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A token or alias is already taken.
    #[error("Model type token '{0}' is already registered")]
    DuplicateToken(String),

    /// The descriptor's parameter schema is inconsistent.
    #[error("Invalid descriptor for '{model_type}': {reason}")]
    InvalidSchema {
        /// Model type being registered
        model_type: String,
        /// What was wrong
        reason: String,
    },

    /// No descriptor declares this capability.
    #[error("Unknown capability: {0}")]
    UnknownCapability(String),

    /// The implementation reads different parameters than the descriptor binds.
    #[error("Backend '{capability}' expects parameters {actual:?}, descriptor declares {expected:?}")]
    ParameterMismatch {
        /// Capability identifier
        capability: String,
        /// Names from the descriptor
        expected: Vec<String>,
        /// Names from the implementation
        actual: Vec<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_classification() {
        assert!(DispatchError::MissingIdentifier.is_client_error());
        assert!(DispatchError::UnsupportedModelType("svm".to_string()).is_client_error());
        assert!(
            DispatchError::InvalidBackendInput { model_type: "ebm".to_string(), reason: "x".to_string() }
                .is_client_error()
        );
        assert!(!DispatchError::LaunchFailed(LaunchError::Closed).is_client_error());
    }
}
