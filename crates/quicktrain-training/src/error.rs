use quicktrain_abstraction::StorageError;
use thiserror::Error;

pub type TrainingResult<T> = std::result::Result<T, TrainingError>;

/// Failure to turn a remote object into files on disk.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("failed to download '{key}': {source}")]
    Download {
        key: String,
        #[source]
        source: StorageError,
    },

    #[error("corrupt archive '{key}': {reason}")]
    Corrupt { key: String, reason: String },

    #[error("failed to extract '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("invalid job invocation: {0}")]
    InvalidInvocation(String),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error("dataset assembly failed: {0}")]
    Assembly(String),

    #[error("trainer error: {0}")]
    Trainer(String),

    #[error("failed to publish artifact '{key}': {source}")]
    Publish {
        key: String,
        #[source]
        source: StorageError,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
