use crate::artifacts::PublishedArtifact;
use crate::dataset::DatasetTree;
use crate::error::TrainingResult;
use crate::invocation::JobInvocation;
use crate::progress::ProgressSink;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A dataset laid out on disk and ready for fitting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PreparedDataset {
    /// One flat directory per class under `train/` and `validation/`.
    ImageFolders(DatasetTree),
    /// `text,label` CSVs plus the label encoding.
    LabeledText {
        root: PathBuf,
        train: PathBuf,
        validation: Option<PathBuf>,
        labels: BTreeMap<String, usize>,
        train_rows: usize,
        validation_rows: usize,
    },
    /// Headed CSVs whose last column is the target.
    Table {
        root: PathBuf,
        train: PathBuf,
        validation: PathBuf,
        features: Vec<String>,
        target: String,
    },
}

impl PreparedDataset {
    #[must_use]
    pub fn root(&self) -> &Path {
        match self {
            Self::ImageFolders(tree) => &tree.root,
            Self::LabeledText { root, .. } | Self::Table { root, .. } => root,
        }
    }
}

/// Input to an opaque `train(dataset) -> artifact` step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FitRequest {
    pub job_id: String,
    pub model_type: String,
    pub dataset: PreparedDataset,
    /// Where the fitter must leave the model file.
    pub output: PathBuf,
}

/// Turns a prepared dataset into a model file.
#[async_trait]
pub trait ModelFitter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Fits a model and returns the path of the written artifact.
    async fn fit(&self, request: &FitRequest) -> TrainingResult<PathBuf>;
}

/// A training capability executed by the job worker.
#[async_trait]
pub trait TrainingBackend: Send + Sync {
    /// Capability identifier, matching the registry descriptor.
    fn capability(&self) -> &str;

    /// Ordered parameter names this backend reads from an invocation.
    fn parameters(&self) -> &[&'static str];

    async fn run(
        &self,
        invocation: &JobInvocation,
        progress: &dyn ProgressSink,
    ) -> TrainingResult<PublishedArtifact>;
}
