//! Training backends.
//!
//! The backend-agnostic pipeline pieces live in `quicktrain-training`. This module
//! contains the concrete backends the worker runs for each built-in model type,
//! and the fitters they hand prepared datasets to.

pub mod fitters;
pub mod image;
pub mod tabular;
pub mod text;

pub use fitters::{build_fitter, CommandFitter, ManifestFitter};
pub use image::ImageClassifierBackend;
pub use tabular::TabularBackend;
pub use text::TextClassifierBackend;

use quicktrain_abstraction::ObjectStore;
use quicktrain_training::{
    list_files, normalize, ArchiveResolver, ArtifactPublisher, DatasetAssembler, FitRequest, JobLayout,
    ModelFitter, PreparedDataset, ProgressEvent, ProgressSink, PublishedArtifact, SplitPolicy, Stage,
    TrainingError, TrainingJobId, TrainingResult,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Parameter contract shared by the two-class backends.
pub const PAIRED_PARAMS: &[&str] =
    &["trainFile1", "trainFile2", "testFile1", "testFile2", "useAutoSplit", "jobId"];

/// Parameter contract of the single-table backend.
pub const TABLE_PARAMS: &[&str] = &["trainFile1", "jobId"];

/// Resources every backend shares.
pub struct BackendContext {
    store: Arc<dyn ObjectStore>,
    fitter: Arc<dyn ModelFitter>,
    work_root: PathBuf,
    split: SplitPolicy,
    signed_url_ttl: Option<Duration>,
    keep_workdirs: bool,
}

impl std::fmt::Debug for BackendContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendContext")
            .field("store", &self.store.name())
            .field("fitter", &self.fitter.name())
            .field("work_root", &self.work_root)
            .field("keep_workdirs", &self.keep_workdirs)
            .finish_non_exhaustive()
    }
}

impl BackendContext {
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, fitter: Arc<dyn ModelFitter>, work_root: PathBuf) -> Self {
        Self {
            store,
            fitter,
            work_root,
            split: SplitPolicy::default(),
            signed_url_ttl: None,
            keep_workdirs: false,
        }
    }

    /// Policy for the auto-split of image classes and text rows.
    #[must_use]
    pub fn with_split(mut self, split: SplitPolicy) -> Self {
        self.split = split;
        self
    }

    #[must_use]
    pub fn with_signed_url_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.signed_url_ttl = ttl;
        self
    }

    /// Leave job directories on disk after the job ends.
    #[must_use]
    pub fn keep_workdirs(mut self, keep: bool) -> Self {
        self.keep_workdirs = keep;
        self
    }

    #[must_use]
    pub fn work_root(&self) -> &Path {
        &self.work_root
    }

    #[must_use]
    pub fn split(&self) -> SplitPolicy {
        self.split
    }

    pub(crate) fn resolver(&self) -> ArchiveResolver {
        ArchiveResolver::new(Arc::clone(&self.store))
    }

    pub(crate) fn assembler(&self) -> DatasetAssembler {
        DatasetAssembler::new(self.resolver(), self.split)
    }

    pub(crate) fn layout(&self, job_id: &str) -> JobLayout {
        JobLayout::for_job(&self.work_root, &TrainingJobId(job_id.to_string()))
    }

    /// Hands `dataset` to the fitter and publishes what it writes.
    pub(crate) async fn fit_and_publish(
        &self,
        layout: &JobLayout,
        job_id: &str,
        model_type: &str,
        extension: &str,
        dataset: PreparedDataset,
        progress: &dyn ProgressSink,
    ) -> TrainingResult<PublishedArtifact> {
        report_stage(progress, job_id, Stage::Fitting);
        let request = FitRequest {
            job_id: job_id.to_string(),
            model_type: model_type.to_string(),
            dataset,
            output: layout.output_dir().join(format!("model.{extension}")),
        };
        debug!(job_id = %job_id, fitter = self.fitter.name(), output = %request.output.display(), "Fitting");
        let model = self.fitter.fit(&request).await?;

        report_stage(progress, job_id, Stage::Publishing);
        ArtifactPublisher::new(Arc::clone(&self.store), self.signed_url_ttl)
            .publish(&model, job_id, model_type)
            .await
    }

    /// Removes the job directory unless configured to keep it.
    pub(crate) async fn release(&self, layout: &JobLayout) {
        if self.keep_workdirs {
            debug!(path = %layout.root().display(), "Keeping job directory");
            return;
        }
        if let Err(e) = layout.cleanup().await {
            warn!(path = %layout.root().display(), error = %e, "Failed to remove job directory");
        }
    }
}

pub(crate) fn report_stage(progress: &dyn ProgressSink, job_id: &str, stage: Stage) {
    progress.on_event(ProgressEvent::Stage { job_id: job_id.to_string(), stage });
}

/// Downloads `key` into `dir`, flattens it, and lists what landed there.
pub(crate) async fn fetch_sources(resolver: &ArchiveResolver, key: &str, dir: &Path) -> TrainingResult<Vec<PathBuf>> {
    resolver.resolve(key, dir).await?;
    normalize(dir).await?;
    Ok(list_files(dir).await?)
}

/// Runs blocking table I/O off the async threads.
pub(crate) async fn blocking<T, F>(work: F) -> TrainingResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> TrainingResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| TrainingError::Other(e.into()))?
}

/// Lower-cased extension of `path`, empty when it has none.
pub(crate) fn extension_of(path: &Path) -> String {
    path.extension().map(|e| e.to_string_lossy().to_lowercase()).unwrap_or_default()
}
