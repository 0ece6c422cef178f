//! Tabular (EBM) backend: one headed CSV, last column is the target.

use super::{blocking, extension_of, fetch_sources, report_stage, BackendContext, TABLE_PARAMS};
use async_trait::async_trait;
use quicktrain_training::{
    CsvTable, JobInvocation, JobLayout, PreparedDataset, ProgressSink, PublishedArtifact, SplitPolicy, Stage,
    TrainingBackend, TrainingError, TrainingResult,
};
use std::sync::Arc;
use tracing::info;

/// Seed of the evaluation hold-out, fixed so reruns score against the same rows.
pub const EVALUATION_SEED: u64 = 42;

/// Fits an explainable boosting model on a single table.
#[derive(Debug)]
pub struct TabularBackend {
    capability: String,
    extension: String,
    context: Arc<BackendContext>,
}

impl TabularBackend {
    #[must_use]
    pub fn new(capability: impl Into<String>, extension: impl Into<String>, context: Arc<BackendContext>) -> Self {
        Self { capability: capability.into(), extension: extension.into(), context }
    }

    async fn execute(
        &self,
        key: &str,
        job_id: &str,
        layout: &JobLayout,
        model_type: &str,
        progress: &dyn ProgressSink,
    ) -> TrainingResult<PublishedArtifact> {
        report_stage(progress, job_id, Stage::Assembling);
        layout.prepare().await?;

        let files = fetch_sources(&self.context.resolver(), key, &layout.root().join("sources")).await?;
        let source = files
            .into_iter()
            .find(|p| extension_of(p) == "csv")
            .ok_or_else(|| TrainingError::Assembly(format!("no CSV file found in '{key}'")))?;

        let dataset_dir = layout.dataset_dir();
        let train_path = dataset_dir.join("train.csv");
        let validation_path = dataset_dir.join("validation.csv");

        let (features, target, train_rows, validation_rows) = {
            let (train_path, validation_path) = (train_path.clone(), validation_path.clone());
            blocking(move || {
                let table = CsvTable::read(&source)?;
                let features = table.feature_columns().to_vec();
                let target = table.target_column().to_string();
                let (train, validation) = table.split(&SplitPolicy::seeded(EVALUATION_SEED));
                train.write(&train_path)?;
                validation.write(&validation_path)?;
                Ok((features, target, train.rows.len(), validation.rows.len()))
            })
            .await?
        };

        info!(
            job_id = %job_id,
            features = features.len(),
            target = %target,
            train_rows,
            validation_rows,
            "Table dataset ready"
        );

        let dataset = PreparedDataset::Table {
            root: dataset_dir,
            train: train_path,
            validation: validation_path,
            features,
            target,
        };
        self.context
            .fit_and_publish(layout, job_id, model_type, &self.extension, dataset, progress)
            .await
    }
}

#[async_trait]
impl TrainingBackend for TabularBackend {
    fn capability(&self) -> &str {
        &self.capability
    }

    fn parameters(&self) -> &[&'static str] {
        TABLE_PARAMS
    }

    async fn run(&self, invocation: &JobInvocation, progress: &dyn ProgressSink) -> TrainingResult<PublishedArtifact> {
        let mut args = invocation.arguments();
        let key = args.required_text("trainFile1")?;
        let job_id = args.required_text("jobId")?;
        args.finish()?;

        let layout = self.context.layout(job_id);
        let result = self.execute(key, job_id, &layout, &invocation.model_type, progress).await;
        self.context.release(&layout).await;
        result
    }
}
