//! Text classifier backend.
//!
//! Training references are labeled tables rather than image archives. Each one
//! is resolved like any other object (a bare file or an archive of files), every
//! readable table inside is loaded, and the rows are concatenated into
//! `dataset/train/data.csv`. Validation rows come from the test references when
//! any of them load, otherwise from a shuffled hold-out when auto-split is on.

use super::{blocking, extension_of, fetch_sources, report_stage, BackendContext, PAIRED_PARAMS};
use async_trait::async_trait;
use quicktrain_training::{
    read_labeled_text, write_labeled_csv, JobInvocation, JobLayout, LabeledTable, Partition, PreparedDataset,
    ProgressEvent, ProgressSink, PublishedArtifact, Stage, TrainingBackend, TrainingError, TrainingResult,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

const TABLE_EXTENSIONS: &[&str] = &["csv", "json", "jsonl", "ndjson"];

#[derive(Debug)]
struct TextArgs {
    train: Vec<String>,
    test: Vec<String>,
    auto_split: bool,
    job_id: String,
}

impl TextArgs {
    fn read(invocation: &JobInvocation) -> TrainingResult<Self> {
        let mut args = invocation.arguments();
        let mut train = vec![args.required_text("trainFile1")?.to_string()];
        train.extend(args.optional_text("trainFile2")?.map(str::to_string));
        let mut test = Vec::new();
        test.extend(args.optional_text("testFile1")?.map(str::to_string));
        test.extend(args.optional_text("testFile2")?.map(str::to_string));
        let auto_split = args.flag("useAutoSplit")?;
        let job_id = args.required_text("jobId")?.to_string();
        args.finish()?;
        Ok(Self { train, test, auto_split, job_id })
    }
}

fn is_table_file(path: &Path) -> bool {
    let extension = extension_of(path);
    extension.is_empty() || TABLE_EXTENSIONS.contains(&extension.as_str())
}

/// Loads and concatenates every table in `files`.
async fn load_tables(files: Vec<PathBuf>) -> TrainingResult<LabeledTable> {
    blocking(move || {
        let mut table = LabeledTable::default();
        for path in files.iter().filter(|p| is_table_file(p)) {
            table.extend(read_labeled_text(path)?);
        }
        Ok(table)
    })
    .await
}

/// Fine-tunes a text classifier on `text,label` rows.
#[derive(Debug)]
pub struct TextClassifierBackend {
    capability: String,
    extension: String,
    context: Arc<BackendContext>,
}

impl TextClassifierBackend {
    #[must_use]
    pub fn new(capability: impl Into<String>, extension: impl Into<String>, context: Arc<BackendContext>) -> Self {
        Self { capability: capability.into(), extension: extension.into(), context }
    }

    async fn load_validation(&self, layout: &JobLayout, keys: &[String]) -> LabeledTable {
        let resolver = self.context.resolver();
        let mut table = LabeledTable::default();
        for (index, key) in keys.iter().enumerate() {
            let dir = layout.root().join("sources").join(format!("test_{index}"));
            let loaded = match fetch_sources(&resolver, key, &dir).await {
                Ok(files) => load_tables(files).await,
                Err(e) => Err(e),
            };
            match loaded {
                Ok(rows) => table.extend(rows),
                Err(e) => warn!(key = %key, error = %e, "Validation table unusable, continuing without it"),
            }
        }
        table
    }

    async fn execute(
        &self,
        args: &TextArgs,
        layout: &JobLayout,
        model_type: &str,
        progress: &dyn ProgressSink,
    ) -> TrainingResult<PublishedArtifact> {
        report_stage(progress, &args.job_id, Stage::Assembling);
        layout.prepare().await?;

        let resolver = self.context.resolver();
        let mut train = LabeledTable::default();
        for (index, key) in args.train.iter().enumerate() {
            let dir = layout.root().join("sources").join(format!("train_{index}"));
            let files = fetch_sources(&resolver, key, &dir).await?;
            train.extend(load_tables(files).await?);
        }
        if train.rows.is_empty() {
            return Err(TrainingError::Assembly("no labeled rows in training data".to_string()));
        }

        let mut validation = self.load_validation(layout, &args.test).await;
        if validation.rows.is_empty() && args.auto_split {
            let (kept, held_out) = self.context.split().partition(train.rows);
            train.rows = kept;
            validation.rows = held_out;
        }

        let dropped = train.dropped + validation.dropped;
        if dropped > 0 {
            progress.on_event(ProgressEvent::Message {
                job_id: args.job_id.clone(),
                message: format!("dropped {dropped} unlabeled or empty rows"),
            });
        }

        let mut all = train.clone();
        all.extend(validation.clone());
        let labels = all.label_index();

        let root = layout.dataset_dir();
        let train_path = layout.partition_dir(Partition::Train).join("data.csv");
        let validation_path =
            (!validation.rows.is_empty()).then(|| layout.partition_dir(Partition::Validation).join("data.csv"));
        let labels_path = root.join("labels.json");

        let (train_rows, validation_rows) = (train.rows.len(), validation.rows.len());
        {
            let train_path = train_path.clone();
            let validation_path = validation_path.clone();
            let labels = labels.clone();
            blocking(move || {
                write_labeled_csv(&train_path, &train.rows)?;
                if let Some(path) = &validation_path {
                    write_labeled_csv(path, &validation.rows)?;
                }
                std::fs::write(&labels_path, serde_json::to_vec_pretty(&labels)?)?;
                Ok(())
            })
            .await?;
        }

        info!(
            job_id = %args.job_id,
            train_rows,
            validation_rows,
            labels = labels.len(),
            dropped,
            "Text dataset ready"
        );

        let dataset = PreparedDataset::LabeledText {
            root,
            train: train_path,
            validation: validation_path,
            labels,
            train_rows,
            validation_rows,
        };
        self.context
            .fit_and_publish(layout, &args.job_id, model_type, &self.extension, dataset, progress)
            .await
    }
}

#[async_trait]
impl TrainingBackend for TextClassifierBackend {
    fn capability(&self) -> &str {
        &self.capability
    }

    fn parameters(&self) -> &[&'static str] {
        PAIRED_PARAMS
    }

    async fn run(&self, invocation: &JobInvocation, progress: &dyn ProgressSink) -> TrainingResult<PublishedArtifact> {
        let args = TextArgs::read(invocation)?;
        let layout = self.context.layout(&args.job_id);
        let result = self.execute(&args, &layout, &invocation.model_type, progress).await;
        self.context.release(&layout).await;
        result
    }
}
