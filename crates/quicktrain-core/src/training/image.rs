//! Two-class image classifier backend.

use super::{report_stage, BackendContext, PAIRED_PARAMS};
use async_trait::async_trait;
use quicktrain_training::{
    JobInvocation, JobLayout, PreparedDataset, ProgressSink, PublishedArtifact, Stage, TrainingBackend,
    TrainingResult,
};
use std::sync::Arc;
use tracing::info;

/// Arguments of one image job, read in declared order.
#[derive(Debug)]
struct ImageArgs {
    train: Vec<String>,
    test: Vec<Option<String>>,
    auto_split: bool,
    job_id: String,
}

impl ImageArgs {
    fn read(invocation: &JobInvocation) -> TrainingResult<Self> {
        let mut args = invocation.arguments();
        let train = vec![
            args.required_text("trainFile1")?.to_string(),
            args.required_text("trainFile2")?.to_string(),
        ];
        let test = vec![
            args.optional_text("testFile1")?.map(str::to_string),
            args.optional_text("testFile2")?.map(str::to_string),
        ];
        let auto_split = args.flag("useAutoSplit")?;
        let job_id = args.required_text("jobId")?.to_string();
        args.finish()?;
        Ok(Self { train, test, auto_split, job_id })
    }
}

/// Builds `train/class_{0,1}` (and `validation/...`) from image archives and fits a classifier.
#[derive(Debug)]
pub struct ImageClassifierBackend {
    capability: String,
    extension: String,
    context: Arc<BackendContext>,
}

impl ImageClassifierBackend {
    #[must_use]
    pub fn new(capability: impl Into<String>, extension: impl Into<String>, context: Arc<BackendContext>) -> Self {
        Self { capability: capability.into(), extension: extension.into(), context }
    }

    async fn execute(
        &self,
        args: &ImageArgs,
        layout: &JobLayout,
        model_type: &str,
        progress: &dyn ProgressSink,
    ) -> TrainingResult<PublishedArtifact> {
        report_stage(progress, &args.job_id, Stage::Assembling);
        layout.prepare().await?;
        let tree = self.context.assembler().assemble(layout, &args.train, &args.test, args.auto_split).await?;

        info!(
            job_id = %args.job_id,
            train = ?tree.train.iter().map(|c| c.files).collect::<Vec<_>>(),
            validation = ?tree.validation.iter().map(|c| c.files).collect::<Vec<_>>(),
            "Image dataset ready"
        );

        self.context
            .fit_and_publish(
                layout,
                &args.job_id,
                model_type,
                &self.extension,
                PreparedDataset::ImageFolders(tree),
                progress,
            )
            .await
    }
}

#[async_trait]
impl TrainingBackend for ImageClassifierBackend {
    fn capability(&self) -> &str {
        &self.capability
    }

    fn parameters(&self) -> &[&'static str] {
        PAIRED_PARAMS
    }

    async fn run(&self, invocation: &JobInvocation, progress: &dyn ProgressSink) -> TrainingResult<PublishedArtifact> {
        let args = ImageArgs::read(invocation)?;
        let layout = self.context.layout(&args.job_id);
        let result = self.execute(&args, &layout, &invocation.model_type, progress).await;
        self.context.release(&layout).await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::ManifestFitter;
    use quicktrain_abstraction::{ObjectStore, UploadOptions};
    use quicktrain_storage::LocalObjectStore;
    use quicktrain_training::{
        ArgValue, BoundArg, ComputeClass, ExecutionEnvironment, TracingProgressSink, TrainingError,
    };
    use std::io::Write;
    use std::time::Duration;
    use tempfile::TempDir;

    fn work_is_empty(temp: &TempDir) -> bool {
        std::fs::read_dir(temp.path().join("work")).map_or(true, |mut entries| entries.next().is_none())
    }

    fn image_zip(count: usize) -> Vec<u8> {
        let mut buffer = std::io::Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut buffer);
            let options = zip::write::SimpleFileOptions::default();
            for i in 0..count {
                zip.start_file(format!("photos/img_{i}.jpg"), options).unwrap();
                zip.write_all(b"jpeg").unwrap();
            }
            zip.finish().unwrap();
        }
        buffer.into_inner()
    }

    fn invocation(args: Vec<(&str, ArgValue)>) -> JobInvocation {
        JobInvocation {
            job_id: "img-1".to_string(),
            model_type: "resnet".to_string(),
            capability: "resnet-training-service/train_resnet".to_string(),
            environment: ExecutionEnvironment {
                compute: ComputeClass::Gpu { model: "T4".to_string() },
                timeout: Duration::from_secs(60),
            },
            args: args.into_iter().map(|(n, v)| BoundArg { name: n.to_string(), value: v }).collect(),
        }
    }

    fn paired_args(train2: &str) -> Vec<(&'static str, ArgValue)> {
        vec![
            ("trainFile1", ArgValue::Text("cats.zip".to_string())),
            ("trainFile2", ArgValue::Text(train2.to_string())),
            ("testFile1", ArgValue::Absent),
            ("testFile2", ArgValue::Absent),
            ("useAutoSplit", ArgValue::Flag(true)),
            ("jobId", ArgValue::Text("img-1".to_string())),
        ]
    }

    async fn setup(temp: &TempDir) -> (Arc<LocalObjectStore>, ImageClassifierBackend) {
        let store = Arc::new(LocalObjectStore::new(temp.path().join("bucket")));
        store.upload("cats.zip", image_zip(10), &UploadOptions::default()).await.unwrap();
        store.upload("dogs.zip", image_zip(5), &UploadOptions::default()).await.unwrap();
        let context = BackendContext::new(store.clone(), Arc::new(ManifestFitter), temp.path().join("work"));
        let backend = ImageClassifierBackend::new(
            "resnet-training-service/train_resnet",
            "pth",
            Arc::new(context),
        );
        (store, backend)
    }

    #[tokio::test]
    async fn test_image_backend_publishes_model() {
        let temp = TempDir::new().unwrap();
        let (store, backend) = setup(&temp).await;

        let artifact = backend.run(&invocation(paired_args("dogs.zip")), &TracingProgressSink).await.unwrap();
        assert_eq!(artifact.key, "models/resnet_img-1.pth");

        let manifest: serde_json::Value = serde_json::from_slice(&store.download(&artifact.key).await.unwrap()).unwrap();
        assert_eq!(manifest["dataset"]["kind"], "image_folders");
        assert_eq!(manifest["dataset"]["train"][0]["files"], 8);
        assert_eq!(manifest["dataset"]["validation"][1]["files"], 1);

        // Job directory is gone afterwards
        assert!(work_is_empty(&temp));
    }

    #[tokio::test]
    async fn test_image_backend_requires_second_class() {
        let temp = TempDir::new().unwrap();
        let (_store, backend) = setup(&temp).await;

        let result = backend.run(&invocation(paired_args("missing.zip")), &TracingProgressSink).await;
        assert!(matches!(result, Err(TrainingError::Resolution(_))));
        assert!(work_is_empty(&temp));
    }

    #[tokio::test]
    async fn test_image_backend_rejects_foreign_contract() {
        let temp = TempDir::new().unwrap();
        let (_store, backend) = setup(&temp).await;

        let result = backend
            .run(
                &invocation(vec![
                    ("trainFile1", ArgValue::Text("cats.zip".to_string())),
                    ("jobId", ArgValue::Text("img-1".to_string())),
                ]),
                &TracingProgressSink,
            )
            .await;
        assert!(matches!(result, Err(TrainingError::InvalidInvocation(_))));
    }
}
