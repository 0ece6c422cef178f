//! Model fitters.
//!
//! A fitter is the opaque `train(dataset) -> artifact` step. `ManifestFitter` writes a
//! description of the prepared dataset as the artifact, which is enough for dry runs
//! and tests. `CommandFitter` hands the dataset to an external program per model type.

use crate::config::{FitterConfig, FitterKind};
use async_trait::async_trait;
use chrono::Utc;
use quicktrain_training::{FitRequest, ModelFitter, PreparedDataset, TrainingError, TrainingResult};
use serde_json::json;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, info};

/// Builds the fitter selected in the configuration.
#[must_use]
pub fn build_fitter(config: &FitterConfig) -> Arc<dyn ModelFitter> {
    match config.kind {
        FitterKind::Manifest => Arc::new(ManifestFitter),
        FitterKind::Command => Arc::new(CommandFitter::new(config.commands.clone())),
    }
}

/// Fails on datasets no model could be fitted on.
fn check_trainable(dataset: &PreparedDataset) -> TrainingResult<()> {
    match dataset {
        PreparedDataset::ImageFolders(tree) => {
            if let Some(empty) = tree.train.iter().find(|c| c.files == 0) {
                return Err(TrainingError::Trainer(format!("no images found for {}", empty.label)));
            }
        }
        PreparedDataset::LabeledText { train_rows: 0, .. } => {
            return Err(TrainingError::Trainer("no training rows".to_string()));
        }
        PreparedDataset::LabeledText { .. } | PreparedDataset::Table { .. } => {}
    }
    Ok(())
}

fn manifest_json(request: &FitRequest, fitter: &str) -> TrainingResult<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(&json!({
        "job_id": request.job_id,
        "model_type": request.model_type,
        "fitter": fitter,
        "created_at": Utc::now(),
        "dataset": request.dataset,
    }))?)
}

async fn ensure_parent(path: &Path) -> TrainingResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    Ok(())
}

/// Writes the dataset manifest as the model artifact.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestFitter;

#[async_trait]
impl ModelFitter for ManifestFitter {
    fn name(&self) -> &'static str {
        "manifest"
    }

    async fn fit(&self, request: &FitRequest) -> TrainingResult<PathBuf> {
        check_trainable(&request.dataset)?;
        ensure_parent(&request.output).await?;
        tokio::fs::write(&request.output, manifest_json(request, self.name())?).await?;
        Ok(request.output.clone())
    }
}

/// Runs a configured program per model type.
///
/// Arguments may contain `{dataset}`, `{output}`, `{manifest}` and `{job_id}`, which
/// are replaced before the program starts. The program must exit successfully and
/// leave a file at `{output}`.
#[derive(Debug, Clone, Default)]
pub struct CommandFitter {
    commands: HashMap<String, Vec<String>>,
}

impl CommandFitter {
    #[must_use]
    pub fn new(commands: HashMap<String, Vec<String>>) -> Self {
        Self { commands }
    }

    fn argv(&self, request: &FitRequest, manifest: &Path) -> TrainingResult<Vec<String>> {
        let template = self
            .commands
            .get(&request.model_type)
            .filter(|argv| !argv.is_empty())
            .ok_or_else(|| {
                TrainingError::Trainer(format!("no fit command configured for model type '{}'", request.model_type))
            })?;

        let dataset = request.dataset.root().display().to_string();
        let output = request.output.display().to_string();
        let manifest = manifest.display().to_string();
        Ok(template
            .iter()
            .map(|arg| {
                arg.replace("{dataset}", &dataset)
                    .replace("{output}", &output)
                    .replace("{manifest}", &manifest)
                    .replace("{job_id}", &request.job_id)
            })
            .collect())
    }
}

#[async_trait]
impl ModelFitter for CommandFitter {
    fn name(&self) -> &'static str {
        "command"
    }

    async fn fit(&self, request: &FitRequest) -> TrainingResult<PathBuf> {
        check_trainable(&request.dataset)?;
        ensure_parent(&request.output).await?;

        let manifest = request.dataset.root().join("dataset.json");
        tokio::fs::write(&manifest, manifest_json(request, self.name())?).await?;

        let argv = self.argv(request, &manifest)?;
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| TrainingError::Trainer("empty fit command".to_string()))?;
        info!(job_id = %request.job_id, program = %program, "Starting fit command");

        let output = Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| TrainingError::Trainer(format!("failed to start '{program}': {e}")))?;

        debug!(
            job_id = %request.job_id,
            stdout = %String::from_utf8_lossy(&output.stdout).trim(),
            "Fit command finished"
        );
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TrainingError::Trainer(format!("'{program}' exited with {}: {}", output.status, stderr.trim())));
        }

        if !tokio::fs::try_exists(&request.output).await? {
            return Err(TrainingError::Trainer(format!(
                "'{program}' did not write {}",
                request.output.display()
            )));
        }
        Ok(request.output.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quicktrain_training::{ClassDataset, DatasetTree, ValidationSource};
    use tempfile::TempDir;

    fn image_request(root: &Path, files: [usize; 2], model_type: &str) -> FitRequest {
        let class = |i: usize| ClassDataset {
            label: format!("class_{i}"),
            dir: root.join(format!("train/class_{i}")),
            files: files[i],
        };
        FitRequest {
            job_id: "j2".to_string(),
            model_type: model_type.to_string(),
            dataset: PreparedDataset::ImageFolders(DatasetTree {
                root: root.to_path_buf(),
                train: vec![class(0), class(1)],
                validation: Vec::new(),
                validation_source: ValidationSource::None,
            }),
            output: root.join("output/model.pth"),
        }
    }

    #[tokio::test]
    async fn test_manifest_fitter_writes_artifact() {
        let temp = TempDir::new().unwrap();
        let request = image_request(temp.path(), [4, 3], "resnet");

        let path = ManifestFitter.fit(&request).await.unwrap();
        assert_eq!(path, request.output);

        let manifest: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(manifest["job_id"], "j2");
        assert_eq!(manifest["fitter"], "manifest");
        assert_eq!(manifest["dataset"]["validation_source"], "none");
    }

    #[tokio::test]
    async fn test_manifest_fitter_rejects_empty_class() {
        let temp = TempDir::new().unwrap();
        let request = image_request(temp.path(), [4, 0], "resnet");

        let err = ManifestFitter.fit(&request).await.unwrap_err();
        assert!(err.to_string().contains("no images found"));
    }

    #[test]
    fn test_build_fitter_by_kind() {
        assert_eq!(build_fitter(&FitterConfig::default()).name(), "manifest");
        let config = FitterConfig { kind: FitterKind::Command, commands: HashMap::new() };
        assert_eq!(build_fitter(&config).name(), "command");
    }

    #[tokio::test]
    async fn test_command_fitter_without_command() {
        let temp = TempDir::new().unwrap();
        let request = image_request(temp.path(), [1, 1], "resnet");

        let err = CommandFitter::default().fit(&request).await.unwrap_err();
        assert!(err.to_string().contains("no fit command configured"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_fitter_substitutes_placeholders() {
        let temp = TempDir::new().unwrap();
        let request = image_request(temp.path(), [2, 2], "resnet");
        let commands = HashMap::from([(
            "resnet".to_string(),
            vec!["sh".to_string(), "-c".to_string(), "cp {manifest} {output}".to_string()],
        )]);

        let path = CommandFitter::new(commands).fit(&request).await.unwrap();
        let manifest: serde_json::Value = serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
        assert_eq!(manifest["fitter"], "command");
        assert_eq!(manifest["dataset"]["train"][1]["files"], 2);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_fitter_reports_failure() {
        let temp = TempDir::new().unwrap();
        let request = image_request(temp.path(), [2, 2], "resnet");
        let commands = HashMap::from([(
            "resnet".to_string(),
            vec!["sh".to_string(), "-c".to_string(), "echo 'CUDA unavailable' >&2; exit 3".to_string()],
        )]);

        let err = CommandFitter::new(commands).fit(&request).await.unwrap_err();
        assert!(err.to_string().contains("CUDA unavailable"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_fitter_requires_output() {
        let temp = TempDir::new().unwrap();
        let request = image_request(temp.path(), [2, 2], "resnet");
        let commands = HashMap::from([("resnet".to_string(), vec!["true".to_string()])]);

        let err = CommandFitter::new(commands).fit(&request).await.unwrap_err();
        assert!(err.to_string().contains("did not write"));
    }
}
