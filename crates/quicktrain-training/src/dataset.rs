//! Dataset Assembler: builds the `train` / `validation` class tree for a job.

use crate::archive::ArchiveResolver;
use crate::error::{TrainingError, TrainingResult};
use crate::layout::{class_label, JobLayout, Partition};
use crate::normalize::normalize;
use crate::split::SplitPolicy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One class directory inside a partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassDataset {
    pub label: String,
    pub dir: PathBuf,
    pub files: usize,
}

/// Where the validation partition came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationSource {
    /// Caller-supplied validation archives.
    Explicit,
    /// Carved out of the training files.
    AutoSplit,
    /// No validation; evaluation is skipped.
    None,
}

/// Assembled dataset for one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetTree {
    pub root: PathBuf,
    pub train: Vec<ClassDataset>,
    pub validation: Vec<ClassDataset>,
    pub validation_source: ValidationSource,
}

impl DatasetTree {
    #[must_use]
    pub fn has_validation(&self) -> bool {
        !self.validation.is_empty()
    }

    #[must_use]
    pub fn labels(&self, partition: Partition) -> BTreeSet<&str> {
        let classes = match partition {
            Partition::Train => &self.train,
            Partition::Validation => &self.validation,
        };
        classes.iter().map(|c| c.label.as_str()).collect()
    }

    /// Checks that both partitions carry the same labels, unless validation is empty.
    pub fn verify(&self) -> TrainingResult<()> {
        if !self.has_validation() {
            return Ok(());
        }
        let train = self.labels(Partition::Train);
        let validation = self.labels(Partition::Validation);
        if train != validation {
            return Err(TrainingError::Assembly(format!(
                "class labels differ between partitions: train {train:?}, validation {validation:?}"
            )));
        }
        Ok(())
    }
}

/// Resolves, normalizes and partitions class archives into a [`DatasetTree`].
#[derive(Debug, Clone)]
pub struct DatasetAssembler {
    resolver: ArchiveResolver,
    split: SplitPolicy,
}

impl DatasetAssembler {
    #[must_use]
    pub fn new(resolver: ArchiveResolver, split: SplitPolicy) -> Self {
        Self { resolver, split }
    }

    /// Assembles the dataset under `layout`.
    ///
    /// `train_refs[k]` becomes `train/class_k`. Explicit validation is used only when
    /// every class has a test reference; if any of them cannot be resolved, the
    /// explicit set is discarded and the auto-split rule applies instead.
    pub async fn assemble(
        &self,
        layout: &JobLayout,
        train_refs: &[String],
        test_refs: &[Option<String>],
        auto_split: bool,
    ) -> TrainingResult<DatasetTree> {
        if train_refs.is_empty() {
            return Err(TrainingError::Assembly("no training references".to_string()));
        }

        let mut train = Vec::with_capacity(train_refs.len());
        for (index, key) in train_refs.iter().enumerate() {
            let dir = layout.class_dir(Partition::Train, index);
            self.resolver.resolve(key, &dir).await?;
            train.push(finish_class(index, dir).await?);
        }

        let explicit: Option<Vec<&str>> = (0..train_refs.len())
            .map(|k| test_refs.get(k).and_then(Option::as_deref))
            .collect();

        let mut validation = Vec::new();
        let mut source = ValidationSource::None;

        if let Some(keys) = explicit {
            match self.resolve_validation(layout, &keys).await? {
                Some(classes) => {
                    validation = classes;
                    source = ValidationSource::Explicit;
                }
                None => reset_dir(&layout.partition_dir(Partition::Validation)).await?,
            }
        }

        if source == ValidationSource::None && auto_split {
            validation = self.auto_split(layout, &mut train).await?;
            source = ValidationSource::AutoSplit;
        }

        let tree = DatasetTree {
            root: layout.dataset_dir(),
            train,
            validation,
            validation_source: source,
        };
        tree.verify()?;

        info!(
            root = %tree.root.display(),
            classes = tree.train.len(),
            validation = ?tree.validation_source,
            "Dataset assembled"
        );
        Ok(tree)
    }

    async fn resolve_validation(
        &self,
        layout: &JobLayout,
        keys: &[&str],
    ) -> TrainingResult<Option<Vec<ClassDataset>>> {
        let mut classes = Vec::with_capacity(keys.len());
        for (index, key) in keys.iter().enumerate() {
            let dir = layout.class_dir(Partition::Validation, index);
            if self.resolver.resolve_optional(key, &dir).await.is_none() {
                warn!(key = %key, "Explicit validation set incomplete, falling back");
                return Ok(None);
            }
            classes.push(finish_class(index, dir).await?);
        }
        Ok(Some(classes))
    }

    async fn auto_split(
        &self,
        layout: &JobLayout,
        train: &mut [ClassDataset],
    ) -> TrainingResult<Vec<ClassDataset>> {
        let mut validation = Vec::with_capacity(train.len());
        for (index, class) in train.iter_mut().enumerate() {
            let files = list_files(&class.dir).await?;
            let total = files.len();
            let (_, held_out) = self.split.partition(files);

            let target = layout.class_dir(Partition::Validation, index);
            tokio::fs::create_dir_all(&target).await?;
            for path in &held_out {
                if let Some(name) = path.file_name() {
                    tokio::fs::rename(path, target.join(name)).await?;
                }
            }

            debug!(label = %class.label, total, validation = held_out.len(), "Auto-split class");
            class.files = total - held_out.len();
            validation.push(ClassDataset { label: class.label.clone(), dir: target, files: held_out.len() });
        }
        Ok(validation)
    }
}

async fn finish_class(index: usize, dir: PathBuf) -> TrainingResult<ClassDataset> {
    tokio::fs::create_dir_all(&dir).await?;
    normalize(&dir).await?;
    let files = list_files(&dir).await?.len();
    Ok(ClassDataset { label: class_label(index), dir, files })
}

async fn reset_dir(dir: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    tokio::fs::create_dir_all(dir).await
}

/// Regular files directly under `dir`, sorted by name.
pub async fn list_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}
