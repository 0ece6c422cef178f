use crate::error::TrainingResult;
use crate::job::TrainingJobId;
use std::path::{Path, PathBuf};

/// Dataset partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
    Train,
    Validation,
}

impl Partition {
    #[must_use]
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Train => "train",
            Self::Validation => "validation",
        }
    }
}

/// Class label for the archive at argument position `index`.
#[must_use]
pub fn class_label(index: usize) -> String {
    format!("class_{index}")
}

/// Filesystem layout of one job's working directory.
///
/// Layout is `<work_root>/<job dir>/{dataset/{train,validation},output}`, where the job
/// dir is [`TrainingJobId::path_component`]. Distinct ids never share a directory.
#[derive(Debug, Clone)]
pub struct JobLayout {
    root: PathBuf,
}

impl JobLayout {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    #[must_use]
    pub fn for_job(work_root: &Path, job_id: &TrainingJobId) -> Self {
        Self::new(work_root.join(job_id.path_component()))
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn dataset_dir(&self) -> PathBuf {
        self.root.join("dataset")
    }

    #[must_use]
    pub fn partition_dir(&self, partition: Partition) -> PathBuf {
        self.dataset_dir().join(partition.dir_name())
    }

    #[must_use]
    pub fn class_dir(&self, partition: Partition, index: usize) -> PathBuf {
        self.partition_dir(partition).join(class_label(index))
    }

    #[must_use]
    pub fn output_dir(&self) -> PathBuf {
        self.root.join("output")
    }

    /// Clears leftovers from a previous run of the same job and recreates the skeleton.
    pub async fn prepare(&self) -> TrainingResult<()> {
        if tokio::fs::try_exists(&self.root).await? {
            tokio::fs::remove_dir_all(&self.root).await?;
        }
        tokio::fs::create_dir_all(self.partition_dir(Partition::Train)).await?;
        tokio::fs::create_dir_all(self.partition_dir(Partition::Validation)).await?;
        tokio::fs::create_dir_all(self.output_dir()).await?;
        Ok(())
    }

    pub async fn cleanup(&self) -> TrainingResult<()> {
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
