//! QuickTrain Training
//!
//! Backend-agnostic pipeline pieces for:
//! - Describing inbound requests and launched jobs (`TrainingRequest`, `JobInvocation`)
//! - Resolving remote archives and flattening class directories
//! - Assembling `train` / `validation` datasets, including auto-split
//! - Publishing trained models under deterministic keys
//! - Implementing model fitters and training backends

pub mod archive;
pub mod artifacts;
pub mod dataset;
pub mod error;
pub mod invocation;
pub mod job;
pub mod layout;
pub mod normalize;
pub mod progress;
pub mod split;
pub mod tabular;
pub mod trainer;

pub use archive::{ArchiveFormat, ArchiveResolver, ExtractedPath};
pub use artifacts::{artifact_key, ArtifactPublisher, PublishedArtifact};
pub use dataset::{list_files, ClassDataset, DatasetAssembler, DatasetTree, ValidationSource};
pub use error::{ResolutionError, TrainingError, TrainingResult};
pub use invocation::{
    ArgCursor, ArgValue, BoundArg, ComputeClass, ExecutionEnvironment, JobInvocation, ParamKind, RequestField,
};
pub use job::{TrainingJobId, TrainingRequest};
pub use layout::{class_label, JobLayout, Partition};
pub use normalize::{normalize, normalize_class_dir, NormalizeReport};
pub use progress::{ProgressEvent, ProgressSink, Stage, TracingProgressSink};
pub use split::{SplitPolicy, DEFAULT_HOLDOUT_FRACTION};
pub use tabular::{read_labeled_text, write_labeled_csv, CsvTable, LabeledTable, LabeledText};
pub use trainer::{FitRequest, ModelFitter, PreparedDataset, TrainingBackend};
