//! Job orchestrator for QuickTrain.
//!
//! This module routes training requests to backends: the registry holds the
//! positional contract of each model type, the dispatcher validates and launches,
//! and the worker executes launched jobs and reports their outcome as events.

pub mod dispatcher;
pub mod error;
pub mod events;
pub mod queue;
pub mod registry;
pub mod worker;

pub use dispatcher::{Acknowledgement, JobDispatcher, JobLauncher};
pub use error::{DispatchError, LaunchError, RegistryError, Result};
pub use events::{BroadcastProgressSink, JobEvent};
pub use queue::{JobQueue, JobReceiver, DEFAULT_QUEUE_CAPACITY};
pub use registry::{builtin_descriptors, BackendDescriptor, BackendRegistry, ParamSpec};
pub use worker::{JobWorker, JobWorkerConfig};
