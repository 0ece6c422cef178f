//! Wires storage, registry, dispatcher, queue and worker into one service.

use crate::config::Config;
use crate::error::{CoreError, Result};
use crate::training::{
    build_fitter, BackendContext, ImageClassifierBackend, TabularBackend, TextClassifierBackend,
};
use quicktrain_abstraction::ObjectStore;
use quicktrain_orchestrator::{
    BackendDescriptor, BackendRegistry, JobDispatcher, JobEvent, JobQueue, JobReceiver, JobWorker, JobWorkerConfig,
};
use quicktrain_storage::StoreFactory;
use quicktrain_training::{SplitPolicy, TrainingBackend};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Concrete backend for a built-in descriptor, `None` for model types this build cannot run.
fn backend_for(
    descriptor: &BackendDescriptor,
    context: &Arc<BackendContext>,
) -> Option<Arc<dyn TrainingBackend>> {
    let capability = descriptor.capability.clone();
    let extension = descriptor.artifact_extension.clone();
    let context = Arc::clone(context);
    let backend: Arc<dyn TrainingBackend> = match descriptor.model_type.as_str() {
        "resnet" => Arc::new(ImageClassifierBackend::new(capability, extension, context)),
        "tinybert" => Arc::new(TextClassifierBackend::new(capability, extension, context)),
        "ebm" => Arc::new(TabularBackend::new(capability, extension, context)),
        _ => return None,
    };
    Some(backend)
}

/// A running QuickTrain service: requests go in through the dispatcher and come out
/// as job events.
pub struct Runtime {
    registry: Arc<BackendRegistry>,
    dispatcher: Arc<JobDispatcher>,
    queue: JobQueue,
    worker: JobWorker,
    receiver: Option<JobReceiver>,
    store: Arc<dyn ObjectStore>,
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("store", &self.store.name())
            .field("registry", &self.registry)
            .field("worker", &self.worker)
            .finish_non_exhaustive()
    }
}

impl Runtime {
    /// Builds the service with the object store named in `config`.
    ///
    /// # Errors
    /// Returns an error if the store cannot be created or a backend does not match
    /// its descriptor.
    pub fn build(config: &Config) -> Result<Self> {
        let store = StoreFactory::create(&config.storage.store_config())?;
        Self::build_with_store(config, store)
    }

    /// Builds the service over an existing store.
    pub fn build_with_store(config: &Config, store: Arc<dyn ObjectStore>) -> Result<Self> {
        let registry = Arc::new(BackendRegistry::builtin()?);

        let split = SplitPolicy { seed: config.worker.split_seed, ..SplitPolicy::default() };
        let context = Arc::new(
            BackendContext::new(Arc::clone(&store), build_fitter(&config.fitter), config.worker.work_root.clone())
                .with_split(split)
                .with_signed_url_ttl(config.worker.signed_url_ttl())
                .keep_workdirs(config.worker.keep_workdirs),
        );

        let mut worker = JobWorker::new(
            Arc::clone(&registry),
            JobWorkerConfig { max_concurrent_jobs: config.worker.max_concurrent_jobs },
        );
        for descriptor in registry.descriptors() {
            match backend_for(descriptor, &context) {
                Some(backend) => worker.register_backend(backend)?,
                None => warn!(model_type = %descriptor.model_type, "No backend implementation, jobs will fail"),
            }
        }

        let (queue, receiver) = JobQueue::new(config.worker.queue_capacity);
        let dispatcher = Arc::new(JobDispatcher::new(Arc::clone(&registry), Arc::new(queue.clone())));

        info!(
            store = store.name(),
            backends = registry.len(),
            queue_capacity = queue.capacity(),
            work_root = %config.worker.work_root.display(),
            "Runtime built"
        );
        Ok(Self { registry, dispatcher, queue, worker, receiver: Some(receiver), store })
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn dispatcher(&self) -> Arc<JobDispatcher> {
        Arc::clone(&self.dispatcher)
    }

    #[must_use]
    pub fn store(&self) -> Arc<dyn ObjectStore> {
        Arc::clone(&self.store)
    }

    /// Jobs queued but not yet picked up.
    #[must_use]
    pub fn pending_jobs(&self) -> usize {
        self.queue.pending()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.worker.subscribe()
    }

    /// Starts the worker. Must be called from inside a Tokio runtime.
    ///
    /// # Errors
    /// Returns `CoreError::Worker` if the worker was already started.
    pub fn start(&mut self) -> Result<()> {
        let receiver = self
            .receiver
            .take()
            .ok_or_else(|| CoreError::Worker("job worker was already started".to_string()))?;
        self.worker.start(receiver).map_err(CoreError::Worker)
    }

    /// Stops taking new jobs.
    pub fn stop(&mut self) -> Result<()> {
        self.worker.stop().map_err(CoreError::Worker)
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.worker.is_running()
    }
}
