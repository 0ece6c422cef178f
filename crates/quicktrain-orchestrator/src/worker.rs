//! Job worker.
//!
//! Consumes the job queue and runs each invocation on the backend registered for
//! its capability, bounded by a concurrency limit and the invocation's timeout.
//! Once started, a job runs to completion or timeout.

use crate::error::RegistryError;
use crate::events::{BroadcastProgressSink, JobEvent, EVENT_CHANNEL_CAPACITY};
use crate::queue::JobReceiver;
use crate::registry::BackendRegistry;
use quicktrain_training::{JobInvocation, TrainingBackend};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Semaphore};
use tracing::{debug, error, info, warn};

/// Configuration for the job worker.
#[derive(Debug, Clone)]
pub struct JobWorkerConfig {
    /// Jobs allowed to run at once.
    pub max_concurrent_jobs: usize,
}

impl Default for JobWorkerConfig {
    fn default() -> Self {
        Self { max_concurrent_jobs: 2 }
    }
}

type BackendMap = HashMap<String, Arc<dyn TrainingBackend>>;

/// Runs queued jobs on registered backends.
pub struct JobWorker {
    /// Descriptors backends are checked against.
    registry: Arc<BackendRegistry>,
    /// Capability to implementation.
    backends: BackendMap,
    config: JobWorkerConfig,
    events: broadcast::Sender<JobEvent>,
    shutdown_tx: Option<watch::Sender<()>>,
}

impl std::fmt::Debug for JobWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobWorker")
            .field("config", &self.config)
            .field("backends", &self.backends.keys().collect::<Vec<_>>())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl JobWorker {
    /// Creates a worker with no backends.
    #[must_use]
    pub fn new(registry: Arc<BackendRegistry>, config: JobWorkerConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { registry, backends: HashMap::new(), config, events, shutdown_tx: None }
    }

    /// Registers an implementation for a descriptor's capability.
    ///
    /// # Errors
    /// Returns `UnknownCapability` if no descriptor declares the capability, and
    /// `ParameterMismatch` if the implementation reads a different parameter list.
    pub fn register_backend(&mut self, backend: Arc<dyn TrainingBackend>) -> Result<(), RegistryError> {
        let capability = backend.capability().to_string();
        let descriptor = self
            .registry
            .by_capability(&capability)
            .ok_or_else(|| RegistryError::UnknownCapability(capability.clone()))?;

        let expected = descriptor.parameter_names();
        if expected != backend.parameters() {
            return Err(RegistryError::ParameterMismatch {
                capability,
                expected: expected.iter().map(ToString::to_string).collect(),
                actual: backend.parameters().iter().map(ToString::to_string).collect(),
            });
        }

        debug!(capability = %capability, "Registered backend implementation");
        self.backends.insert(capability, backend);
        Ok(())
    }

    /// Subscribes to job events.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    #[must_use]
    pub fn events(&self) -> broadcast::Sender<JobEvent> {
        self.events.clone()
    }

    /// Starts consuming `receiver` in a background task.
    ///
    /// # Errors
    /// Returns an error if the worker is already running.
    pub fn start(&mut self, mut receiver: JobReceiver) -> Result<(), String> {
        if self.shutdown_tx.is_some() {
            return Err("Job worker is already running".to_string());
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(());
        self.shutdown_tx = Some(shutdown_tx);

        let backends = Arc::new(self.backends.clone());
        let events = self.events.clone();
        let permits = Arc::new(Semaphore::new(self.config.max_concurrent_jobs.max(1)));

        tokio::spawn(async move {
            info!(backends = backends.len(), "Job worker started");
            loop {
                let invocation = tokio::select! {
                    _ = shutdown_rx.changed() => {
                        info!("Job worker shutdown signal received");
                        break;
                    }
                    next = receiver.recv() => match next {
                        Some(invocation) => invocation,
                        None => {
                            info!("Job queue closed, worker exiting");
                            break;
                        }
                    },
                };

                let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                    break;
                };
                let backends = Arc::clone(&backends);
                let events = events.clone();
                tokio::spawn(async move {
                    run_job(&backends, invocation, &events).await;
                    drop(permit);
                });
            }
        });
        Ok(())
    }

    /// Stops taking new jobs. Jobs already running are not interrupted.
    ///
    /// # Errors
    /// Returns an error if the worker is not running.
    pub fn stop(&mut self) -> Result<(), String> {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
            Ok(())
        } else {
            Err("Job worker is not running".to_string())
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shutdown_tx.is_some()
    }
}

async fn run_job(backends: &BackendMap, invocation: JobInvocation, events: &broadcast::Sender<JobEvent>) {
    let job_id = invocation.job_id.clone();
    let emit = |event: JobEvent| {
        let _ = events.send(event);
    };

    let Some(backend) = backends.get(&invocation.capability) else {
        error!(job_id = %job_id, capability = %invocation.capability, "No backend for capability");
        emit(JobEvent::Failed {
            job_id,
            error: format!("no backend registered for capability '{}'", invocation.capability),
        });
        return;
    };

    info!(job_id = %job_id, model_type = %invocation.model_type, "Job started");
    emit(JobEvent::Started { job_id: job_id.clone(), model_type: invocation.model_type.clone() });

    let sink = BroadcastProgressSink::new(job_id.clone(), events.clone());
    let timeout = invocation.environment.timeout;

    match tokio::time::timeout(timeout, backend.run(&invocation, &sink)).await {
        Ok(Ok(artifact)) => {
            info!(job_id = %job_id, key = %artifact.key, "Job completed");
            emit(JobEvent::Completed { job_id, artifact });
        }
        Ok(Err(e)) => {
            error!(job_id = %job_id, error = %e, "Job failed");
            emit(JobEvent::Failed { job_id, error: e.to_string() });
        }
        Err(_) => {
            warn!(job_id = %job_id, timeout_secs = timeout.as_secs(), "Job timed out");
            emit(JobEvent::TimedOut { job_id, timeout_secs: timeout.as_secs() });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::JobLauncher;
    use crate::queue::JobQueue;
    use async_trait::async_trait;
    use chrono::Utc;
    use quicktrain_training::{
        ArgValue, BoundArg, ComputeClass, ExecutionEnvironment, ProgressSink, PublishedArtifact,
        TrainingError, TrainingResult,
    };
    use std::time::Duration;

    struct StubBackend {
        capability: &'static str,
        params: &'static [&'static str],
        delay: Duration,
        fail: bool,
    }

    #[async_trait]
    impl TrainingBackend for StubBackend {
        fn capability(&self) -> &str {
            self.capability
        }

        fn parameters(&self) -> &[&'static str] {
            self.params
        }

        async fn run(&self, invocation: &JobInvocation, _progress: &dyn ProgressSink) -> TrainingResult<PublishedArtifact> {
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(TrainingError::Trainer("no images found".to_string()));
            }
            Ok(PublishedArtifact {
                key: format!("models/ebm_{}.pkl", invocation.job_id),
                sha256: String::new(),
                size_bytes: 0,
                signed_url: None,
                published_at: Utc::now(),
            })
        }
    }

    const EBM: &str = "ebm-training-service/train_ebm";
    const EBM_PARAMS: &[&str] = &["trainFile1", "jobId"];

    fn invocation(job_id: &str, timeout: Duration) -> JobInvocation {
        JobInvocation {
            job_id: job_id.to_string(),
            model_type: "ebm".to_string(),
            capability: EBM.to_string(),
            environment: ExecutionEnvironment { compute: ComputeClass::Cpu { cores: 2.0 }, timeout },
            args: vec![
                BoundArg { name: "trainFile1".to_string(), value: ArgValue::Text("d.csv".to_string()) },
                BoundArg { name: "jobId".to_string(), value: ArgValue::Text(job_id.to_string()) },
            ],
        }
    }

    fn worker() -> JobWorker {
        JobWorker::new(Arc::new(BackendRegistry::builtin().unwrap()), JobWorkerConfig::default())
    }

    async fn terminal(rx: &mut broadcast::Receiver<JobEvent>) -> JobEvent {
        loop {
            let event = rx.recv().await.unwrap();
            if event.is_terminal() {
                return event;
            }
        }
    }

    #[test]
    fn test_register_backend_checks_contract() {
        let mut worker = worker();
        let mismatched = StubBackend {
            capability: EBM,
            params: &["jobId", "trainFile1"],
            delay: Duration::ZERO,
            fail: false,
        };
        assert!(matches!(
            worker.register_backend(Arc::new(mismatched)),
            Err(RegistryError::ParameterMismatch { .. })
        ));

        let unknown = StubBackend { capability: "x/y", params: EBM_PARAMS, delay: Duration::ZERO, fail: false };
        assert!(matches!(worker.register_backend(Arc::new(unknown)), Err(RegistryError::UnknownCapability(_))));

        let ok = StubBackend { capability: EBM, params: EBM_PARAMS, delay: Duration::ZERO, fail: false };
        assert!(worker.register_backend(Arc::new(ok)).is_ok());
    }

    #[tokio::test]
    async fn test_worker_runs_job_to_completion() {
        let mut worker = worker();
        worker
            .register_backend(Arc::new(StubBackend {
                capability: EBM,
                params: EBM_PARAMS,
                delay: Duration::ZERO,
                fail: false,
            }))
            .unwrap();
        let mut events = worker.subscribe();
        let (queue, receiver) = JobQueue::new(4);
        worker.start(receiver).unwrap();
        assert!(worker.start(JobQueue::new(1).1).is_err());

        queue.launch(invocation("j1", Duration::from_secs(5))).unwrap();

        let started = events.recv().await.unwrap();
        assert!(matches!(started, JobEvent::Started { .. }));
        match terminal(&mut events).await {
            JobEvent::Completed { job_id, artifact } => {
                assert_eq!(job_id, "j1");
                assert_eq!(artifact.key, "models/ebm_j1.pkl");
            }
            other => panic!("unexpected event: {other:?}"),
        }
        worker.stop().unwrap();
        assert!(!worker.is_running());
    }

    #[tokio::test]
    async fn test_worker_reports_failure() {
        let mut worker = worker();
        worker
            .register_backend(Arc::new(StubBackend { capability: EBM, params: EBM_PARAMS, delay: Duration::ZERO, fail: true }))
            .unwrap();
        let mut events = worker.subscribe();
        let (queue, receiver) = JobQueue::new(4);
        worker.start(receiver).unwrap();

        queue.launch(invocation("j1", Duration::from_secs(5))).unwrap();
        match terminal(&mut events).await {
            JobEvent::Failed { error, .. } => assert!(error.contains("no images found")),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_enforces_timeout() {
        let mut worker = worker();
        worker
            .register_backend(Arc::new(StubBackend {
                capability: EBM,
                params: EBM_PARAMS,
                delay: Duration::from_secs(3600),
                fail: false,
            }))
            .unwrap();
        let mut events = worker.subscribe();
        let (queue, receiver) = JobQueue::new(4);
        worker.start(receiver).unwrap();

        queue.launch(invocation("slow", Duration::from_secs(1200))).unwrap();
        assert_eq!(
            terminal(&mut events).await,
            JobEvent::TimedOut { job_id: "slow".to_string(), timeout_secs: 1200 }
        );
    }

    #[tokio::test]
    async fn test_unregistered_capability_fails_job() {
        let mut worker = worker();
        let mut events = worker.subscribe();
        let (queue, receiver) = JobQueue::new(4);
        worker.start(receiver).unwrap();

        queue.launch(invocation("j1", Duration::from_secs(5))).unwrap();
        assert!(matches!(terminal(&mut events).await, JobEvent::Failed { .. }));
    }
}
