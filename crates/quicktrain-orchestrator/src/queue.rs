//! Bounded job queue between the dispatcher and the worker.

use crate::dispatcher::JobLauncher;
use crate::error::LaunchError;
use quicktrain_training::JobInvocation;
use tokio::sync::mpsc;
use tracing::debug;

/// Default number of jobs that may wait for a worker slot.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Sending half of the job queue.
#[derive(Debug, Clone)]
pub struct JobQueue {
    sender: mpsc::Sender<JobInvocation>,
    capacity: usize,
}

/// Receiving half, consumed by a [`JobWorker`](crate::JobWorker).
#[derive(Debug)]
pub struct JobReceiver {
    receiver: mpsc::Receiver<JobInvocation>,
}

impl JobReceiver {
    /// Waits for the next job; `None` once every sender is dropped.
    pub async fn recv(&mut self) -> Option<JobInvocation> {
        self.receiver.recv().await
    }
}

impl JobQueue {
    /// Creates a queue holding at most `capacity` pending jobs.
    ///
    /// # Arguments
    /// * `capacity` - Maximum pending jobs; zero is raised to one
    #[must_use]
    pub fn new(capacity: usize) -> (Self, JobReceiver) {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender, capacity }, JobReceiver { receiver })
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Jobs currently waiting.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.capacity - self.sender.capacity()
    }
}

impl JobLauncher for JobQueue {
    fn launch(&self, invocation: JobInvocation) -> Result<(), LaunchError> {
        let job_id = invocation.job_id.clone();
        self.sender.try_send(invocation).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => LaunchError::QueueFull(self.capacity),
            mpsc::error::TrySendError::Closed(_) => LaunchError::Closed,
        })?;
        debug!(job_id = %job_id, pending = self.pending(), "Job queued");
        Ok(())
    }
}
