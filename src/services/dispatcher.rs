use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::services::orchestrator::{Orchestrator, Submission};

/// Bounded worker pool fed by a bounded queue.
///
/// Submissions are admitted only if a queue slot is free; callers reserve the
/// slot before registering the job so a rejected submission leaves no trace.
pub struct JobDispatcher {
    sender: mpsc::Sender<Submission>,
    depth: Arc<AtomicUsize>,
    workers: Vec<JoinHandle<()>>,
}

/// A reserved queue slot. Dropping it releases the slot unused.
pub struct DispatchSlot {
    permit: mpsc::OwnedPermit<Submission>,
    depth: Arc<AtomicUsize>,
}

impl DispatchSlot {
    pub fn dispatch(self, submission: Submission) {
        let depth = self.depth.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::gauge!("conversion_queue_depth").set(depth as f64);
        tracing::debug!(job_id = %submission.job_id, queue_depth = depth, "Job queued");
        self.permit.send(submission);
    }
}

impl JobDispatcher {
    /// Spawn `worker_count` workers sharing a queue of `capacity` slots.
    pub fn start(orchestrator: Arc<Orchestrator>, worker_count: usize, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let depth = Arc::new(AtomicUsize::new(0));

        let workers = (0..worker_count.max(1))
            .map(|worker_id| {
                tokio::spawn(worker_loop(
                    worker_id,
                    receiver.clone(),
                    orchestrator.clone(),
                    depth.clone(),
                ))
            })
            .collect();

        tracing::info!(worker_count, capacity, "Job dispatcher started");
        Self {
            sender,
            depth,
            workers,
        }
    }

    /// Reserve a queue slot, or fail immediately if the pool is saturated.
    pub fn try_reserve(&self) -> Result<DispatchSlot, DispatchError> {
        match self.sender.clone().try_reserve_owned() {
            Ok(permit) => Ok(DispatchSlot {
                permit,
                depth: self.depth.clone(),
            }),
            Err(TrySendError::Full(_)) => {
                metrics::counter!("conversion_jobs_rejected_total").increment(1);
                Err(DispatchError::Saturated)
            }
            Err(TrySendError::Closed(_)) => Err(DispatchError::Closed),
        }
    }

    /// Jobs waiting for a worker.
    pub fn queue_depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

impl Drop for JobDispatcher {
    fn drop(&mut self) {
        for worker in &self.workers {
            worker.abort();
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<Submission>>>,
    orchestrator: Arc<Orchestrator>,
    depth: Arc<AtomicUsize>,
) {
    tracing::debug!(worker_id, "Worker started");
    loop {
        let next = { receiver.lock().await.recv().await };
        let Some(submission) = next else {
            break;
        };

        let remaining = depth.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        metrics::gauge!("conversion_queue_depth").set(remaining as f64);

        tracing::debug!(worker_id, job_id = %submission.job_id, "Worker picked up job");
        orchestrator.run(submission).await;
    }
    tracing::debug!(worker_id, "Worker stopped: queue closed");
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Server is busy, try again later")]
    Saturated,

    #[error("Job queue is shut down")]
    Closed,
}
