use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use crate::models::job::{truncate_error, Job, JobId, JobSource, JobStatus};

/// Key-value storage for job records.
///
/// The in-memory store lives for the process lifetime; a durable backend can
/// be swapped in without touching the registry or the orchestrator.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert(&self, job: Job) -> Result<(), StoreError>;

    async fn get(&self, id: JobId) -> Result<Option<Job>, StoreError>;

    async fn put(&self, job: Job) -> Result<(), StoreError>;

    async fn len(&self) -> Result<usize, StoreError>;
}

/// Process-local [`JobStore`].
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert(&self, job: Job) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write();
        if jobs.contains_key(&job.id) {
            return Err(StoreError::Duplicate(job.id));
        }
        jobs.insert(job.id, job);
        Ok(())
    }

    async fn get(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        Ok(self.jobs.read().get(&id).cloned())
    }

    async fn put(&self, job: Job) -> Result<(), StoreError> {
        self.jobs.write().insert(job.id, job);
        Ok(())
    }

    async fn len(&self) -> Result<usize, StoreError> {
        Ok(self.jobs.read().len())
    }
}

/// Lifecycle rules on top of a [`JobStore`].
///
/// Only the orchestrator run that owns a job writes to it, so the
/// read-modify-write in `set_status`/`set_error` never races another writer.
#[derive(Clone)]
pub struct JobRegistry {
    store: Arc<dyn JobStore>,
}

impl JobRegistry {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryJobStore::new()))
    }

    /// Register a fresh `queued` job.
    pub async fn create(&self, source: JobSource) -> Result<JobId, RegistryError> {
        let job = Job::new(source);
        let id = job.id;
        self.store.insert(job).await?;
        metrics::counter!("conversion_jobs_submitted_total", "source" => source.to_string())
            .increment(1);
        Ok(id)
    }

    pub async fn get(&self, id: JobId) -> Result<Job, RegistryError> {
        self.store.get(id).await?.ok_or(RegistryError::NotFound(id))
    }

    pub async fn set_status(&self, id: JobId, status: JobStatus) -> Result<(), RegistryError> {
        let mut job = self.get(id).await?;
        if !job.status.can_advance_to(status) {
            return Err(RegistryError::InvalidTransition {
                id,
                from: job.status,
                to: status,
            });
        }
        job.status = status;
        job.updated_at = Utc::now();
        self.store.put(job).await?;
        tracing::debug!(job_id = %id, status = %status, "Job status updated");
        Ok(())
    }

    /// Record a terminal failure; the message is truncated to 1500 characters.
    pub async fn set_error(&self, id: JobId, message: &str) -> Result<(), RegistryError> {
        let mut job = self.get(id).await?;
        if !job.status.can_advance_to(JobStatus::Error) {
            return Err(RegistryError::InvalidTransition {
                id,
                from: job.status,
                to: JobStatus::Error,
            });
        }
        job.status = JobStatus::Error;
        job.error = Some(truncate_error(message));
        job.updated_at = Utc::now();
        self.store.put(job).await?;
        Ok(())
    }

    pub async fn count(&self) -> Result<usize, RegistryError> {
        Ok(self.store.len().await?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("job {0} already exists")]
    Duplicate(JobId),
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("job {0} not found")]
    NotFound(JobId),

    #[error("job {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: JobId,
        from: JobStatus,
        to: JobStatus,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}
