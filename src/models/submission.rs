use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::models::job::{Job, JobId, JobSource, JobStatus};

/// Form body for submitting (or previewing) media by URL.
#[derive(Debug, Deserialize, Validate)]
pub struct UrlSubmission {
    #[garde(length(max = 2048))]
    pub url: String,

    #[garde(length(min = 1, max = 8192))]
    pub init_data: String,
}

/// Acknowledgment returned as soon as a job is registered.
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub ok: bool,
    pub job_id: JobId,
    pub status: JobStatus,
}

/// Response for querying job status.
#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub ok: bool,
    pub job_id: JobId,
    pub status: JobStatus,
    pub source: JobSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Job> for JobStatusResponse {
    fn from(job: Job) -> Self {
        Self {
            ok: true,
            job_id: job.id,
            status: job.status,
            source: job.source,
            error: job.error,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

/// Metadata preview for a remote URL.
#[derive(Debug, Serialize)]
pub struct InfoResponse {
    pub ok: bool,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploader: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}
