//! Per-job conversion pipeline.
//!
//! ```text
//! queued → [downloading → downloaded] → converting
//!        → [preparing_cover → embedding_cover] → sending → done
//! ```
//!
//! Any stage failure moves the job straight to `error`. The registry is
//! updated before each stage's external call, and the workspace is removed
//! before the terminal status is written.

use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use tracing::Instrument;
use url::Url;

use crate::models::job::{JobId, JobSource, JobStatus};
use crate::models::media::{AssetRole, DisplayMetadata};
use crate::services::delivery::{DeliveryClient, DeliveryError, DeliveryRequest};
use crate::services::registry::{JobRegistry, RegistryError};
use crate::services::resolver::{FetchError, MetadataResolver, ResolveError, EXT_PLACEHOLDER};
use crate::services::sanitize::{derive_output_names, upload_stem, OutputNames};
use crate::services::transcoder::{MediaTranscoder, TranscodeError};
use crate::services::workspace::JobWorkspace;

/// Media attached to a submission.
#[derive(Debug, Clone)]
pub enum SubmittedMedia {
    /// An upload already streamed to `staged`; the run moves it into its workspace.
    Upload { filename: String, staged: PathBuf },
    Url(Url),
}

impl SubmittedMedia {
    pub fn source(&self) -> JobSource {
        match self {
            SubmittedMedia::Upload { .. } => JobSource::Upload,
            SubmittedMedia::Url(_) => JobSource::Url,
        }
    }
}

/// A registered job waiting for a worker.
#[derive(Debug, Clone)]
pub struct Submission {
    pub job_id: JobId,
    pub recipient_id: i64,
    pub media: SubmittedMedia,
}

/// Pipeline knobs taken from configuration.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub work_dir: PathBuf,
    pub cover_image: Option<PathBuf>,
    pub max_download_bytes: Option<u64>,
}

/// Drives jobs through conversion and delivery.
pub struct Orchestrator {
    registry: JobRegistry,
    transcoder: Arc<dyn MediaTranscoder>,
    resolver: Arc<dyn MetadataResolver>,
    delivery: Arc<dyn DeliveryClient>,
    settings: PipelineSettings,
}

impl Orchestrator {
    pub fn new(
        registry: JobRegistry,
        transcoder: Arc<dyn MediaTranscoder>,
        resolver: Arc<dyn MetadataResolver>,
        delivery: Arc<dyn DeliveryClient>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            registry,
            transcoder,
            resolver,
            delivery,
            settings,
        }
    }

    /// Run one job to a terminal status. Never returns an error: failures are
    /// recorded on the job.
    pub async fn run(&self, submission: Submission) {
        let job_id = submission.job_id;
        let span = tracing::info_span!(
            "job",
            job_id = %job_id,
            source = %submission.media.source(),
        );
        self.run_inner(submission).instrument(span).await;
        tracing::trace!(job_id = %job_id, "Run finished");
    }

    async fn run_inner(&self, submission: Submission) {
        let job_id = submission.job_id;
        let started = Instant::now();

        let outcome = match JobWorkspace::create(&self.settings.work_dir, job_id).await {
            Ok(mut workspace) => {
                let result = AssertUnwindSafe(self.execute(&submission, &mut workspace))
                    .catch_unwind()
                    .await;
                tracing::debug!(assets = workspace.assets().len(), "Cleaning up workspace");
                workspace.cleanup().await;
                match result {
                    Ok(outcome) => outcome,
                    Err(panic) => Err(PipelineError::Panicked(panic_message(panic.as_ref()))),
                }
            }
            Err(e) => Err(PipelineError::Workspace(e)),
        };
        discard_staged(&submission.media).await;

        metrics::histogram!("conversion_job_seconds").record(started.elapsed().as_secs_f64());

        match outcome {
            Ok(()) => {
                if let Err(e) = self.registry.set_status(job_id, JobStatus::Done).await {
                    tracing::error!(error = %e, "Failed to mark job done");
                }
                metrics::counter!("conversion_jobs_completed_total").increment(1);
                tracing::info!(
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Job completed"
                );
            }
            Err(e) => {
                tracing::error!(error = %e, "Job failed");
                if let Err(record_err) = self.registry.set_error(job_id, &e.to_string()).await {
                    tracing::error!(error = %record_err, "Failed to record job error");
                }
                metrics::counter!("conversion_jobs_failed_total").increment(1);
            }
        }
    }

    async fn advance(&self, job_id: JobId, status: JobStatus) -> Result<(), PipelineError> {
        self.registry.set_status(job_id, status).await?;
        tracing::info!(status = %status, "Stage started");
        Ok(())
    }

    async fn execute(
        &self,
        submission: &Submission,
        workspace: &mut JobWorkspace,
    ) -> Result<(), PipelineError> {
        let job_id = submission.job_id;

        // ── Acquire input ────────────────────────────────────────────────
        let (input, metadata) = match &submission.media {
            SubmittedMedia::Upload { filename, staged } => {
                let path = workspace.path_for(AssetRole::Input, &upload_extension(filename));
                tokio::fs::rename(staged, &path)
                    .await
                    .map_err(PipelineError::Workspace)?;
                let input = workspace.track(AssetRole::Input, path);
                let metadata = display_metadata(derive_output_names(&upload_stem(filename)), None);
                (input, metadata)
            }
            SubmittedMedia::Url(url) => {
                self.advance(job_id, JobStatus::Downloading).await?;
                let remote = self.resolver.resolve_metadata(url).await?;
                tracing::debug!(title = %remote.title, "Resolved remote metadata");

                let template = workspace.dir().join(format!("input.{EXT_PLACEHOLDER}"));
                let path = self
                    .resolver
                    .fetch_media(url, &template, self.settings.max_download_bytes)
                    .await?;
                let input = workspace.track(AssetRole::Input, path);
                self.advance(job_id, JobStatus::Downloaded).await?;

                let description = remote.description.filter(|d| !d.trim().is_empty());
                (input, display_metadata(derive_output_names(&remote.title), description))
            }
        };

        // ── Convert ──────────────────────────────────────────────────────
        self.advance(job_id, JobStatus::Converting).await?;
        let audio_path = workspace.path_for(AssetRole::AudioOutput, "mp3");
        let audio = self.transcoder.transcode_to_audio(&input, &audio_path).await?;
        let audio = workspace.track(AssetRole::AudioOutput, audio);

        // ── Cover art (optional) ─────────────────────────────────────────
        let (final_audio, cover) = match &self.settings.cover_image {
            Some(cover_source) => {
                self.advance(job_id, JobStatus::PreparingCover).await?;
                let raw = stage_cover(cover_source, workspace).await?;
                let normalized_path = workspace.path_for(AssetRole::CoverNormalized, "jpg");
                let normalized = self.transcoder.normalize_cover(&raw, &normalized_path).await?;
                let normalized = workspace.track(AssetRole::CoverNormalized, normalized);

                self.advance(job_id, JobStatus::EmbeddingCover).await?;
                let combined_path = workspace.path_for(AssetRole::AudioWithCover, "mp3");
                let combined = self
                    .transcoder
                    .embed_cover(&audio, &normalized, &combined_path)
                    .await?;
                let combined = workspace.track(AssetRole::AudioWithCover, combined);
                (combined, Some(normalized))
            }
            None => (audio, None),
        };

        // ── Deliver ──────────────────────────────────────────────────────
        self.advance(job_id, JobStatus::Sending).await?;
        let ack = self
            .delivery
            .deliver(DeliveryRequest {
                recipient_id: submission.recipient_id,
                audio_path: final_audio,
                metadata,
                cover_path: cover,
            })
            .await?;
        tracing::info!(message_id = ?ack.message_id, "Delivered");

        Ok(())
    }
}

fn display_metadata(names: OutputNames, description: Option<String>) -> DisplayMetadata {
    DisplayMetadata {
        display_title: names.display_title,
        output_filename: names.output_filename,
        description,
    }
}

/// Extension for the stored upload; ffmpeg sniffs content, so this is cosmetic.
fn upload_extension(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.len() <= 8 && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_else(|| "bin".to_string())
}

/// Copy the configured cover image into the workspace after checking it is an image.
async fn stage_cover(source: &Path, workspace: &mut JobWorkspace) -> Result<PathBuf, PipelineError> {
    let bytes = tokio::fs::read(source)
        .await
        .map_err(|_| TranscodeError::InvalidCover(source.to_path_buf()))?;
    let format = image::guess_format(&bytes)
        .map_err(|_| TranscodeError::InvalidCover(source.to_path_buf()))?;
    let extension = format.extensions_str().first().copied().unwrap_or("img");

    let path = workspace.path_for(AssetRole::CoverRaw, extension);
    tokio::fs::write(&path, &bytes)
        .await
        .map_err(PipelineError::Workspace)?;
    Ok(workspace.track(AssetRole::CoverRaw, path))
}

/// Remove a staged upload that never made it into the workspace.
async fn discard_staged(media: &SubmittedMedia) {
    if let SubmittedMedia::Upload { staged, .. } = media {
        if let Err(e) = tokio::fs::remove_file(staged).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %staged.display(), error = %e, "Failed to remove staged upload");
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Stage-time failure. Recorded on the job, never returned to the submitter.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("workspace error: {0}")]
    Workspace(std::io::Error),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Transcode(#[from] TranscodeError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("pipeline panicked: {0}")]
    Panicked(String),
}
