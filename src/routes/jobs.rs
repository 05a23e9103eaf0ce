use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::{Form, Json};
use garde::Validate;

use crate::app_state::AppState;
use crate::error::{ApiError, ApiResult};
use crate::models::job::{JobId, JobSource, JobStatus};
use crate::models::submission::{JobStatusResponse, SubmitResponse, UrlSubmission};
use crate::services::auth::{authenticate, AuthenticatedPrincipal};
use crate::services::dispatcher::DispatchSlot;
use crate::services::orchestrator::{Submission, SubmittedMedia};
use crate::services::sanitize::FALLBACK_FILENAME;
use crate::services::workspace::StagedUpload;

/// POST /api/v1/jobs/upload: multipart `init_data` followed by `file`.
///
/// The signature is checked as soon as `init_data` arrives; a `file` part
/// before it is rejected unread. The file is streamed to disk, never buffered.
pub async fn submit_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    let mut principal: Option<AuthenticatedPrincipal> = None;
    let mut upload: Option<(String, StagedUpload)> = None;

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("init_data") => {
                let init_data = field.text().await.map_err(multipart_error)?;
                principal = Some(authenticate(&init_data, &state.config.bot_token)?);
            }
            Some("file") => {
                if principal.is_none() {
                    return Err(ApiError::validation("init_data must precede file"));
                }
                let filename = field.file_name().unwrap_or(FALLBACK_FILENAME).to_string();
                let mut staged = StagedUpload::create(&state.config.work_dir)
                    .await
                    .map_err(staging_error)?;
                while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
                    staged.write(&chunk).await.map_err(staging_error)?;
                }
                staged.finish().await.map_err(staging_error)?;
                upload = Some((filename, staged));
            }
            _ => {}
        }
    }

    let principal = principal.ok_or_else(|| ApiError::validation("init_data is required"))?;
    let (filename, staged) = upload.ok_or_else(|| ApiError::validation("file is required"))?;
    if staged.is_empty() {
        return Err(ApiError::validation("file is empty"));
    }

    let (slot, job_id) = admit(&state, JobSource::Upload).await?;
    tracing::debug!(job_id = %job_id, bytes = staged.len(), "Upload staged");
    let media = SubmittedMedia::Upload {
        filename,
        staged: staged.persist(),
    };
    Ok(dispatch(slot, job_id, principal.recipient_id, media))
}

/// POST /api/v1/jobs/url: form `url` + `init_data`.
pub async fn submit_url(
    State(state): State<AppState>,
    Form(request): Form<UrlSubmission>,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    request.validate()?;
    let principal = authenticate(&request.init_data, &state.config.bot_token)?;
    let url = state.url_guard.check(&request.url).await?;

    let (slot, job_id) = admit(&state, JobSource::Url).await?;
    Ok(dispatch(slot, job_id, principal.recipient_id, SubmittedMedia::Url(url)))
}

/// GET /api/v1/jobs/{job_id}: current status of a job.
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobStatusResponse>> {
    let job_id: JobId = job_id
        .parse()
        .map_err(|_| ApiError::not_found("job not found"))?;
    let job = state.registry.get(job_id).await?;
    Ok(Json(job.into()))
}

/// Reserve a worker slot, then register the job. A rejected request leaves no job.
async fn admit(state: &AppState, source: JobSource) -> ApiResult<(DispatchSlot, JobId)> {
    let slot = state.dispatcher.try_reserve()?;
    let job_id = state.registry.create(source).await?;
    Ok((slot, job_id))
}

fn dispatch(
    slot: DispatchSlot,
    job_id: JobId,
    recipient_id: i64,
    media: SubmittedMedia,
) -> (StatusCode, Json<SubmitResponse>) {
    let source = media.source();
    slot.dispatch(Submission {
        job_id,
        recipient_id,
        media,
    });

    tracing::info!(job_id = %job_id, source = %source, recipient_id, "Job accepted");

    (
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            ok: true,
            job_id,
            status: JobStatus::Queued,
        }),
    )
}

fn multipart_error(e: MultipartError) -> ApiError {
    ApiError::new(e.status(), e.body_text())
}

fn staging_error(e: std::io::Error) -> ApiError {
    tracing::error!(error = %e, "Failed to stage upload");
    ApiError::internal("could not store upload")
}
