use axum::extract::State;
use axum::http::StatusCode;
use axum::{Form, Json};
use garde::Validate;

use crate::app_state::AppState;
use crate::error::{ApiError, ApiResult};
use crate::models::submission::{InfoResponse, UrlSubmission};
use crate::services::auth::authenticate;

/// POST /api/v1/info: resolve remote metadata without creating a job.
pub async fn preview_url(
    State(state): State<AppState>,
    Form(request): Form<UrlSubmission>,
) -> ApiResult<Json<InfoResponse>> {
    request.validate()?;
    authenticate(&request.init_data, &state.config.bot_token)?;
    let url = state.url_guard.check(&request.url).await?;

    let metadata = state.resolver.resolve_metadata(&url).await.map_err(|e| {
        tracing::warn!(error = %e, url = %url, "Metadata preview failed");
        ApiError::new(StatusCode::BAD_GATEWAY, "could not resolve media info")
    })?;

    Ok(Json(InfoResponse {
        ok: true,
        title: metadata.title,
        id: metadata.id,
        uploader: metadata.uploader,
        duration: metadata.duration,
    }))
}
