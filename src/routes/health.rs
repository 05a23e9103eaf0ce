use std::path::Path;
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::app_state::AppState;
use crate::services::process::{run_tool, tool_command};

const CHECK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub checks: HealthChecks,
    pub workers: usize,
    pub queue_depth: usize,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub ffmpeg: ComponentHealth,
    pub ytdlp: ComponentHealth,
}

#[derive(Serialize)]
pub struct ComponentHealth {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub latency_ms: Option<u64>,
}

impl ComponentHealth {
    fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// GET /health: external tool availability and worker pool state.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let (ffmpeg, ytdlp) = tokio::join!(
        check_tool(&state.config.ffmpeg_path, "-version"),
        check_tool(&state.config.ytdlp_path, "--version"),
    );

    let all_healthy = ffmpeg.is_ok() && ytdlp.is_ok();
    let status_code = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if all_healthy {
            "ok".to_string()
        } else {
            "degraded".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: HealthChecks { ffmpeg, ytdlp },
        workers: state.dispatcher.worker_count(),
        queue_depth: state.dispatcher.queue_depth(),
    };

    (status_code, Json(response))
}

async fn check_tool(program: &Path, version_flag: &str) -> ComponentHealth {
    let start = Instant::now();
    match run_tool(tool_command(program, [version_flag]), CHECK_TIMEOUT).await {
        Ok(output) => ComponentHealth {
            status: "ok".to_string(),
            version: output.stdout.lines().next().map(|l| l.trim().to_string()),
            latency_ms: Some(start.elapsed().as_millis() as u64),
        },
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed");
            ComponentHealth {
                status: "error".to_string(),
                version: None,
                latency_ms: None,
            }
        }
    }
}
