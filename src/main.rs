use std::sync::Arc;

use axum::routing::get;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::EnvFilter;

use mconverter::app_state::{Adapters, AppState};
use mconverter::config::AppConfig;
use mconverter::routes;
use mconverter::services::registry::JobRegistry;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing mconverter server");

    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    metrics::describe_counter!(
        "conversion_jobs_submitted_total",
        "Total conversion jobs accepted"
    );
    metrics::describe_counter!(
        "conversion_jobs_completed_total",
        "Total conversion jobs delivered"
    );
    metrics::describe_counter!(
        "conversion_jobs_failed_total",
        "Total conversion jobs that ended in error"
    );
    metrics::describe_counter!(
        "conversion_jobs_rejected_total",
        "Submissions rejected because the worker pool was saturated"
    );
    metrics::describe_histogram!(
        "conversion_job_seconds",
        "Time from worker pickup to terminal status"
    );
    metrics::describe_gauge!(
        "conversion_queue_depth",
        "Jobs waiting for a worker"
    );

    tokio::fs::create_dir_all(&config.work_dir)
        .await
        .expect("Failed to create work directory");
    tracing::info!(work_dir = %config.work_dir.display(), "Work directory ready");

    if config.cover_image_path.is_none() {
        tracing::info!("No cover image configured; cover stages disabled");
    }

    let adapters = Adapters::from_config(&config).expect("Failed to initialize adapters");
    let bind_addr = config.bind_addr.clone();
    let state = AppState::new(config, JobRegistry::in_memory(), adapters);

    let app = routes::create_router(state).route(
        "/metrics",
        get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
    );

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", bind_addr);

    axum::serve(listener, app).await.expect("Server error");
}
