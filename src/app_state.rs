use std::sync::Arc;

use crate::config::AppConfig;
use crate::services::{
    delivery::{DeliveryClient, DeliveryError, TelegramDelivery},
    dispatcher::JobDispatcher,
    orchestrator::{Orchestrator, PipelineSettings},
    registry::JobRegistry,
    resolver::{MetadataResolver, YtDlpResolver},
    transcoder::{FfmpegTranscoder, MediaTranscoder},
    url_guard::UrlGuard,
};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub registry: JobRegistry,
    pub dispatcher: Arc<JobDispatcher>,
    pub url_guard: Arc<UrlGuard>,
    pub resolver: Arc<dyn MetadataResolver>,
}

/// External collaborators the pipeline talks to.
pub struct Adapters {
    pub transcoder: Arc<dyn MediaTranscoder>,
    pub resolver: Arc<dyn MetadataResolver>,
    pub delivery: Arc<dyn DeliveryClient>,
    pub url_guard: UrlGuard,
}

impl Adapters {
    /// ffmpeg, yt-dlp, the Telegram Bot API and system DNS.
    pub fn from_config(config: &AppConfig) -> Result<Self, DeliveryError> {
        let delivery = TelegramDelivery::new(
            config.telegram_api_base.clone(),
            config.bot_token.clone(),
            config.performer.clone(),
            config.caption_footer.clone(),
            config.delivery_timeout(),
        )?;

        Ok(Self {
            transcoder: Arc::new(FfmpegTranscoder::new(
                config.ffmpeg_path.clone(),
                config.tool_timeout(),
            )),
            resolver: Arc::new(YtDlpResolver::new(
                config.ytdlp_path.clone(),
                config.ytdlp_cookies_path.clone(),
                config.tool_timeout(),
            )),
            delivery: Arc::new(delivery),
            url_guard: UrlGuard::system(),
        })
    }
}

impl AppState {
    /// Wire the registry, orchestrator and worker pool. Must be called inside a
    /// Tokio runtime because it spawns the workers.
    pub fn new(config: AppConfig, registry: JobRegistry, adapters: Adapters) -> Self {
        let settings = PipelineSettings {
            work_dir: config.work_dir.clone(),
            cover_image: config.cover_image_path.clone(),
            max_download_bytes: config.max_download_bytes,
        };
        let orchestrator = Arc::new(Orchestrator::new(
            registry.clone(),
            adapters.transcoder,
            adapters.resolver.clone(),
            adapters.delivery,
            settings,
        ));
        let dispatcher =
            JobDispatcher::start(orchestrator, config.worker_count, config.queue_capacity);

        Self {
            config: Arc::new(config),
            registry,
            dispatcher: Arc::new(dispatcher),
            url_guard: Arc::new(adapters.url_guard),
            resolver: adapters.resolver,
        }
    }
}
