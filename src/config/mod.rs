use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000").
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Telegram bot token. Used both for delivery and as the init-data HMAC secret.
    pub bot_token: String,

    /// Scratch directory; each job gets its own subdirectory.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,

    #[serde(default = "default_ytdlp_path")]
    pub ytdlp_path: PathBuf,

    /// Netscape cookies file forwarded to yt-dlp.
    #[serde(default)]
    pub ytdlp_cookies_path: Option<PathBuf>,

    /// Cover art embedded into every converted track. No cover stage when unset.
    #[serde(default)]
    pub cover_image_path: Option<PathBuf>,

    /// Upper bound for media fetched by URL.
    #[serde(default)]
    pub max_download_bytes: Option<u64>,

    /// Request body limit for uploads.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    #[serde(default = "default_telegram_api_base")]
    pub telegram_api_base: String,

    /// Performer tag attached to every delivered track.
    #[serde(default = "default_brand")]
    pub performer: String,

    /// Fixed line appended to every caption.
    #[serde(default = "default_brand")]
    pub caption_footer: String,

    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Jobs allowed to wait for a worker before submissions are rejected.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,

    #[serde(default = "default_delivery_timeout_secs")]
    pub delivery_timeout_secs: u64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_work_dir() -> PathBuf {
    std::env::temp_dir().join("mconverter")
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ytdlp_path() -> PathBuf {
    PathBuf::from("yt-dlp")
}

fn default_max_upload_bytes() -> usize {
    512 * 1024 * 1024
}

fn default_telegram_api_base() -> String {
    "https://api.telegram.org".to_string()
}

fn default_brand() -> String {
    "mconverter".to_string()
}

fn default_worker_count() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    32
}

fn default_tool_timeout_secs() -> u64 {
    600
}

fn default_delivery_timeout_secs() -> u64 {
    300
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config: Self = envy::from_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Configuration with defaults for everything but the bot token.
    pub fn with_token(bot_token: impl Into<String>) -> Self {
        Self {
            bind_addr: default_bind_addr(),
            bot_token: bot_token.into(),
            work_dir: default_work_dir(),
            ffmpeg_path: default_ffmpeg_path(),
            ytdlp_path: default_ytdlp_path(),
            ytdlp_cookies_path: None,
            cover_image_path: None,
            max_download_bytes: None,
            max_upload_bytes: default_max_upload_bytes(),
            telegram_api_base: default_telegram_api_base(),
            performer: default_brand(),
            caption_footer: default_brand(),
            worker_count: default_worker_count(),
            queue_capacity: default_queue_capacity(),
            tool_timeout_secs: default_tool_timeout_secs(),
            delivery_timeout_secs: default_delivery_timeout_secs(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bot_token.trim().is_empty() {
            return Err(ConfigError::Invalid("BOT_TOKEN must not be empty".to_string()));
        }
        if self.worker_count == 0 {
            return Err(ConfigError::Invalid("WORKER_COUNT must be at least 1".to_string()));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid("QUEUE_CAPACITY must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_secs(self.delivery_timeout_secs)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read configuration from environment: {0}")]
    Env(#[from] envy::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
