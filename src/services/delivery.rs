use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;

use crate::models::media::DisplayMetadata;

/// Characters of description kept in a caption (Telegram allows 1024 in total).
pub const CAPTION_DESCRIPTION_MAX_CHARS: usize = 800;

/// Everything needed to push one finished track to a recipient.
#[derive(Debug, Clone)]
pub struct DeliveryRequest {
    pub recipient_id: i64,
    pub audio_path: PathBuf,
    pub metadata: DisplayMetadata,
    pub cover_path: Option<PathBuf>,
}

/// Acknowledgment from the push API.
#[derive(Debug, Clone)]
pub struct DeliveryAck {
    pub message_id: Option<i64>,
    pub payload: serde_json::Value,
}

/// Pushes finished audio to its recipient. Implementations never retry.
#[async_trait]
pub trait DeliveryClient: Send + Sync {
    async fn deliver(&self, request: DeliveryRequest) -> Result<DeliveryAck, DeliveryError>;
}

/// Delivery through the Telegram Bot API `sendAudio` method.
pub struct TelegramDelivery {
    http: Client,
    api_base: String,
    bot_token: String,
    performer: String,
    caption_footer: String,
}

#[derive(Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    result: Option<TelegramMessage>,
}

#[derive(Deserialize)]
struct TelegramMessage {
    message_id: i64,
}

impl TelegramDelivery {
    pub fn new(
        api_base: impl Into<String>,
        bot_token: impl Into<String>,
        performer: impl Into<String>,
        caption_footer: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, DeliveryError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(DeliveryError::Http)?;

        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            bot_token: bot_token.into(),
            performer: performer.into(),
            caption_footer: caption_footer.into(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/bot{}/sendAudio", self.api_base, self.bot_token)
    }

    async fn file_part(path: &Path, filename: String, mime: &str) -> Result<Part, DeliveryError> {
        let bytes = tokio::fs::read(path).await.map_err(|source| DeliveryError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Part::bytes(bytes)
            .file_name(filename)
            .mime_str(mime)
            .map_err(DeliveryError::transport)
    }
}

/// Caption: normalized, length-capped description followed by the fixed footer.
pub fn build_caption(description: Option<&str>, footer: &str) -> String {
    let description = description
        .map(|d| d.split_whitespace().collect::<Vec<_>>().join(" "))
        .unwrap_or_default();
    let description: String = description.chars().take(CAPTION_DESCRIPTION_MAX_CHARS).collect();
    let description = description.trim_end();

    if description.is_empty() {
        footer.to_string()
    } else {
        format!("{description}\n\n{footer}")
    }
}

#[async_trait]
impl DeliveryClient for TelegramDelivery {
    async fn deliver(&self, request: DeliveryRequest) -> Result<DeliveryAck, DeliveryError> {
        let metadata = &request.metadata;
        let audio = Self::file_part(
            &request.audio_path,
            metadata.output_filename.clone(),
            "audio/mpeg",
        )
        .await?;

        let mut form = Form::new()
            .text("chat_id", request.recipient_id.to_string())
            .text("title", metadata.display_title.clone())
            .text("performer", self.performer.clone())
            .text(
                "caption",
                build_caption(metadata.description.as_deref(), &self.caption_footer),
            )
            .part("audio", audio);

        if let Some(cover) = &request.cover_path {
            let thumbnail = Self::file_part(cover, "cover.jpg".to_string(), "image/jpeg").await?;
            form = form.part("thumbnail", thumbnail);
        }

        let response = self
            .http
            .post(self.endpoint())
            .multipart(form)
            .send()
            .await
            .map_err(DeliveryError::transport)?;

        let status = response.status();
        let body = response.text().await.map_err(DeliveryError::transport)?;
        let payload: serde_json::Value = serde_json::from_str(&body)
            .map_err(|_| DeliveryError::Rejected(format!("HTTP {status}: {body}")))?;
        let parsed: TelegramResponse = serde_json::from_value(payload.clone())
            .map_err(|_| DeliveryError::Rejected(payload.to_string()))?;

        if !parsed.ok {
            return Err(DeliveryError::Rejected(payload.to_string()));
        }

        Ok(DeliveryAck {
            message_id: parsed.result.map(|m| m.message_id),
            payload,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Telegram request failed: {0}")]
    Http(#[source] reqwest::Error),

    #[error("Telegram API error: {0}")]
    Rejected(String),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl DeliveryError {
    /// Wrap a request failure without its URL, which embeds the bot token.
    fn transport(err: reqwest::Error) -> Self {
        DeliveryError::Http(err.without_url())
    }
}
