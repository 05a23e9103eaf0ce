use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use crate::services::process::{run_tool, tail, tool_command, ToolError, DIAGNOSTIC_TAIL_CHARS};

/// Edge length of the square cover canvas, in pixels.
pub const COVER_SIZE: u32 = 320;

/// Audio/cover operations backed by an external transcoder.
#[async_trait]
pub trait MediaTranscoder: Send + Sync {
    /// Drop any video and encode the audio track to MP3 at `output`.
    async fn transcode_to_audio(&self, input: &Path, output: &Path) -> Result<PathBuf, TranscodeError>;

    /// Fit `source` into a square baseline JPEG (single frame) at `output`.
    async fn normalize_cover(&self, source: &Path, output: &Path) -> Result<PathBuf, TranscodeError>;

    /// Mux `audio` with `cover` as an attached picture at `output`.
    async fn embed_cover(
        &self,
        audio: &Path,
        cover: &Path,
        output: &Path,
    ) -> Result<PathBuf, TranscodeError>;
}

/// [`MediaTranscoder`] that shells out to ffmpeg.
pub struct FfmpegTranscoder {
    ffmpeg: PathBuf,
    timeout: Duration,
}

impl FfmpegTranscoder {
    pub fn new(ffmpeg: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            timeout,
        }
    }

    async fn run(&self, args: Vec<OsString>, output: &Path) -> Result<PathBuf, TranscodeError> {
        let command = tool_command(&self.ffmpeg, args);
        let result = run_tool(command, self.timeout).await?;

        if !tokio::fs::try_exists(output).await.unwrap_or(false) {
            return Err(TranscodeError::MissingOutput {
                path: output.to_path_buf(),
                diagnostics: tail(&result.stderr, DIAGNOSTIC_TAIL_CHARS),
            });
        }
        Ok(output.to_path_buf())
    }
}

fn base_args() -> Vec<OsString> {
    ["-y", "-hide_banner", "-loglevel", "error"]
        .into_iter()
        .map(OsString::from)
        .collect()
}

fn cover_filter() -> String {
    format!(
        "scale={s}:{s}:force_original_aspect_ratio=decrease,pad={s}:{s}:(ow-iw)/2:(oh-ih)/2:color=black,format=yuvj420p",
        s = COVER_SIZE
    )
}

/// ffmpeg arguments for extracting audio to MP3 (VBR quality 2).
pub fn transcode_args(input: &Path, output: &Path) -> Vec<OsString> {
    let mut args = base_args();
    args.push("-i".into());
    args.push(input.into());
    for a in ["-vn", "-acodec", "libmp3lame", "-q:a", "2"] {
        args.push(a.into());
    }
    args.push(output.into());
    args
}

pub fn normalize_cover_args(source: &Path, output: &Path) -> Vec<OsString> {
    let mut args = base_args();
    args.push("-i".into());
    args.push(source.into());
    args.push("-vf".into());
    args.push(cover_filter().into());
    for a in ["-frames:v", "1", "-q:v", "2"] {
        args.push(a.into());
    }
    args.push(output.into());
    args
}

pub fn embed_cover_args(audio: &Path, cover: &Path, output: &Path) -> Vec<OsString> {
    let mut args = base_args();
    args.push("-i".into());
    args.push(audio.into());
    args.push("-i".into());
    args.push(cover.into());
    for a in [
        "-map",
        "0:a",
        "-map",
        "1:v",
        "-c:a",
        "copy",
        "-c:v",
        "mjpeg",
        "-disposition:v:0",
        "attached_pic",
        "-id3v2_version",
        "3",
        "-metadata:s:v",
        "title=Album cover",
        "-metadata:s:v",
        "comment=Cover (front)",
    ] {
        args.push(a.into());
    }
    args.push(output.into());
    args
}

#[async_trait]
impl MediaTranscoder for FfmpegTranscoder {
    async fn transcode_to_audio(&self, input: &Path, output: &Path) -> Result<PathBuf, TranscodeError> {
        self.run(transcode_args(input, output), output).await
    }

    async fn normalize_cover(&self, source: &Path, output: &Path) -> Result<PathBuf, TranscodeError> {
        self.run(normalize_cover_args(source, output), output).await
    }

    async fn embed_cover(
        &self,
        audio: &Path,
        cover: &Path,
        output: &Path,
    ) -> Result<PathBuf, TranscodeError> {
        self.run(embed_cover_args(audio, cover, output), output).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TranscodeError {
    #[error("ffmpeg failed: {0}")]
    Tool(#[from] ToolError),

    #[error("ffmpeg produced no output at {path}: {diagnostics}")]
    MissingOutput { path: PathBuf, diagnostics: String },

    #[error("cover source {0} is not a supported image")]
    InvalidCover(PathBuf),
}
