use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::services::process::{run_tool, tail, tool_command, ToolError, DIAGNOSTIC_TAIL_CHARS};

/// Extension placeholder expanded by the downloader.
pub const EXT_PLACEHOLDER: &str = "%(ext)s";

/// Remote media metadata as reported by the downloader.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RemoteMetadata {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub uploader: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
}

/// Metadata lookup and media download for remote URLs.
#[async_trait]
pub trait MetadataResolver: Send + Sync {
    async fn resolve_metadata(&self, url: &Url) -> Result<RemoteMetadata, ResolveError>;

    /// Download the best available stream to `destination_template`, which must
    /// end in [`EXT_PLACEHOLDER`]. Returns the path of the produced file.
    async fn fetch_media(
        &self,
        url: &Url,
        destination_template: &Path,
        max_bytes: Option<u64>,
    ) -> Result<PathBuf, FetchError>;
}

/// [`MetadataResolver`] backed by yt-dlp.
pub struct YtDlpResolver {
    ytdlp: PathBuf,
    cookies: Option<PathBuf>,
    timeout: Duration,
}

impl YtDlpResolver {
    pub fn new(ytdlp: impl Into<PathBuf>, cookies: Option<PathBuf>, timeout: Duration) -> Self {
        Self {
            ytdlp: ytdlp.into(),
            cookies,
            timeout,
        }
    }

    fn common_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["--no-playlist".into(), "--no-warnings".into()];
        if let Some(cookies) = &self.cookies {
            args.push("--cookies".into());
            args.push(cookies.into());
        }
        args
    }

    pub fn metadata_args(&self, url: &Url) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["--dump-single-json".into(), "--skip-download".into()];
        args.extend(self.common_args());
        args.push("--".into());
        args.push(url.as_str().into());
        args
    }

    pub fn fetch_args(&self, url: &Url, template: &Path, max_bytes: Option<u64>) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-f".into(), "bestaudio/best".into()];
        args.extend(self.common_args());
        if let Some(max) = max_bytes {
            args.push("--max-filesize".into());
            args.push(max.to_string().into());
        }
        args.push("-o".into());
        args.push(template.into());
        args.push("--".into());
        args.push(url.as_str().into());
        args
    }
}

#[async_trait]
impl MetadataResolver for YtDlpResolver {
    async fn resolve_metadata(&self, url: &Url) -> Result<RemoteMetadata, ResolveError> {
        let command = tool_command(&self.ytdlp, self.metadata_args(url));
        let output = run_tool(command, self.timeout).await?;
        parse_metadata(&output.stdout)
    }

    async fn fetch_media(
        &self,
        url: &Url,
        destination_template: &Path,
        max_bytes: Option<u64>,
    ) -> Result<PathBuf, FetchError> {
        let command = tool_command(&self.ytdlp, self.fetch_args(url, destination_template, max_bytes));
        let output = run_tool(command, self.timeout).await?;

        match locate_download(destination_template).await? {
            Some(path) => Ok(path),
            None => Err(FetchError::NotFound {
                template: destination_template.to_path_buf(),
                diagnostics: tail(
                    &format!("{}{}", output.stdout, output.stderr),
                    DIAGNOSTIC_TAIL_CHARS,
                ),
            }),
        }
    }
}

/// Parse the downloader's JSON document.
pub fn parse_metadata(stdout: &str) -> Result<RemoteMetadata, ResolveError> {
    serde_json::from_str(stdout.trim()).map_err(ResolveError::Parse)
}

/// Find the file the downloader produced for `template` ("dir/input.%(ext)s").
///
/// Partial downloads (`.part`, `.ytdl`, `.temp`) are ignored.
pub async fn locate_download(template: &Path) -> Result<Option<PathBuf>, FetchError> {
    let dir = template.parent().ok_or(FetchError::BadTemplate)?;
    let name = template
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or(FetchError::BadTemplate)?;
    let prefix = name
        .strip_suffix(EXT_PLACEHOLDER)
        .ok_or(FetchError::BadTemplate)?;

    let mut entries = tokio::fs::read_dir(dir).await.map_err(FetchError::Io)?;
    while let Some(entry) = entries.next_entry().await.map_err(FetchError::Io)? {
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        let Some(ext) = file_name.strip_prefix(prefix) else {
            continue;
        };
        if ext.is_empty() || [".part", ".ytdl", ".temp"].iter().any(|s| ext.ends_with(s)) {
            continue;
        }
        if entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
            return Ok(Some(entry.path()));
        }
    }
    Ok(None)
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("yt-dlp metadata lookup failed: {0}")]
    Tool(#[from] ToolError),

    #[error("yt-dlp returned unparseable metadata: {0}")]
    Parse(serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("yt-dlp download failed: {0}")]
    Tool(#[from] ToolError),

    #[error("yt-dlp produced no file for {template}: {diagnostics}")]
    NotFound { template: PathBuf, diagnostics: String },

    #[error("download template must be a file path ending in %(ext)s")]
    BadTemplate,

    #[error("failed to inspect download directory: {0}")]
    Io(std::io::Error),
}
