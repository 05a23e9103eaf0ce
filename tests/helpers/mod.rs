//! Test doubles and request builders shared by the API and pipeline tests.
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::sync::Semaphore;
use tower::ServiceExt;
use url::Url;

use mconverter::app_state::{Adapters, AppState};
use mconverter::config::AppConfig;
use mconverter::models::job::{Job, JobId};
use mconverter::routes::create_router;
use mconverter::services::auth::{compute_signature, data_check_string};
use mconverter::services::delivery::{DeliveryAck, DeliveryClient, DeliveryError, DeliveryRequest};
use mconverter::services::process::ToolError;
use mconverter::services::registry::JobRegistry;
use mconverter::services::resolver::{
    FetchError, MetadataResolver, RemoteMetadata, ResolveError, EXT_PLACEHOLDER,
};
use mconverter::services::transcoder::{MediaTranscoder, TranscodeError};
use mconverter::services::url_guard::{HostResolver, UrlGuard};

pub const BOT_TOKEN: &str = "123456789:AAtest-token";
pub const USER_ID: i64 = 777_000_111;
pub const PUBLIC_HOST: &str = "media.example.com";
pub const INTERNAL_HOST: &str = "intranet.example.com";

// ── Init data ───────────────────────────────────────────────────────────

/// Init data signed with [`BOT_TOKEN`] for `user_id`.
pub fn signed_init_data(user_id: i64) -> String {
    let mut fields = BTreeMap::new();
    fields.insert("auth_date".to_string(), "1700000000".to_string());
    fields.insert("query_id".to_string(), "AAHdF6IQAAAAAN0XohDhrOrc".to_string());
    fields.insert(
        "user".to_string(),
        format!(r#"{{"id":{user_id},"first_name":"Test","username":"tester"}}"#),
    );
    sign_fields(fields, BOT_TOKEN)
}

/// Init data signed with the wrong token.
pub fn forged_init_data() -> String {
    let mut fields = BTreeMap::new();
    fields.insert("auth_date".to_string(), "1700000000".to_string());
    fields.insert("user".to_string(), format!(r#"{{"id":{USER_ID}}}"#));
    sign_fields(fields, "999:not-the-bot")
}

pub fn sign_fields(fields: BTreeMap<String, String>, secret: &str) -> String {
    let hash = compute_signature(secret, &data_check_string(&fields)).unwrap();
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in &fields {
        serializer.append_pair(key, value);
    }
    serializer.append_pair("hash", &hash);
    serializer.finish()
}

// ── Transcoder ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscoderMode {
    Succeed,
    FailTranscode,
    FailCover,
    Panic,
}

/// Writes placeholder files instead of running ffmpeg.
pub struct MockTranscoder {
    mode: TranscoderMode,
    gate: Option<Arc<Semaphore>>,
    pub transcode_calls: AtomicUsize,
    pub cover_calls: AtomicUsize,
    pub embed_calls: AtomicUsize,
}

impl MockTranscoder {
    pub fn new(mode: TranscoderMode) -> Self {
        Self {
            mode,
            gate: None,
            transcode_calls: AtomicUsize::new(0),
            cover_calls: AtomicUsize::new(0),
            embed_calls: AtomicUsize::new(0),
        }
    }

    /// Transcoding waits until the returned gate is opened with [`open_gate`].
    pub fn gated(mode: TranscoderMode) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let mut transcoder = Self::new(mode);
        transcoder.gate = Some(gate.clone());
        (transcoder, gate)
    }

    pub fn total_calls(&self) -> usize {
        self.transcode_calls.load(Ordering::SeqCst)
            + self.cover_calls.load(Ordering::SeqCst)
            + self.embed_calls.load(Ordering::SeqCst)
    }
}

pub fn open_gate(gate: &Semaphore) {
    gate.add_permits(Semaphore::MAX_PERMITS / 2);
}

fn ffmpeg_failure(diagnostics: &str) -> TranscodeError {
    TranscodeError::Tool(ToolError::Failed {
        program: "ffmpeg".to_string(),
        code: Some(1),
        diagnostics: diagnostics.to_string(),
    })
}

#[async_trait]
impl MediaTranscoder for MockTranscoder {
    async fn transcode_to_audio(&self, input: &Path, output: &Path) -> Result<PathBuf, TranscodeError> {
        self.transcode_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await.unwrap();
        }
        assert!(input.exists(), "transcoder input missing: {}", input.display());
        match self.mode {
            TranscoderMode::FailTranscode => Err(ffmpeg_failure("Invalid data found when processing input")),
            TranscoderMode::Panic => panic!("transcoder exploded"),
            _ => {
                tokio::fs::write(output, b"ID3 fake mp3").await.unwrap();
                Ok(output.to_path_buf())
            }
        }
    }

    async fn normalize_cover(&self, source: &Path, output: &Path) -> Result<PathBuf, TranscodeError> {
        self.cover_calls.fetch_add(1, Ordering::SeqCst);
        assert!(source.exists(), "cover source missing: {}", source.display());
        if self.mode == TranscoderMode::FailCover {
            return Err(ffmpeg_failure("could not decode cover"));
        }
        tokio::fs::write(output, b"\xFF\xD8\xFF fake jpeg").await.unwrap();
        Ok(output.to_path_buf())
    }

    async fn embed_cover(
        &self,
        audio: &Path,
        cover: &Path,
        output: &Path,
    ) -> Result<PathBuf, TranscodeError> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        assert!(audio.exists() && cover.exists());
        tokio::fs::write(output, b"ID3 fake mp3 with cover").await.unwrap();
        Ok(output.to_path_buf())
    }
}

// ── Resolver ────────────────────────────────────────────────────────────

/// Serves canned metadata and writes a fake download.
pub struct MockResolver {
    pub metadata: RemoteMetadata,
    pub fail_fetch: bool,
    pub resolve_calls: AtomicUsize,
    pub fetch_calls: AtomicUsize,
}

impl MockResolver {
    pub fn new(title: &str) -> Self {
        Self {
            metadata: RemoteMetadata {
                title: title.to_string(),
                description: Some("A  long\n\ndescription".to_string()),
                id: Some("abc123".to_string()),
                uploader: Some("Uploader".to_string()),
                duration: Some(42.0),
            },
            fail_fetch: false,
            resolve_calls: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl MetadataResolver for MockResolver {
    async fn resolve_metadata(&self, _url: &Url) -> Result<RemoteMetadata, ResolveError> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.metadata.clone())
    }

    async fn fetch_media(
        &self,
        _url: &Url,
        destination_template: &Path,
        _max_bytes: Option<u64>,
    ) -> Result<PathBuf, FetchError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetch {
            return Err(FetchError::NotFound {
                template: destination_template.to_path_buf(),
                diagnostics: "ERROR: Unsupported URL".to_string(),
            });
        }
        let template = destination_template.to_string_lossy();
        let path = PathBuf::from(template.replace(EXT_PLACEHOLDER, "webm"));
        tokio::fs::write(&path, b"fake webm").await.unwrap();
        Ok(path)
    }
}

// ── Delivery ────────────────────────────────────────────────────────────

/// A delivery as seen by the push API.
#[derive(Debug, Clone)]
pub struct DeliveredTrack {
    pub recipient_id: i64,
    pub title: String,
    pub filename: String,
    pub description: Option<String>,
    pub audio: Vec<u8>,
    pub had_cover: bool,
}

#[derive(Default)]
pub struct RecordingDelivery {
    pub fail: bool,
    deliveries: Mutex<Vec<DeliveredTrack>>,
}

impl RecordingDelivery {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn deliveries(&self) -> Vec<DeliveredTrack> {
        self.deliveries.lock().clone()
    }
}

#[async_trait]
impl DeliveryClient for RecordingDelivery {
    async fn deliver(&self, request: DeliveryRequest) -> Result<DeliveryAck, DeliveryError> {
        if self.fail {
            return Err(DeliveryError::Rejected(
                r#"{"ok":false,"error_code":400,"description":"Bad Request: chat not found"}"#.to_string(),
            ));
        }
        let audio = tokio::fs::read(&request.audio_path).await.unwrap();
        let had_cover = request.cover_path.as_ref().is_some_and(|p| p.exists());
        self.deliveries.lock().push(DeliveredTrack {
            recipient_id: request.recipient_id,
            title: request.metadata.display_title,
            filename: request.metadata.output_filename,
            description: request.metadata.description,
            audio,
            had_cover,
        });
        Ok(DeliveryAck {
            message_id: Some(1),
            payload: serde_json::json!({"ok": true, "result": {"message_id": 1}}),
        })
    }
}

// ── DNS ─────────────────────────────────────────────────────────────────

/// Fixed host table: [`PUBLIC_HOST`] is public, [`INTERNAL_HOST`] is private.
pub struct StaticHosts(HashMap<String, Vec<IpAddr>>);

impl StaticHosts {
    pub fn standard() -> Self {
        let mut table = HashMap::new();
        table.insert(PUBLIC_HOST.to_string(), vec!["93.184.216.34".parse().unwrap()]);
        table.insert(INTERNAL_HOST.to_string(), vec!["10.1.2.3".parse().unwrap()]);
        Self(table)
    }
}

#[async_trait]
impl HostResolver for StaticHosts {
    async fn resolve(&self, host: &str, _port: u16) -> std::io::Result<Vec<IpAddr>> {
        self.0
            .get(host)
            .cloned()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "no such host"))
    }
}

// ── Application ─────────────────────────────────────────────────────────

pub struct TestApp {
    pub state: AppState,
    pub router: Router,
    pub work_dir: TempDir,
    pub transcoder: Arc<MockTranscoder>,
    pub resolver: Arc<MockResolver>,
    pub delivery: Arc<RecordingDelivery>,
}

pub struct TestAppBuilder {
    workers: usize,
    capacity: usize,
    cover: Option<PathBuf>,
    tools: Option<(PathBuf, PathBuf)>,
    transcoder: MockTranscoder,
    resolver: MockResolver,
    delivery: RecordingDelivery,
}

impl TestApp {
    pub fn builder() -> TestAppBuilder {
        TestAppBuilder {
            workers: 4,
            capacity: 64,
            cover: None,
            tools: None,
            transcoder: MockTranscoder::new(TranscoderMode::Succeed),
            resolver: MockResolver::new("Remote Song"),
            delivery: RecordingDelivery::default(),
        }
    }

    /// Number of entries left under the work directory.
    pub fn leftover_entries(&self) -> usize {
        std::fs::read_dir(self.work_dir.path()).unwrap().count()
    }

    /// Poll until the job is terminal.
    pub async fn wait_for_terminal(&self, job_id: JobId) -> Job {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            let job = self.state.registry.get(job_id).await.unwrap();
            if job.status.is_terminal() {
                return job;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "job {job_id} stuck in {}",
                job.status
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }
}

impl TestAppBuilder {
    pub fn workers(mut self, workers: usize, capacity: usize) -> Self {
        self.workers = workers;
        self.capacity = capacity;
        self
    }

    pub fn cover(mut self, path: PathBuf) -> Self {
        self.cover = Some(path);
        self
    }

    /// ffmpeg and yt-dlp paths checked by the health endpoint.
    pub fn tools(mut self, ffmpeg: impl Into<PathBuf>, ytdlp: impl Into<PathBuf>) -> Self {
        self.tools = Some((ffmpeg.into(), ytdlp.into()));
        self
    }

    pub fn transcoder(mut self, transcoder: MockTranscoder) -> Self {
        self.transcoder = transcoder;
        self
    }

    pub fn resolver(mut self, resolver: MockResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn delivery(mut self, delivery: RecordingDelivery) -> Self {
        self.delivery = delivery;
        self
    }

    /// Must run inside a Tokio runtime.
    pub fn build(self) -> TestApp {
        let work_dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::with_token(BOT_TOKEN);
        config.work_dir = work_dir.path().to_path_buf();
        config.worker_count = self.workers;
        config.queue_capacity = self.capacity;
        config.cover_image_path = self.cover;
        if let Some((ffmpeg, ytdlp)) = self.tools {
            config.ffmpeg_path = ffmpeg;
            config.ytdlp_path = ytdlp;
        }

        let transcoder = Arc::new(self.transcoder);
        let resolver = Arc::new(self.resolver);
        let delivery = Arc::new(self.delivery);
        let adapters = Adapters {
            transcoder: transcoder.clone(),
            resolver: resolver.clone(),
            delivery: delivery.clone(),
            url_guard: UrlGuard::new(Arc::new(StaticHosts::standard())),
        };

        let state = AppState::new(config, JobRegistry::in_memory(), adapters);
        let router = create_router(state.clone());

        TestApp {
            state,
            router,
            work_dir,
            transcoder,
            resolver,
            delivery,
        }
    }
}

// ── Requests ────────────────────────────────────────────────────────────

const BOUNDARY: &str = "----mconverter-test-boundary";

/// Multipart upload with `init_data` before `file`. Pass `None` to omit a field.
pub fn upload_request(file: Option<(&str, &[u8])>, init_data: Option<&str>) -> Request<Body> {
    let mut body = Vec::new();
    if let Some(init_data) = init_data {
        push_text_part(&mut body, "init_data", init_data);
    }
    if let Some((filename, bytes)) = file {
        push_file_part(&mut body, filename, bytes);
    }
    multipart_request(body)
}

/// Multipart upload with the `file` part sent first.
pub fn upload_request_file_first(file: (&str, &[u8]), init_data: &str) -> Request<Body> {
    let mut body = Vec::new();
    push_file_part(&mut body, file.0, file.1);
    push_text_part(&mut body, "init_data", init_data);
    multipart_request(body)
}

fn push_text_part(body: &mut Vec<u8>, name: &str, value: &str) {
    body.extend_from_slice(
        format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
            .as_bytes(),
    );
}

fn push_file_part(body: &mut Vec<u8>, filename: &str, bytes: &[u8]) {
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(b"\r\n");
}

fn multipart_request(mut body: Vec<u8>) -> Request<Body> {
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    Request::builder()
        .method("POST")
        .uri("/api/v1/jobs/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

/// Form POST with `url` and `init_data` to `path`.
pub fn url_form_request(path: &str, url: &str, init_data: &str) -> Request<Body> {
    let body = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("url", url)
        .append_pair("init_data", init_data)
        .finish();
    Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body))
        .unwrap()
}

pub fn status_request(job_id: &str) -> Request<Body> {
    Request::builder()
        .uri(format!("/api/v1/jobs/{job_id}"))
        .body(Body::empty())
        .unwrap()
}

pub fn job_id_of(body: &serde_json::Value) -> JobId {
    body["job_id"].as_str().unwrap().parse().unwrap()
}
