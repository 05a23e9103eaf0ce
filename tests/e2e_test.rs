//! End-to-end tests against real tools.
//!
//! These tests require:
//! 1. `ffmpeg` on PATH (or FFMPEG_PATH)
//! 2. For the server test, a running instance at API_BASE_URL
//!
//! Run with: cargo test --test e2e_test -- --ignored --nocapture

use std::path::{Path, PathBuf};
use std::time::Duration;

use mconverter::services::process::{run_tool, tool_command};
use mconverter::services::transcoder::{FfmpegTranscoder, MediaTranscoder};

fn ffmpeg_path() -> PathBuf {
    std::env::var("FFMPEG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("ffmpeg"))
}

fn get_base_url() -> String {
    std::env::var("API_BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string())
}

/// Ten seconds of black video with a silent stereo track.
async fn make_silent_video(dir: &Path) -> PathBuf {
    let output = dir.join("silent.mp4");
    let args = [
        "-y", "-hide_banner", "-loglevel", "error",
        "-f", "lavfi", "-i", "color=c=black:s=320x240:d=10",
        "-f", "lavfi", "-i", "anullsrc=r=44100:cl=stereo",
        "-t", "10", "-shortest",
        "-c:v", "libx264", "-c:a", "aac",
    ];
    let mut command = tool_command(&ffmpeg_path(), args);
    command.arg(&output);
    run_tool(command, Duration::from_secs(60))
        .await
        .expect("ffmpeg could not generate the test video");
    output
}

async fn make_cover(dir: &Path) -> PathBuf {
    let output = dir.join("cover_source.png");
    let args = [
        "-y", "-hide_banner", "-loglevel", "error",
        "-f", "lavfi", "-i", "color=c=red:s=640x360",
        "-frames:v", "1",
    ];
    let mut command = tool_command(&ffmpeg_path(), args);
    command.arg(&output);
    run_tool(command, Duration::from_secs(30))
        .await
        .expect("ffmpeg could not generate the test cover");
    output
}

#[tokio::test]
#[ignore] // Requires ffmpeg
async fn test_e2e_video_to_mp3_with_cover() {
    let dir = tempfile::tempdir().unwrap();
    let transcoder = FfmpegTranscoder::new(ffmpeg_path(), Duration::from_secs(120));

    let video = make_silent_video(dir.path()).await;
    let audio = transcoder
        .transcode_to_audio(&video, &dir.path().join("audio_output.mp3"))
        .await
        .expect("transcode failed");
    assert!(std::fs::metadata(&audio).unwrap().len() > 0);

    let source = make_cover(dir.path()).await;
    let cover = transcoder
        .normalize_cover(&source, &dir.path().join("cover_normalized.jpg"))
        .await
        .expect("cover normalization failed");
    let cover_bytes = std::fs::read(&cover).unwrap();
    assert_eq!(
        image::guess_format(&cover_bytes).unwrap(),
        image::ImageFormat::Jpeg
    );

    let combined = transcoder
        .embed_cover(&audio, &cover, &dir.path().join("audio_with_cover.mp3"))
        .await
        .expect("embedding failed");
    assert!(std::fs::metadata(&combined).unwrap().len() > std::fs::metadata(&audio).unwrap().len());

    println!("✓ Converted {} -> {}", video.display(), combined.display());
}

#[tokio::test]
#[ignore] // Requires ffmpeg
async fn test_e2e_corrupt_input_fails() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input.mp4");
    std::fs::write(&input, b"this is not a media file").unwrap();

    let transcoder = FfmpegTranscoder::new(ffmpeg_path(), Duration::from_secs(60));
    let result = transcoder
        .transcode_to_audio(&input, &dir.path().join("audio_output.mp3"))
        .await;
    assert!(result.is_err());
}

#[tokio::test]
#[ignore] // Requires a running server
async fn test_e2e_health_check() {
    let base_url = get_base_url();
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/health", base_url))
        .send()
        .await
        .expect("Health check failed");

    assert!(
        response.status().is_success(),
        "Health check returned non-success status: {}",
        response.status()
    );

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    println!("✓ Health check passed: {body}");
}
