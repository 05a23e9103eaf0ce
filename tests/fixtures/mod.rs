//! Upload fixtures with the names the delivered track is expected to carry.
#![allow(dead_code)]

#[derive(Debug, Clone)]
pub struct UploadFixture {
    pub filename: &'static str,
    pub expected_title: &'static str,
    /// Prefix of the delivered file name, before the random suffix.
    pub expected_file_prefix: &'static str,
    pub description: &'static str,
}

pub const UPLOAD_FIXTURES: &[UploadFixture] = &[
    UploadFixture {
        filename: "holiday_at the-sea.mp4",
        expected_title: "holiday at the sea",
        expected_file_prefix: "holiday at the sea_",
        description: "separators become spaces",
    },
    UploadFixture {
        filename: "VID20240101123456789012345.mp4",
        expected_title: "Converted audio",
        expected_file_prefix: "audio_",
        description: "camera-style opaque name",
    },
    UploadFixture {
        filename: "###.mov",
        expected_title: ".mov",
        expected_file_prefix: ".mov_",
        description: "only the extension survives sanitizing",
    },
];

/// Smallest byte prefix `image::guess_format` recognizes as PNG.
pub const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

pub const FAKE_VIDEO: &[u8] = b"\0\0\0\x18ftypmp42 not really a video";
