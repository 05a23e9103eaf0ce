use std::path::PathBuf;

use serde::Serialize;
use strum::{Display, IntoStaticStr};

/// Role a file plays within one job's workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum AssetRole {
    Input,
    AudioOutput,
    CoverRaw,
    CoverNormalized,
    AudioWithCover,
}

/// A filesystem-resident media blob owned by a single orchestrator run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaAsset {
    pub role: AssetRole,
    pub path: PathBuf,
}

impl MediaAsset {
    pub fn new(role: AssetRole, path: impl Into<PathBuf>) -> Self {
        Self {
            role,
            path: path.into(),
        }
    }
}

/// Names and text shown to the recipient alongside the delivered track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayMetadata {
    pub display_title: String,
    pub output_filename: String,
    pub description: Option<String>,
}
