use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::models::job::JobId;
use crate::models::media::{AssetRole, MediaAsset};

/// Scratch directory holding every asset of one orchestrator run.
///
/// Dropping the workspace removes the assets and the directory, so nothing
/// outlives the run even if it unwinds.
#[derive(Debug)]
pub struct JobWorkspace {
    dir: PathBuf,
    assets: Vec<MediaAsset>,
    cleaned: bool,
}

impl JobWorkspace {
    /// Create `<root>/<job_id>/`.
    pub async fn create(root: &Path, job_id: JobId) -> std::io::Result<Self> {
        let dir = root.join(job_id.to_string());
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            assets: Vec::new(),
            cleaned: false,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path an asset with `role` should be written to.
    pub fn path_for(&self, role: AssetRole, extension: &str) -> PathBuf {
        let stem: &'static str = role.into();
        self.dir.join(format!("{stem}.{extension}"))
    }

    /// Record a file created for this run and return its path.
    pub fn track(&mut self, role: AssetRole, path: PathBuf) -> PathBuf {
        self.assets.push(MediaAsset::new(role, path.clone()));
        path
    }

    pub fn assets(&self) -> &[MediaAsset] {
        &self.assets
    }

    /// Remove all assets and the directory. Failures are logged and ignored.
    pub async fn cleanup(&mut self) {
        if self.cleaned {
            return;
        }
        self.cleaned = true;

        for asset in self.assets.drain(..) {
            if let Err(e) = tokio::fs::remove_file(&asset.path).await {
                log_removal_failure(&asset.path, e);
            }
        }
        if let Err(e) = tokio::fs::remove_dir_all(&self.dir).await {
            log_removal_failure(&self.dir, e);
        }
    }
}

impl Drop for JobWorkspace {
    fn drop(&mut self) {
        if self.cleaned {
            return;
        }
        for asset in self.assets.drain(..) {
            if let Err(e) = std::fs::remove_file(&asset.path) {
                log_removal_failure(&asset.path, e);
            }
        }
        if let Err(e) = std::fs::remove_dir_all(&self.dir) {
            log_removal_failure(&self.dir, e);
        }
    }
}

fn log_removal_failure(path: &Path, e: std::io::Error) {
    if e.kind() != std::io::ErrorKind::NotFound {
        tracing::warn!(path = %path.display(), error = %e, "Failed to remove job file");
    }
}

/// An uploaded file streamed to disk before its job is registered.
///
/// Removed on drop unless [`StagedUpload::persist`] hands it to a job.
#[derive(Debug)]
pub struct StagedUpload {
    path: PathBuf,
    file: Option<tokio::fs::File>,
    len: u64,
    persisted: bool,
}

impl StagedUpload {
    /// Create `<root>/upload-<random>.part`.
    pub async fn create(root: &Path) -> std::io::Result<Self> {
        tokio::fs::create_dir_all(root).await?;
        let path = root.join(format!("upload-{}.part", Uuid::new_v4().simple()));
        let file = tokio::fs::File::create(&path).await?;
        Ok(Self {
            path,
            file: Some(file),
            len: 0,
            persisted: false,
        })
    }

    pub async fn write(&mut self, chunk: &[u8]) -> std::io::Result<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| std::io::Error::other("staged upload already finished"))?;
        file.write_all(chunk).await?;
        self.len += chunk.len() as u64;
        Ok(())
    }

    /// Flush and close the file.
    pub async fn finish(&mut self) -> std::io::Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
        }
        Ok(())
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Keep the file; the caller now owns its removal.
    pub fn persist(mut self) -> PathBuf {
        self.persisted = true;
        std::mem::take(&mut self.path)
    }
}

impl Drop for StagedUpload {
    fn drop(&mut self) {
        if self.persisted {
            return;
        }
        self.file.take();
        if let Err(e) = std::fs::remove_file(&self.path) {
            log_removal_failure(&self.path, e);
        }
    }
}
