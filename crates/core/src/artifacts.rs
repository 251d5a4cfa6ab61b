//! Filesystem layout for uploaded, intermediate and output media.
//!
//! ```text
//! {upload_dir}/{job_id}_input{ext}
//! {work_dir}/{job_id}/dubbed_audio.wav
//! {output_dir}/{job_id}_dubbed.mp4
//! ```

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::config::StorageConfig;

const DEFAULT_EXTENSION: &str = ".mp4";

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Upload exceeds the {limit_mb} MB limit")]
    TooLarge { limit_mb: u64 },

    #[error("Upload is empty")]
    Empty,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Owns the on-disk locations of every job's media.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    upload_dir: PathBuf,
    output_dir: PathBuf,
    work_dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(storage: &StorageConfig) -> Self {
        Self {
            upload_dir: storage.upload_dir.clone(),
            output_dir: storage.output_dir.clone(),
            work_dir: storage.work_dir.clone(),
        }
    }

    /// Create the storage directories if they do not exist.
    pub async fn ensure_dirs(&self) -> Result<(), ArtifactError> {
        for dir in [&self.upload_dir, &self.output_dir, &self.work_dir] {
            fs::create_dir_all(dir).await?;
        }
        Ok(())
    }

    pub fn input_path(&self, job_id: &str, filename: &str) -> PathBuf {
        self.upload_dir
            .join(format!("{}_input{}", job_id, extension_of(filename)))
    }

    pub fn job_work_dir(&self, job_id: &str) -> PathBuf {
        self.work_dir.join(job_id)
    }

    pub fn audio_path(&self, job_id: &str) -> PathBuf {
        self.job_work_dir(job_id).join("dubbed_audio.wav")
    }

    pub fn output_path(&self, job_id: &str) -> PathBuf {
        self.output_dir.join(format!("{}_dubbed.mp4", job_id))
    }

    /// Start receiving an upload of at most `limit_bytes` (0 = unlimited).
    pub async fn begin_upload(&self, limit_bytes: u64) -> Result<StagedUpload, ArtifactError> {
        fs::create_dir_all(&self.upload_dir).await?;
        let path = self
            .upload_dir
            .join(format!(".incoming-{}", uuid::Uuid::new_v4()));
        let file = File::create(&path).await?;
        Ok(StagedUpload {
            path,
            file: Some(file),
            size_bytes: 0,
            limit_bytes,
        })
    }

    /// Copy a local file into the staging area, leaving the original in place.
    pub async fn stage_copy(&self, source: &Path) -> Result<(PathBuf, u64), ArtifactError> {
        fs::create_dir_all(&self.upload_dir).await?;
        let path = self
            .upload_dir
            .join(format!(".incoming-{}", uuid::Uuid::new_v4()));
        let size_bytes = fs::copy(source, &path).await?;
        if size_bytes == 0 {
            remove_quietly(&path, fs::remove_file(&path).await);
            return Err(ArtifactError::Empty);
        }
        Ok((path, size_bytes))
    }

    /// Move a finished upload to its final input location.
    pub async fn promote(
        &self,
        staged: &Path,
        job_id: &str,
        filename: &str,
    ) -> Result<PathBuf, ArtifactError> {
        let dest = self.input_path(job_id, filename);
        fs::rename(staged, &dest).await?;
        Ok(dest)
    }

    /// Remove everything stored for a job. Missing files are ignored.
    pub async fn remove_job_artifacts(&self, job_id: &str, input: &Path) {
        for file in [input.to_path_buf(), self.output_path(job_id)] {
            remove_quietly(&file, fs::remove_file(&file).await);
        }
        let work = self.job_work_dir(job_id);
        remove_quietly(&work, fs::remove_dir_all(&work).await);
    }
}

fn remove_quietly(path: &Path, result: std::io::Result<()>) {
    match result {
        Ok(()) => debug!("Removed {}", path.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
    }
}

/// `.ext` of an uploaded filename, lowercased. Defaults to `.mp4`.
fn extension_of(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

/// An upload being streamed to a temporary file.
///
/// Dropping it without calling [`StagedUpload::finish`] leaves the partial
/// file behind; call [`StagedUpload::abort`] on error paths.
#[derive(Debug)]
pub struct StagedUpload {
    path: PathBuf,
    file: Option<File>,
    size_bytes: u64,
    limit_bytes: u64,
}

impl StagedUpload {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), ArtifactError> {
        let next = self.size_bytes + chunk.len() as u64;
        if self.limit_bytes > 0 && next > self.limit_bytes {
            return Err(ArtifactError::TooLarge {
                limit_mb: self.limit_bytes / (1024 * 1024),
            });
        }
        if let Some(file) = self.file.as_mut() {
            file.write_all(chunk).await?;
        }
        self.size_bytes = next;
        Ok(())
    }

    /// Flush and close. Returns the staged path and its size.
    pub async fn finish(mut self) -> Result<(PathBuf, u64), ArtifactError> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
        }
        if self.size_bytes == 0 {
            self.abort().await;
            return Err(ArtifactError::Empty);
        }
        Ok((self.path, self.size_bytes))
    }

    /// Discard the partial upload.
    pub async fn abort(mut self) {
        self.file.take();
        remove_quietly(&self.path, fs::remove_file(&self.path).await);
    }
}
