//! Scratch storage for downloaded media
//!
//! Voice notes are downloaded to a temporary file before being read into a
//! content part. The file is removed when the guard is dropped, so every exit
//! path of a request cleans up, including errors and panics.

use std::path::Path;
use tempfile::NamedTempFile;

use crate::error::PipelineError;

/// Temporary file removed on drop
#[derive(Debug)]
pub struct ScratchFile {
    file: NamedTempFile,
}

impl ScratchFile {
    /// Create an empty scratch file in the system temp directory
    pub fn new(suffix: &str) -> Result<Self, PipelineError> {
        let file = tempfile::Builder::new()
            .prefix("relaygram-")
            .suffix(suffix)
            .tempfile()
            .map_err(|e| PipelineError::Media(format!("failed to create scratch file: {}", e)))?;
        tracing::debug!(path = %file.path().display(), "Created scratch file");
        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Contents written so far
    pub async fn read_bytes(&self) -> Result<Vec<u8>, PipelineError> {
        tokio::fs::read(self.file.path()).await.map_err(|e| {
            PipelineError::Media(format!(
                "failed to read scratch file {}: {}",
                self.file.path().display(),
                e
            ))
        })
    }
}
