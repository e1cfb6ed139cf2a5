//! Archive of synthesized clips
//!
//! Clips are written as `Recording_<yyyyMMdd_HHmmss>.<ext>`; a numeric suffix
//! keeps clips from the same second apart.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use crate::Result;

use super::RawAudioPayload;

/// Saves raw provider payloads to a directory
#[derive(Debug, Clone)]
pub struct RecordingArchive {
    dir: PathBuf,
}

impl RecordingArchive {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Save a payload stamped with the current local time
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created or the file written
    pub async fn save(&self, payload: &RawAudioPayload) -> Result<PathBuf> {
        self.save_at(payload, Local::now()).await
    }

    /// Save a payload stamped with `at`
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created or the file written
    pub async fn save_at(
        &self,
        payload: &RawAudioPayload,
        at: DateTime<Local>,
    ) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let stem = format!("Recording_{}", at.format("%Y%m%d_%H%M%S"));
        let ext = payload.encoding.extension();

        let mut n = 0;
        let (path, mut file) = loop {
            let name = match n {
                0 => format!("{stem}.{ext}"),
                n => format!("{stem}_{n}.{ext}"),
            };
            let path = self.dir.join(name);

            // Claiming the name and creating the file is one step
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => break (path, file),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => n += 1,
                Err(e) => return Err(e.into()),
            }
        };

        file.write_all(&payload.bytes).await?;
        file.flush().await?;
        tracing::info!(path = %path.display(), bytes = payload.bytes.len(), "saved recording");

        Ok(path)
    }
}
