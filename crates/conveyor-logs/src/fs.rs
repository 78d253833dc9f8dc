//! Filesystem log sink.

use async_trait::async_trait;
use conveyor_core::{BuildId, Error, LogFactory, LogSink, Result};
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

/// Stores each build's output in `<dir>/<build id>.log`.
#[derive(Debug, Clone)]
pub struct FileLogger {
    dir: PathBuf,
}

impl FileLogger {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the log file for a build.
    pub fn path_for(&self, id: &BuildId) -> PathBuf {
        self.dir.join(format!("{}.log", id))
    }
}

#[async_trait]
impl LogFactory for FileLogger {
    async fn create(&self, id: &BuildId) -> Result<Box<dyn LogSink>> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Error::LogSink(format!("failed to create {}: {}", self.dir.display(), e)))?;

        let path = self.path_for(id);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| Error::LogSink(format!("failed to open {}: {}", path.display(), e)))?;

        debug!(build_id = %id, path = %path.display(), "Opened build log");
        Ok(Box::new(FileSink {
            file: Mutex::new(Some(file)),
        }))
    }
}

/// Append-only file for one build.
pub struct FileSink {
    file: Mutex<Option<File>>,
}

#[async_trait]
impl LogSink for FileSink {
    async fn write(&self, chunk: &[u8]) -> Result<()> {
        let mut guard = self.file.lock().await;
        let file = guard
            .as_mut()
            .ok_or_else(|| Error::LogSink("log file is closed".to_string()))?;
        file.write_all(chunk)
            .await
            .map_err(|e| Error::LogSink(e.to_string()))
    }

    async fn close(&self) -> Result<()> {
        let mut guard = self.file.lock().await;
        if let Some(mut file) = guard.take() {
            file.flush()
                .await
                .map_err(|e| Error::LogSink(e.to_string()))?;
            file.sync_all()
                .await
                .map_err(|e| Error::LogSink(e.to_string()))?;
        }
        Ok(())
    }
}
