//! Stdout log sink.

use async_trait::async_trait;
use conveyor_core::{BuildId, Error, LogFactory, LogSink, Result};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Writes build output to the process's stdout, one prefixed line at a time.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutLogger;

impl StdoutLogger {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LogFactory for StdoutLogger {
    async fn create(&self, id: &BuildId) -> Result<Box<dyn LogSink>> {
        Ok(Box::new(StdoutSink::new(*id)))
    }
}

/// Stdout sink for a single build.
///
/// Partial lines are held back until the newline (or close) arrives so
/// concurrent builds do not interleave mid-line.
pub struct StdoutSink {
    id: BuildId,
    pending: Mutex<Vec<u8>>,
}

impl StdoutSink {
    pub fn new(id: BuildId) -> Self {
        Self {
            id,
            pending: Mutex::new(Vec::new()),
        }
    }

    fn prefixed(&self, line: &[u8]) -> Vec<u8> {
        let mut out = format!("[{}] ", self.id).into_bytes();
        out.extend_from_slice(line);
        if !line.ends_with(b"\n") {
            out.push(b'\n');
        }
        out
    }
}

#[async_trait]
impl LogSink for StdoutSink {
    async fn write(&self, chunk: &[u8]) -> Result<()> {
        let mut pending = self.pending.lock().await;
        pending.extend_from_slice(chunk);

        let Some(last_newline) = pending.iter().rposition(|b| *b == b'\n') else {
            return Ok(());
        };
        let complete: Vec<u8> = pending.drain(..=last_newline).collect();

        let mut out = Vec::with_capacity(complete.len());
        for line in complete.split_inclusive(|b| *b == b'\n') {
            out.extend(self.prefixed(line));
        }

        let mut stdout = tokio::io::stdout();
        stdout
            .write_all(&out)
            .await
            .map_err(|e| Error::LogSink(e.to_string()))?;
        stdout
            .flush()
            .await
            .map_err(|e| Error::LogSink(e.to_string()))
    }

    async fn close(&self) -> Result<()> {
        let mut pending = self.pending.lock().await;
        if pending.is_empty() {
            return Ok(());
        }
        let out = self.prefixed(&pending);
        pending.clear();

        let mut stdout = tokio::io::stdout();
        stdout
            .write_all(&out)
            .await
            .map_err(|e| Error::LogSink(e.to_string()))?;
        stdout
            .flush()
            .await
            .map_err(|e| Error::LogSink(e.to_string()))
    }
}
