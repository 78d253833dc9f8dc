//! Per-build log output.

use async_trait::async_trait;

use crate::{BuildId, Result};

/// Append-only destination for a single build's output.
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Append a chunk of output.
    async fn write(&self, chunk: &[u8]) -> Result<()>;

    /// Flush and release the sink. Writes after close are an error.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Creates a log sink scoped to one build.
#[async_trait]
pub trait LogFactory: Send + Sync {
    async fn create(&self, id: &BuildId) -> Result<Box<dyn LogSink>>;
}
