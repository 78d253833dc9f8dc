//! Fan-out log sink.

use async_trait::async_trait;
use conveyor_core::{BuildId, LogFactory, LogSink, Result};
use std::sync::Arc;

/// Creates one sink per wrapped factory and writes to all of them.
#[derive(Clone)]
pub struct MultiLogger {
    factories: Vec<Arc<dyn LogFactory>>,
}

impl MultiLogger {
    pub fn new(factories: Vec<Arc<dyn LogFactory>>) -> Self {
        Self { factories }
    }
}

#[async_trait]
impl LogFactory for MultiLogger {
    async fn create(&self, id: &BuildId) -> Result<Box<dyn LogSink>> {
        let mut sinks = Vec::with_capacity(self.factories.len());
        for factory in &self.factories {
            sinks.push(factory.create(id).await?);
        }
        Ok(Box::new(MultiSink { sinks }))
    }
}

/// Writes every chunk to each inner sink.
///
/// A failing sink does not stop the others from receiving the chunk; the
/// first error is returned once all sinks have been tried.
pub struct MultiSink {
    sinks: Vec<Box<dyn LogSink>>,
}

#[async_trait]
impl LogSink for MultiSink {
    async fn write(&self, chunk: &[u8]) -> Result<()> {
        let mut first_err = None;
        for sink in &self.sinks {
            if let Err(e) = sink.write(chunk).await {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    async fn close(&self) -> Result<()> {
        let mut first_err = None;
        for sink in &self.sinks {
            if let Err(e) = sink.close().await {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}
