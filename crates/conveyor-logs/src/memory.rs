//! In-memory log sink.

use async_trait::async_trait;
use conveyor_core::{BuildId, LogFactory, LogSink, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// Number of builds a [`MemoryLogger`] keeps when none is configured.
pub const DEFAULT_RETAINED_BUILDS: usize = 100;

#[derive(Debug)]
struct Store {
    buffers: HashMap<BuildId, Vec<u8>>,
    /// Creation order, oldest first.
    order: VecDeque<BuildId>,
    capacity: usize,
}

impl Store {
    fn new(capacity: usize) -> Self {
        Self {
            buffers: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    fn insert(&mut self, id: BuildId) {
        if self.buffers.contains_key(&id) {
            return;
        }
        while self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.buffers.remove(&oldest);
            }
        }
        self.buffers.insert(id, Vec::new());
        self.order.push_back(id);
    }
}

type Buffers = Arc<Mutex<Store>>;

/// Keeps output of the most recent builds in memory, keyed by build id.
///
/// Once more than `capacity` builds have had sinks created, the oldest
/// build's output is evicted and further writes to its sink are dropped.
#[derive(Debug, Clone)]
pub struct MemoryLogger {
    buffers: Buffers,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_RETAINED_BUILDS)
    }

    /// Retain output for at most `capacity` builds.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffers: Arc::new(Mutex::new(Store::new(capacity))),
        }
    }

    /// Output captured for a build, if it is still retained.
    pub fn contents(&self, id: &BuildId) -> Option<Vec<u8>> {
        self.buffers
            .lock()
            .ok()
            .and_then(|store| store.buffers.get(id).cloned())
    }

    /// Ids of every retained build, oldest first.
    pub fn builds(&self) -> Vec<BuildId> {
        self.buffers
            .lock()
            .map(|store| store.order.iter().copied().collect())
            .unwrap_or_default()
    }
}

impl Default for MemoryLogger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LogFactory for MemoryLogger {
    async fn create(&self, id: &BuildId) -> Result<Box<dyn LogSink>> {
        if let Ok(mut store) = self.buffers.lock() {
            store.insert(*id);
        }
        Ok(Box::new(MemorySink {
            id: *id,
            buffers: self.buffers.clone(),
        }))
    }
}

/// Sink that appends into a [`MemoryLogger`]'s buffer.
pub struct MemorySink {
    id: BuildId,
    buffers: Buffers,
}

impl MemorySink {
    /// A standalone sink, not attached to any logger.
    pub fn detached() -> Self {
        let id = BuildId::new();
        let mut store = Store::new(1);
        store.insert(id);
        Self {
            id,
            buffers: Arc::new(Mutex::new(store)),
        }
    }

    pub fn contents(&self) -> Vec<u8> {
        self.buffers
            .lock()
            .ok()
            .and_then(|store| store.buffers.get(&self.id).cloned())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LogSink for MemorySink {
    async fn write(&self, chunk: &[u8]) -> Result<()> {
        if let Ok(mut store) = self.buffers.lock() {
            if let Some(buffer) = store.buffers.get_mut(&self.id) {
                buffer.extend_from_slice(chunk);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_captures_output_per_build() {
        let logger = MemoryLogger::new();
        let a = BuildId::new();
        let b = BuildId::new();

        let sink_a = logger.create(&a).await.unwrap();
        let sink_b = logger.create(&b).await.unwrap();
        sink_a.write(b"hello ").await.unwrap();
        sink_b.write(b"other").await.unwrap();
        sink_a.write(b"world").await.unwrap();

        assert_eq!(logger.contents(&a).unwrap(), b"hello world");
        assert_eq!(logger.contents(&b).unwrap(), b"other");
        assert_eq!(logger.builds().len(), 2);
    }

    #[tokio::test]
    async fn test_detached_sink() {
        let sink = MemorySink::detached();
        sink.write(b"abc").await.unwrap();
        assert_eq!(sink.contents(), b"abc");
    }

    #[tokio::test]
    async fn test_oldest_builds_are_evicted() {
        let logger = MemoryLogger::with_capacity(2);
        let ids: Vec<_> = (0..3).map(|_| BuildId::new()).collect();

        let mut sinks = Vec::new();
        for id in &ids {
            sinks.push(logger.create(id).await.unwrap());
        }
        for sink in &sinks {
            sink.write(b"output").await.unwrap();
        }

        assert_eq!(logger.builds(), vec![ids[1], ids[2]]);
        assert_eq!(logger.contents(&ids[0]), None);
        assert_eq!(logger.contents(&ids[2]).unwrap(), b"output");
    }

    #[tokio::test]
    async fn test_default_retention_is_bounded() {
        let logger = MemoryLogger::new();
        for _ in 0..DEFAULT_RETAINED_BUILDS + 5 {
            logger.create(&BuildId::new()).await.unwrap();
        }
        assert_eq!(logger.builds().len(), DEFAULT_RETAINED_BUILDS);
    }
}
