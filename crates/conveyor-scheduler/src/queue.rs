//! In-process build queue.

use async_trait::async_trait;
use conveyor_core::{
    BuildContext, BuildOptions, BuildQueue, BuildRequest, DeliverySender, Error, Result,
};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Default number of builds buffered before `push` blocks.
pub const DEFAULT_CAPACITY: usize = 100;

/// Build queue backed by a bounded in-memory channel.
///
/// Buffered builds are lost when the process exits. Pushes block while the
/// buffer is full, which in turn happens when the subscribed delivery
/// channel is not being drained.
pub struct MemoryQueue {
    tx: async_channel::Sender<BuildRequest>,
    rx: async_channel::Receiver<BuildRequest>,
    subscribed: AtomicBool,
}

impl MemoryQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = async_channel::bounded(capacity.max(1));
        Self {
            tx,
            rx,
            subscribed: AtomicBool::new(false),
        }
    }

    /// Stop accepting builds. Builds already buffered are still delivered.
    pub fn close(&self) {
        if self.tx.close() {
            info!(buffered = self.tx.len(), "Build queue closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Number of builds buffered and not yet delivered.
    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[async_trait]
impl BuildQueue for MemoryQueue {
    async fn push(&self, ctx: BuildContext, options: BuildOptions) -> Result<()> {
        if let Some(err) = ctx.err() {
            return Err(err);
        }

        let id = options.id;
        let request = BuildRequest::new(ctx.clone(), options);

        tokio::select! {
            biased;
            err = ctx.done() => return Err(err),
            sent = self.tx.send(request) => sent.map_err(|_| Error::QueueClosed)?,
        }

        debug!(build_id = %id, buffered = self.tx.len(), "Queued build");
        Ok(())
    }

    /// Start delivering buffered builds to `ch`.
    ///
    /// Spawns the delivery task, so this must be called from within a Tokio
    /// runtime.
    fn subscribe(&self, ch: DeliverySender) -> Result<()> {
        if self.subscribed.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadySubscribed);
        }

        tokio::spawn(deliver(self.rx.clone(), ch));
        Ok(())
    }
}

/// Move builds from the queue's buffer to the subscriber, one at a time.
async fn deliver(rx: async_channel::Receiver<BuildRequest>, ch: DeliverySender) {
    while let Ok(request) = rx.recv().await {
        let id = request.options.id;
        if ch.send(request).await.is_err() {
            warn!(build_id = %id, "Delivery channel closed, dropping build");
            return;
        }
    }
    ch.close();
    debug!("Build queue drained");
}
