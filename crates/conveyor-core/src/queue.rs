//! Build queue contract.

use async_trait::async_trait;

use crate::{BuildContext, BuildOptions, BuildRequest, Result};

/// Sending half of a delivery channel handed to [`BuildQueue::subscribe`].
pub type DeliverySender = async_channel::Sender<BuildRequest>;

/// Receiving half of a delivery channel, cloned into every worker.
pub type DeliveryReceiver = async_channel::Receiver<BuildRequest>;

/// Create a bounded delivery channel.
///
/// The channel is multi-producer multi-consumer, so a single receiver can
/// be shared by every worker in a pool. A full channel blocks the queue.
pub fn delivery_channel(capacity: usize) -> (DeliverySender, DeliveryReceiver) {
    async_channel::bounded(capacity.max(1))
}

/// Mailbox decoupling build producers from the worker pool.
///
/// Implementations decide durability and ordering. A successful `push`
/// means the request is queued; requests are delivered to the single
/// subscribed channel, each one exactly once.
#[async_trait]
pub trait BuildQueue: Send + Sync {
    /// Enqueue a build.
    async fn push(&self, ctx: BuildContext, options: BuildOptions) -> Result<()>;

    /// Register the channel that receives queued builds.
    ///
    /// May be called once; later calls return [`crate::Error::AlreadySubscribed`].
    fn subscribe(&self, ch: DeliverySender) -> Result<()>;
}
