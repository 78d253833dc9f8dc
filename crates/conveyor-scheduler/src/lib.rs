//! Build scheduling for Conveyor.
//!
//! Provides the in-process build queue and the worker pool that drains it.
//! Producers push builds onto a [`BuildQueue`]; the queue delivers them to a
//! single subscribed channel shared by every worker in the pool.

pub mod queue;
pub mod worker;

pub use conveyor_core::BuildQueue;
pub use queue::MemoryQueue;
pub use worker::{Worker, WorkerOptions, WorkerPool, default_workers};
