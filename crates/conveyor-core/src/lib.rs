//! Core domain types and traits for the Conveyor build pipeline.
//!
//! This crate contains:
//! - Build identifiers, options and requests
//! - The `Builder` trait implemented by the base builder and its decorators
//! - The `BuildQueue` mailbox contract
//! - Collaborator traits for log sinks, commit statuses and error reporting

pub mod build;
pub mod builder;
pub mod error;
pub mod id;
pub mod logs;
pub mod queue;
pub mod reporter;
pub mod status;

pub use build::{BuildContext, BuildOptions, BuildOutcome, BuildRequest, Image};
pub use builder::Builder;
pub use error::{Error, Result};
pub use id::BuildId;
pub use logs::{LogFactory, LogSink};
pub use queue::{BuildQueue, DeliveryReceiver, DeliverySender, delivery_channel};
pub use reporter::{LogReporter, MultiReporter, ReportContext, Reporter};
pub use status::{CommitState, CommitStatus, StatusClient};
