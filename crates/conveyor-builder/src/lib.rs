//! Image builders for Conveyor.
//!
//! Provides the base builder and the decorators layered around it:
//! - Docker (runs the builder image against the local daemon)
//! - Dry run (short-circuits with a synthetic success)
//! - Commit status (reports pending/success/failure to the repository host)

pub mod docker;
pub mod dry_run;
pub mod status;

#[cfg(test)]
mod testing;

pub use conveyor_core::Builder;
pub use docker::DockerBuilder;
pub use dry_run::DryRunBuilder;
pub use status::CommitStatusBuilder;

use conveyor_core::StatusClient;
use std::sync::Arc;

/// Assembles a builder chain from the inside out.
///
/// Each call wraps everything added so far, so the last decorator added
/// is the outermost:
///
/// ```ignore
/// let builder = Chain::new(DockerBuilder::new()?)
///     .dry_run(dry)
///     .commit_status(github)
///     .into_builder();
/// ```
pub struct Chain {
    builder: Arc<dyn Builder>,
}

impl Chain {
    pub fn new(base: impl Builder + 'static) -> Self {
        Self {
            builder: Arc::new(base),
        }
    }

    pub fn from_arc(base: Arc<dyn Builder>) -> Self {
        Self { builder: base }
    }

    pub fn dry_run(self, enabled: bool) -> Self {
        Self {
            builder: Arc::new(DryRunBuilder::new(self.builder, enabled)),
        }
    }

    pub fn commit_status(self, client: Arc<dyn StatusClient>) -> Self {
        self.commit_status_with(client, |b| b)
    }

    /// Wrap with a commit-status decorator, customised by `configure`.
    pub fn commit_status_with(
        self,
        client: Arc<dyn StatusClient>,
        configure: impl FnOnce(CommitStatusBuilder) -> CommitStatusBuilder,
    ) -> Self {
        Self {
            builder: Arc::new(configure(CommitStatusBuilder::new(self.builder, client))),
        }
    }

    pub fn into_builder(self) -> Arc<dyn Builder> {
        self.builder
    }
}
