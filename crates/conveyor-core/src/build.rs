//! Build options, requests and outcomes.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{BuildId, Error};

/// Commit message marker that disables the build cache.
pub const NO_CACHE_MARKER: &str = "[docker nocache]";

/// Immutable description of a build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOptions {
    /// Unique identifier for this build.
    pub id: BuildId,
    /// Repository full name (`owner/name`).
    pub repository: String,
    /// Branch that was pushed.
    pub branch: String,
    /// Commit SHA to build.
    pub sha: String,
    /// Disable the image build cache.
    pub no_cache: bool,
}

impl BuildOptions {
    pub fn new(
        id: BuildId,
        repository: impl Into<String>,
        branch: impl Into<String>,
        sha: impl Into<String>,
    ) -> Self {
        Self {
            id,
            repository: repository.into(),
            branch: branch.into(),
            sha: sha.into(),
            no_cache: false,
        }
    }

    pub fn with_no_cache(mut self, no_cache: bool) -> Self {
        self.no_cache = no_cache;
        self
    }
}

/// Whether a commit message asks for an uncached build.
pub fn no_cache(message: &str) -> bool {
    message.contains(NO_CACHE_MARKER)
}

/// Execution context for a build: cancellation plus an optional deadline.
///
/// Cloning shares the underlying cancellation token.
#[derive(Debug, Clone, Default)]
pub struct BuildContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl BuildContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context that expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancel: CancellationToken::new(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Create a context driven by an existing cancellation token.
    pub fn with_token(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            deadline: None,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Cancel the build this context belongs to.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// The reason this context is done, if it is.
    pub fn err(&self) -> Option<Error> {
        if self.cancel.is_cancelled() {
            return Some(Error::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                Some(Error::Timeout("build deadline exceeded".to_string()))
            }
            _ => None,
        }
    }

    /// Resolve once the context is cancelled or its deadline passes,
    /// returning the corresponding error.
    pub async fn done(&self) -> Error {
        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = self.cancel.cancelled() => Error::Cancelled,
                _ = tokio::time::sleep_until(deadline) => {
                    Error::Timeout("build deadline exceeded".to_string())
                }
            },
            None => {
                self.cancel.cancelled().await;
                Error::Cancelled
            }
        }
    }
}

/// A build destined for exactly one worker.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub ctx: BuildContext,
    pub options: BuildOptions,
}

impl BuildRequest {
    pub fn new(ctx: BuildContext, options: BuildOptions) -> Self {
        Self { ctx, options }
    }
}

/// Opaque identifier of a built image.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("{_0}")]
pub struct Image(String);

impl Image {
    pub fn new(image: impl Into<String>) -> Self {
        Self(image.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// How a build concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildOutcome {
    Succeeded,
    /// The toolchain reported failure, or the build was cancelled.
    Failed,
    /// Infrastructure failure around the build.
    Errored,
}

impl BuildOutcome {
    pub fn of<T>(result: &crate::Result<T>) -> Self {
        match result {
            Ok(_) => BuildOutcome::Succeeded,
            Err(e) => e.outcome(),
        }
    }
}

impl std::fmt::Display for BuildOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildOutcome::Succeeded => write!(f, "succeeded"),
            BuildOutcome::Failed => write!(f, "failed"),
            BuildOutcome::Errored => write!(f, "errored"),
        }
    }
}
