//! Commit-status decorator.

use async_trait::async_trait;
use conveyor_core::{
    BuildContext, BuildOptions, Builder, CommitState, CommitStatus, Error, Image, LogSink, Result,
    StatusClient,
};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, warn};

/// Status context used when none is configured.
pub const DEFAULT_CONTEXT: &str = "container/docker";

/// Reports a pending status before the wrapped build and a success or
/// failure status after it.
///
/// Status updates are best-effort: a failing status client is logged and
/// never changes the build result.
pub struct CommitStatusBuilder {
    inner: Arc<dyn Builder>,
    client: Arc<dyn StatusClient>,
    context: String,
    /// Link attached to every status; `{id}` is replaced by the build id.
    target_url: Option<String>,
}

impl CommitStatusBuilder {
    pub fn new(inner: Arc<dyn Builder>, client: Arc<dyn StatusClient>) -> Self {
        Self {
            inner,
            client,
            context: DEFAULT_CONTEXT.to_string(),
            target_url: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    pub fn with_target_url(mut self, template: impl Into<String>) -> Self {
        self.target_url = Some(template.into());
        self
    }

    fn status(&self, options: &BuildOptions, state: CommitState, description: String) -> CommitStatus {
        CommitStatus {
            state,
            description,
            context: self.context.clone(),
            target_url: self
                .target_url
                .as_ref()
                .map(|t| t.replace("{id}", &options.id.to_string())),
        }
    }

    async fn update(&self, options: &BuildOptions, state: CommitState, description: String) {
        let status = self.status(options, state, description);
        match self
            .client
            .set_status(&options.repository, &options.sha, &status)
            .await
        {
            Ok(()) => {
                debug!(build_id = %options.id, state = %state, "Updated commit status");
            }
            Err(e) => {
                warn!(
                    build_id = %options.id,
                    repo = %options.repository,
                    sha = %options.sha,
                    state = %state,
                    error = %e,
                    "Failed to update commit status"
                );
            }
        }
    }
}

#[async_trait]
impl Builder for CommitStatusBuilder {
    fn name(&self) -> &'static str {
        "commit-status"
    }

    async fn build(
        &self,
        ctx: &BuildContext,
        options: &BuildOptions,
        logs: &dyn LogSink,
    ) -> Result<Image> {
        self.update(options, CommitState::Pending, "Image building.".to_string())
            .await;

        // A panicking build still gets its terminal status.
        let result = AssertUnwindSafe(self.inner.build(ctx, options, logs))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(Error::from_panic(panic.as_ref(), "build")));

        match &result {
            Ok(image) => {
                self.update(
                    options,
                    CommitState::Success,
                    format!("Image was built: {}", image),
                )
                .await
            }
            Err(_) => {
                self.update(
                    options,
                    CommitState::Failure,
                    "Image building failed.".to_string(),
                )
                .await
            }
        }

        result
    }
}
