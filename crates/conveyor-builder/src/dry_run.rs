//! Dry-run decorator.

use async_trait::async_trait;
use conveyor_core::{BuildContext, BuildOptions, Builder, Image, LogSink, Result};
use std::sync::Arc;
use tracing::info;

/// Skips the wrapped builder entirely when enabled and reports success.
pub struct DryRunBuilder {
    inner: Arc<dyn Builder>,
    enabled: bool,
}

impl DryRunBuilder {
    pub fn new(inner: Arc<dyn Builder>, enabled: bool) -> Self {
        Self { inner, enabled }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

#[async_trait]
impl Builder for DryRunBuilder {
    fn name(&self) -> &'static str {
        "dry-run"
    }

    async fn build(
        &self,
        ctx: &BuildContext,
        options: &BuildOptions,
        logs: &dyn LogSink,
    ) -> Result<Image> {
        if !self.enabled {
            return self.inner.build(ctx, options, logs).await;
        }

        info!(
            build_id = %options.id,
            repo = %options.repository,
            sha = %options.sha,
            "Dry run, skipping build"
        );
        let _ = logs
            .write(format!("Dry run: skipped build of {}@{}\n", options.repository, options.sha).as_bytes())
            .await;

        Ok(Image::new(format!("{}:{}", options.repository, options.sha)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CountingBuilder, Outcome};
    use conveyor_core::{BuildId, Error};
    use conveyor_logs::memory::MemorySink;

    fn options() -> BuildOptions {
        BuildOptions::new(BuildId::new(), "remind101/acme-inc", "master", "abcd")
    }

    #[tokio::test]
    async fn test_enabled_never_calls_inner() {
        let inner = Arc::new(CountingBuilder::new(Outcome::Fail));
        let builder = DryRunBuilder::new(inner.clone(), true);
        let logs = MemorySink::detached();

        let image = builder
            .build(&BuildContext::new(), &options(), &logs)
            .await
            .unwrap();

        assert_eq!(image.as_str(), "remind101/acme-inc:abcd");
        assert_eq!(inner.calls(), 0);
        assert!(String::from_utf8_lossy(&logs.contents()).contains("Dry run"));
    }

    #[tokio::test]
    async fn test_disabled_passes_through() {
        let inner = Arc::new(CountingBuilder::new(Outcome::Fail));
        let builder = DryRunBuilder::new(inner.clone(), false);
        let logs = MemorySink::detached();

        let err = builder
            .build(&BuildContext::new(), &options(), &logs)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::BuildFailed { .. }));
        assert_eq!(inner.calls(), 1);
    }
}
