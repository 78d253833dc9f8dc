//! The build capability shared by the base builder and its decorators.
//!
//! A chain is assembled by wrapping a base builder (which drives the real
//! toolchain) in zero or more decorators. Every decorator holds an inner
//! `Arc<dyn Builder>`, invokes it at most once per `build` call and returns
//! its result unchanged.

use async_trait::async_trait;
use std::sync::Arc;

use crate::{BuildContext, BuildOptions, Image, LogSink, Result};

/// Trait for anything that can build an image.
#[async_trait]
pub trait Builder: Send + Sync {
    /// Name of this builder, used in logs.
    fn name(&self) -> &'static str;

    /// Build the image described by `options`, streaming output to `logs`.
    async fn build(
        &self,
        ctx: &BuildContext,
        options: &BuildOptions,
        logs: &dyn LogSink,
    ) -> Result<Image>;
}

#[async_trait]
impl<B: Builder + ?Sized> Builder for Arc<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn build(
        &self,
        ctx: &BuildContext,
        options: &BuildOptions,
        logs: &dyn LogSink,
    ) -> Result<Image> {
        (**self).build(ctx, options, logs).await
    }
}
