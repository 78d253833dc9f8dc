//! Worker pool that drains the delivery channel and runs builds.

use conveyor_core::{
    BuildOutcome, BuildRequest, Builder, DeliveryReceiver, Error, LogFactory, ReportContext,
    Reporter,
};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, error, info, info_span, warn};

/// Number of workers to run when none is configured: one per available CPU.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Collaborators shared by every worker in a pool.
#[derive(Clone)]
pub struct WorkerOptions {
    /// Builder chain invoked for each request.
    pub builder: Arc<dyn Builder>,
    /// Creates the log sink for each build.
    pub log_factory: Arc<dyn LogFactory>,
    /// Receives build and infrastructure errors.
    pub reporter: Arc<dyn Reporter>,
    /// Channel the build queue delivers requests on.
    pub build_requests: DeliveryReceiver,
}

/// A single worker: receives one request at a time and builds it to
/// completion before receiving the next.
pub struct Worker {
    id: usize,
    options: WorkerOptions,
    shutdown: CancellationToken,
}

impl Worker {
    pub fn new(id: usize, options: WorkerOptions, shutdown: CancellationToken) -> Self {
        Self {
            id,
            options,
            shutdown,
        }
    }

    /// Run the worker loop until shutdown or until the channel closes.
    pub async fn run(self) {
        info!(worker_id = self.id, "Starting worker");

        loop {
            let request = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                request = self.options.build_requests.recv() => match request {
                    Ok(request) => request,
                    Err(_) => {
                        info!(worker_id = self.id, "Delivery channel closed");
                        break;
                    }
                },
            };

            let span = info_span!(
                "build",
                worker_id = self.id,
                build_id = %request.options.id,
                repo = %request.options.repository,
                branch = %request.options.branch,
                sha = %request.options.sha,
            );
            self.process(request).instrument(span).await;
        }

        info!(worker_id = self.id, "Worker stopped");
    }

    /// Build one request. Never panics and never returns an error: failures
    /// are reported and the worker moves on.
    async fn process(&self, request: BuildRequest) -> BuildOutcome {
        let report_ctx = ReportContext::for_build(&request.options).with("worker_id", self.id);

        match AssertUnwindSafe(self.run_build(request, &report_ctx))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(panic) => {
                let err = Error::from_panic(panic.as_ref(), "worker");
                error!(error = %err, "Build errored");
                self.options.reporter.report(
                    &err,
                    &report_ctx.clone().with("outcome", BuildOutcome::Errored),
                );
                BuildOutcome::Errored
            }
        }
    }

    async fn run_build(&self, request: BuildRequest, report_ctx: &ReportContext) -> BuildOutcome {
        let BuildRequest { ctx, options } = request;

        let logs = match self.options.log_factory.create(&options.id).await {
            Ok(logs) => logs,
            Err(e) => {
                error!(error = %e, "Failed to create log sink, skipping build");
                self.options.reporter.report(&e, report_ctx);
                return BuildOutcome::Errored;
            }
        };

        info!(no_cache = options.no_cache, "Build started");

        // Contained here so the sink is still closed after a panic.
        let result = AssertUnwindSafe(self.options.builder.build(&ctx, &options, logs.as_ref()))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(Error::from_panic(panic.as_ref(), "build")));

        if let Err(e) = logs.close().await {
            warn!(error = %e, "Failed to close log sink");
            self.options.reporter.report(&e, report_ctx);
        }

        let outcome = BuildOutcome::of(&result);
        match result {
            Ok(image) => info!(image = %image, "Build succeeded"),
            Err(e) => {
                match outcome {
                    BuildOutcome::Failed => warn!(error = %e, "Build failed"),
                    _ => error!(error = %e, "Build errored"),
                }
                self.options
                    .reporter
                    .report(&e, &report_ctx.clone().with("outcome", outcome));
            }
        }
        outcome
    }
}

/// Fixed-size pool of workers sharing one delivery channel.
pub struct WorkerPool {
    size: usize,
    options: WorkerOptions,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    started: AtomicBool,
}

impl WorkerPool {
    pub fn new(size: usize, options: WorkerOptions) -> Self {
        Self {
            size: size.max(1),
            options,
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
            started: AtomicBool::new(false),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Spawn the workers. Calling `start` more than once has no effect.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("Worker pool already started");
            return;
        }

        info!(workers = self.size, "Starting worker pool");
        for id in 0..self.size {
            let worker = Worker::new(id, self.options.clone(), self.shutdown.child_token());
            self.tracker.spawn(worker.run());
        }
        self.tracker.close();
    }

    /// Stop taking new builds and wait for in-flight builds to finish.
    ///
    /// Idle workers exit immediately. Running builds are not cancelled;
    /// cancel a build's own context for that.
    pub async fn shutdown(&self) {
        info!(
            workers = self.size,
            in_flight = self.tracker.len(),
            "Shutting down worker pool"
        );
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        info!("Worker pool stopped");
    }

    /// Token cancelled when shutdown begins.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}
