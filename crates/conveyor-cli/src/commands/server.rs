//! `conveyor server`: webhook server and worker pool in one process.

use anyhow::{Context, Result, bail};
use clap::Args;
use conveyor_api::{AppState, GitHubClient};
use conveyor_builder::{Chain, DockerBuilder};
use conveyor_config::Config;
use conveyor_core::{BuildQueue, LogReporter, MultiReporter, Reporter, delivery_channel};
use conveyor_scheduler::{MemoryQueue, WorkerOptions, WorkerPool, default_workers};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use url::Url;

/// Flags for `conveyor server`. Each one overrides the configuration file.
#[derive(Debug, Default, Args)]
pub struct ServerArgs {
    /// KDL configuration file
    #[arg(long, env = "CONVEYOR_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long, env = "LISTEN")]
    listen: Option<String>,

    /// Path the webhook is served on
    #[arg(long, env = "WEBHOOK_PATH")]
    path: Option<String>,

    /// GitHub API token used to post commit statuses
    #[arg(long = "github.token", env = "GITHUB_TOKEN")]
    github_token: Option<String>,

    /// GitHub Enterprise domain
    #[arg(long = "github.domain", env = "GITHUB_DOMAIN")]
    github_domain: Option<String>,

    /// Shared secret used to verify webhook signatures
    #[arg(long = "github.secret", env = "GITHUB_SECRET")]
    github_secret: Option<String>,

    /// Simulate builds instead of running them
    #[arg(long, env = "DRY", num_args = 0..=1, default_missing_value = "true")]
    dry: Option<bool>,

    /// Image used to perform builds
    #[arg(long = "builder.image", env = "BUILDER_IMAGE")]
    builder_image: Option<String>,

    /// Number of concurrent builds
    #[arg(long, env = "WORKERS")]
    workers: Option<usize>,

    /// Log sink URI(s), comma separated
    #[arg(long, env = "LOGGER")]
    logger: Option<String>,

    /// Error reporter URI
    #[arg(long, env = "REPORTER")]
    reporter: Option<String>,

    /// Build timeout in seconds
    #[arg(long, env = "BUILD_TIMEOUT")]
    timeout: Option<u64>,
}

impl ServerArgs {
    /// Layer the flags over `config`.
    fn apply(&self, mut config: Config) -> Config {
        if let Some(listen) = &self.listen {
            config.server.listen = listen.clone();
        }
        if let Some(path) = &self.path {
            config.server.path = path.clone();
        }
        if let Some(token) = &self.github_token {
            config.github.token = Some(token.clone());
        }
        if let Some(domain) = &self.github_domain {
            config.github.domain = Some(domain.clone());
        }
        if let Some(secret) = &self.github_secret {
            config.github.secret = Some(secret.clone());
        }
        if let Some(dry) = self.dry {
            config.builder.dry = dry;
        }
        if let Some(image) = &self.builder_image {
            config.builder.image = image.clone();
        }
        if let Some(workers) = self.workers {
            config.workers = Some(workers);
        }
        if let Some(logger) = &self.logger {
            config.logger = logger.clone();
        }
        if let Some(reporter) = &self.reporter {
            config.reporter = reporter.clone();
        }
        config
    }

    /// Resolve the effective configuration.
    fn load(&self) -> Result<Config> {
        let base = match &self.config {
            Some(path) => conveyor_config::load_config(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => Config::default(),
        };

        let config = self.apply(base);
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout.filter(|s| *s > 0).map(Duration::from_secs)
    }
}

/// Build an error reporter from a URI. Several URIs may be comma separated.
pub fn reporter(uri: &str) -> Result<Arc<dyn Reporter>> {
    let mut reporters: Vec<Arc<dyn Reporter>> = Vec::new();

    for uri in uri.split(',').map(str::trim).filter(|u| !u.is_empty()) {
        let url = Url::parse(uri).with_context(|| format!("Invalid reporter uri {:?}", uri))?;
        match url.scheme() {
            "log" => reporters.push(Arc::new(LogReporter)),
            other => bail!("Unsupported reporter scheme: {}", other),
        }
    }

    Ok(match reporters.len() {
        0 => Arc::new(LogReporter),
        1 => reporters.remove(0),
        _ => Arc::new(MultiReporter::new(reporters)),
    })
}

/// Run the server until SIGINT or SIGTERM, then drain in-flight builds.
pub async fn run(args: ServerArgs) -> Result<()> {
    let config = args.load()?;
    let workers = config.workers.unwrap_or_else(default_workers);

    let log_factory = conveyor_logs::log_factory(&config.logger).context("Invalid logger")?;
    let reporter = reporter(&config.reporter)?;

    let docker = DockerBuilder::new()
        .context("Failed to connect to Docker")?
        .with_image(&config.builder.image)
        .with_docker_socket(&config.builder.docker_socket);

    let mut chain = Chain::new(docker).dry_run(config.builder.dry);
    match &config.github.token {
        Some(token) => {
            let github = GitHubClient::for_domain(token, config.github.domain.as_deref());
            info!(api = %github.api_url(), "Reporting commit statuses to GitHub");
            chain = chain.commit_status(Arc::new(github));
        }
        None => warn!("No GitHub token configured, commit statuses are disabled"),
    }
    let builder = chain.into_builder();

    let queue = Arc::new(MemoryQueue::new(config.queue.capacity));
    let (tx, rx) = delivery_channel(workers);
    queue.subscribe(tx)?;

    let pool = WorkerPool::new(
        workers,
        WorkerOptions {
            builder,
            log_factory,
            reporter,
            build_requests: rx,
        },
    );
    pool.start();

    let mut state = AppState::new()
        .with_queue(queue.clone())
        .with_timeout(args.timeout());
    if let Some(secret) = &config.github.secret {
        state = state.with_secret(secret);
    }

    let app = conveyor_api::router(state, &config.server.path).layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(&config.server.listen)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.listen))?;
    info!(
        addr = %config.server.listen,
        path = %config.server.path,
        workers,
        dry = config.builder.dry,
        "Conveyor listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Draining build queue");
    queue.close();
    pool.shutdown().await;
    info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}
