//! Docker base builder.
//!
//! Runs the builder image in a throwaway container with the host's Docker
//! socket mounted. The builder image clones the repository at the requested
//! commit, runs `docker build` and pushes the result; this module only
//! drives the container and relays its output.

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, LogOutput, LogsOptions, RemoveContainerOptions,
    StartContainerOptions, WaitContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::models::HostConfig;
use conveyor_core::{
    BuildContext, BuildId, BuildOptions, Builder, Error, Image, LogSink, Result,
};
use futures::StreamExt;
use tracing::{debug, info, warn};

/// Image used to perform builds when none is configured.
pub const DEFAULT_BUILDER_IMAGE: &str = "remind101/conveyor-builder";

/// Docker socket mounted into the builder container.
pub const DEFAULT_DOCKER_SOCKET: &str = "/var/run/docker.sock";

/// Builds images by running the builder image against the local daemon.
pub struct DockerBuilder {
    docker: Docker,
    image: String,
    docker_socket: String,
}

impl DockerBuilder {
    /// Create a new DockerBuilder connecting to the local Docker daemon.
    pub fn new() -> Result<Self> {
        let docker =
            Docker::connect_with_local_defaults().map_err(|e| Error::Toolchain(e.to_string()))?;
        Ok(Self::with_client(docker))
    }

    /// Create with a custom Docker client.
    pub fn with_client(docker: Docker) -> Self {
        Self {
            docker,
            image: DEFAULT_BUILDER_IMAGE.to_string(),
            docker_socket: DEFAULT_DOCKER_SOCKET.to_string(),
        }
    }

    /// Use a different builder image.
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    /// Mount a different Docker socket into the builder container.
    pub fn with_docker_socket(mut self, socket: impl Into<String>) -> Self {
        self.docker_socket = socket.into();
        self
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    fn container_name(id: &BuildId) -> String {
        format!("conveyor-build-{}", id)
    }

    /// Environment passed to the builder image.
    fn env(options: &BuildOptions) -> Vec<String> {
        vec![
            format!("REPOSITORY={}", options.repository),
            format!("BRANCH={}", options.branch),
            format!("SHA={}", options.sha),
            format!("NO_CACHE={}", options.no_cache),
        ]
    }

    /// The image a successful build produces.
    fn image_for(options: &BuildOptions) -> Image {
        Image::new(format!("{}:{}", options.repository, options.sha))
    }

    async fn pull_image(&self) {
        info!(image = %self.image, "Pulling builder image");
        let create_image_options = CreateImageOptions {
            from_image: self.image.clone(),
            ..Default::default()
        };

        let mut pull_stream = self
            .docker
            .create_image(Some(create_image_options), None, None);
        while let Some(result) = pull_stream.next().await {
            match result {
                Ok(info) => {
                    if let Some(status) = info.status {
                        debug!(status = %status, "Pull progress");
                    }
                }
                Err(e) => {
                    // A locally cached image is still usable.
                    warn!(image = %self.image, error = %e, "Pull warning");
                }
            }
        }
    }

    /// Create and run the builder container to completion.
    async fn run(
        &self,
        container_name: &str,
        options: &BuildOptions,
        logs: &dyn LogSink,
    ) -> Result<Image> {
        self.pull_image().await;

        let host_config = HostConfig {
            binds: Some(vec![format!(
                "{}:{}",
                self.docker_socket, DEFAULT_DOCKER_SOCKET
            )]),
            ..Default::default()
        };

        let config = Config {
            image: Some(self.image.clone()),
            env: Some(Self::env(options)),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            tty: Some(false),
            host_config: Some(host_config),
            ..Default::default()
        };

        let create_options = CreateContainerOptions {
            name: container_name.to_string(),
            platform: None,
        };

        info!(container = %container_name, build_id = %options.id, "Creating container");
        self.docker
            .create_container(Some(create_options), config)
            .await
            .map_err(|e| Error::Toolchain(format!("Failed to create container: {}", e)))?;

        info!(container = %container_name, "Starting container");
        self.docker
            .start_container(container_name, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| Error::Toolchain(format!("Failed to start container: {}", e)))?;

        self.stream_logs(container_name, logs).await?;

        let exit_code = self.wait(container_name).await?;
        if exit_code == 0 {
            Ok(Self::image_for(options))
        } else {
            Err(Error::BuildFailed {
                exit_code: Some(exit_code),
                message: format!("builder container exited with status {}", exit_code),
            })
        }
    }

    /// Follow the container's output into the log sink until it exits.
    async fn stream_logs(&self, container_name: &str, logs: &dyn LogSink) -> Result<()> {
        let options = LogsOptions::<String> {
            follow: true,
            stdout: true,
            stderr: true,
            ..Default::default()
        };

        let mut stream = self.docker.logs(container_name, Some(options));
        while let Some(result) = stream.next().await {
            match result {
                Ok(output) => {
                    let message = match output {
                        LogOutput::StdOut { message }
                        | LogOutput::StdErr { message }
                        | LogOutput::Console { message }
                        | LogOutput::StdIn { message } => message,
                    };
                    logs.write(&message).await?;
                }
                Err(e) => {
                    warn!(container = %container_name, error = %e, "Log stream error");
                    break;
                }
            }
        }
        Ok(())
    }

    async fn wait(&self, container_name: &str) -> Result<i64> {
        let options = WaitContainerOptions {
            condition: "not-running",
        };

        let mut stream = self.docker.wait_container(container_name, Some(options));
        match stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // Non-zero exits surface as an error from the wait endpoint.
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(Error::Toolchain(format!(
                "Failed to wait for container: {}",
                e
            ))),
            None => Err(Error::Toolchain(
                "Container wait stream ended without a status".to_string(),
            )),
        }
    }

    async fn remove_container(&self, container_name: &str) {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };

        if let Err(e) = self
            .docker
            .remove_container(container_name, Some(options))
            .await
        {
            warn!(container = %container_name, error = %e, "Failed to remove container");
        }
    }
}

#[async_trait]
impl Builder for DockerBuilder {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn build(
        &self,
        ctx: &BuildContext,
        options: &BuildOptions,
        logs: &dyn LogSink,
    ) -> Result<Image> {
        if let Some(err) = ctx.err() {
            return Err(err);
        }

        let container_name = Self::container_name(&options.id);

        let result = tokio::select! {
            result = self.run(&container_name, options, logs) => result,
            err = ctx.done() => {
                warn!(container = %container_name, build_id = %options.id, error = %err, "Aborting build");
                Err(err)
            }
        };

        self.remove_container(&container_name).await;
        result
    }
}


/// Integration tests that require Docker to be running.
/// Run with: cargo test -- --ignored
#[cfg(test)]
mod integration_tests {
    use super::*;
    use conveyor_logs::memory::MemorySink;
    use std::time::Duration;

    /// Test that we can create a builder when Docker is available.
    #[tokio::test]
    #[ignore]
    async fn test_builder_creation() {
        let builder = DockerBuilder::new();
        assert!(builder.is_ok(), "Should connect to Docker daemon");
        assert_eq!(builder.unwrap().name(), "docker");
    }

    /// A builder image that exits cleanly produces the repository image.
    #[tokio::test]
    #[ignore]
    async fn test_successful_build() {
        // alpine's default shell exits 0 immediately without stdin.
        let builder = DockerBuilder::new().unwrap().with_image("alpine:latest");
        let options = BuildOptions::new(BuildId::new(), "remind101/acme-inc", "master", "abcd");
        let logs = MemorySink::detached();

        let image = builder
            .build(&BuildContext::new(), &options, &logs)
            .await
            .expect("Should build");
        assert_eq!(image.as_str(), "remind101/acme-inc:abcd");
    }

    /// A cancelled context aborts the build promptly.
    #[tokio::test]
    #[ignore]
    async fn test_cancelled_build() {
        let builder = DockerBuilder::new().unwrap();
        let options = BuildOptions::new(BuildId::new(), "remind101/acme-inc", "master", "abcd");
        let logs = MemorySink::detached();
        let ctx = BuildContext::with_timeout(Duration::from_millis(10));

        let err = builder.build(&ctx, &options, &logs).await.unwrap_err();
        assert!(matches!(err, Error::Timeout(_) | Error::Cancelled));
    }
}
