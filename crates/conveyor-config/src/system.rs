//! System configuration parsing.

use crate::{ConfigError, ConfigResult};
use kdl::{KdlDocument, KdlNode};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_LISTEN: &str = "0.0.0.0:8080";
pub const DEFAULT_PATH: &str = "/";
pub const DEFAULT_BUILDER_IMAGE: &str = "remind101/conveyor-builder";
pub const DEFAULT_DOCKER_SOCKET: &str = "/var/run/docker.sock";
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;
pub const DEFAULT_LOGGER: &str = "stdout://";
pub const DEFAULT_REPORTER: &str = "log://";

/// Paths served by the health router.
const RESERVED_PATHS: [&str; 2] = ["/health", "/health/ready"];

/// System-wide configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub github: GitHubConfig,
    pub builder: BuilderConfig,
    /// Worker count. `None` runs one worker per available CPU.
    pub workers: Option<usize>,
    pub queue: QueueConfig,
    /// Log sink URI(s), comma separated.
    pub logger: String,
    /// Error reporter URI.
    pub reporter: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub listen: String,
    /// Path the webhook is served on.
    pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// API token used to post commit statuses.
    pub token: Option<String>,
    /// GitHub Enterprise host.
    pub domain: Option<String>,
    /// Webhook secret.
    pub secret: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuilderConfig {
    pub image: String,
    pub dry: bool,
    pub docker_socket: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    pub capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            github: GitHubConfig::default(),
            builder: BuilderConfig::default(),
            workers: None,
            queue: QueueConfig::default(),
            logger: DEFAULT_LOGGER.to_string(),
            reporter: DEFAULT_REPORTER.to_string(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_string(),
            path: DEFAULT_PATH.to_string(),
        }
    }
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            image: DEFAULT_BUILDER_IMAGE.to_string(),
            dry: false,
            docker_socket: DEFAULT_DOCKER_SOCKET.to_string(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl Config {
    /// Check values that parse but cannot run.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.workers == Some(0) {
            return Err(ConfigError::invalid("workers", "must be at least 1"));
        }
        if self.queue.capacity == 0 {
            return Err(ConfigError::invalid("queue.capacity", "must be at least 1"));
        }
        if self.server.listen.is_empty() {
            return Err(ConfigError::MissingField("server.listen".to_string()));
        }
        if !self.server.path.starts_with('/') {
            return Err(ConfigError::invalid("server.path", "must start with '/'"));
        }
        if RESERVED_PATHS.contains(&self.server.path.as_str()) {
            return Err(ConfigError::invalid(
                "server.path",
                format!("{} is reserved for health checks", self.server.path),
            ));
        }
        if self.builder.image.is_empty() {
            return Err(ConfigError::MissingField("builder.image".to_string()));
        }
        Ok(())
    }
}

/// Read and parse a configuration file.
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<Config> {
    let text = std::fs::read_to_string(path)?;
    parse_config(&text)
}

/// Parse configuration from KDL text, starting from the defaults.
pub fn parse_config(kdl: &str) -> ConfigResult<Config> {
    let doc: KdlDocument = kdl.parse()?;
    let mut config = Config::default();

    for node in doc.nodes() {
        match node.name().value() {
            "server" => {
                for child in children(node) {
                    match child.name().value() {
                        "listen" => config.server.listen = string_arg(child, "server.listen")?,
                        "path" => config.server.path = string_arg(child, "server.path")?,
                        _ => {}
                    }
                }
            }
            "github" => {
                for child in children(node) {
                    match child.name().value() {
                        "token" => config.github.token = optional(string_arg(child, "github.token")?),
                        "domain" => {
                            config.github.domain = optional(string_arg(child, "github.domain")?)
                        }
                        "secret" => {
                            config.github.secret = optional(string_arg(child, "github.secret")?)
                        }
                        _ => {}
                    }
                }
            }
            "builder" => {
                for child in children(node) {
                    match child.name().value() {
                        "image" => config.builder.image = string_arg(child, "builder.image")?,
                        "dry" => config.builder.dry = bool_arg(child, "builder.dry")?,
                        "docker-socket" => {
                            config.builder.docker_socket =
                                string_arg(child, "builder.docker-socket")?
                        }
                        _ => {}
                    }
                }
            }
            "workers" => config.workers = Some(usize_arg(node, "workers")?),
            "queue" => {
                for child in children(node) {
                    if child.name().value() == "capacity" {
                        config.queue.capacity = usize_arg(child, "queue.capacity")?;
                    }
                }
            }
            "logger" => config.logger = string_arg(node, "logger")?,
            "reporter" => config.reporter = string_arg(node, "reporter")?,
            _ => {} // Ignore unknown nodes
        }
    }

    config.validate()?;
    Ok(config)
}

fn children(node: &KdlNode) -> impl Iterator<Item = &KdlNode> {
    node.children()
        .map(|doc| doc.nodes())
        .unwrap_or_default()
        .iter()
}

fn optional(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}

fn first_arg<'a>(node: &'a KdlNode, field: &str) -> ConfigResult<&'a kdl::KdlValue> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .map(|e| e.value())
        .ok_or_else(|| ConfigError::MissingField(field.to_string()))
}

fn string_arg(node: &KdlNode, field: &str) -> ConfigResult<String> {
    first_arg(node, field)?
        .as_string()
        .map(|s| s.to_string())
        .ok_or_else(|| ConfigError::invalid(field, "expected a string"))
}

fn bool_arg(node: &KdlNode, field: &str) -> ConfigResult<bool> {
    first_arg(node, field)?
        .as_bool()
        .ok_or_else(|| ConfigError::invalid(field, "expected #true or #false"))
}

fn usize_arg(node: &KdlNode, field: &str) -> ConfigResult<usize> {
    let value = first_arg(node, field)?
        .as_integer()
        .ok_or_else(|| ConfigError::invalid(field, "expected an integer"))?;
    usize::try_from(value).map_err(|_| ConfigError::invalid(field, "must not be negative"))
}
