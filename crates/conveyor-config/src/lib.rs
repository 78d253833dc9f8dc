//! KDL configuration parsing for Conveyor.
//!
//! Settings are layered: built-in defaults, then an optional KDL file,
//! then command line flags applied by the binary.

pub mod error;
pub mod system;

pub use error::{ConfigError, ConfigResult};
pub use system::{
    BuilderConfig, Config, GitHubConfig, QueueConfig, ServerConfig, load_config, parse_config,
};
