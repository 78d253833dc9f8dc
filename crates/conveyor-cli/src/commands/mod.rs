//! CLI command implementations.

pub mod server;

use anyhow::{Context, Result};

/// Parse and validate a configuration file.
pub fn validate(path: &str) -> Result<()> {
    let config = conveyor_config::load_config(path)
        .with_context(|| format!("Configuration error in {}", path))?;

    conveyor_logs::log_factory(&config.logger)
        .with_context(|| format!("Invalid logger in {}", path))?;
    server::reporter(&config.reporter)
        .with_context(|| format!("Invalid reporter in {}", path))?;

    println!("Configuration is valid");
    Ok(())
}
