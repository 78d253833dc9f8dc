//! Build log sinks for Conveyor.
//!
//! Provides log factory implementations selected by URI:
//! - `stdout://` writes every line to stdout, prefixed with the build id
//! - `file:///path/to/dir` appends to `<dir>/<build id>.log`
//! - `memory://` keeps output of the most recent builds in memory
//!   (`memory://?builds=N`, default 100)
//!
//! Several URIs separated by commas fan out to every sink.

pub mod fs;
pub mod memory;
pub mod multi;
pub mod stdout;

pub use fs::FileLogger;
pub use memory::MemoryLogger;
pub use multi::MultiLogger;
pub use stdout::StdoutLogger;

use conveyor_core::{Error, LogFactory, Result};
use std::sync::Arc;
use url::Url;

/// Build a log factory from a logger URI.
///
/// An empty URI selects stdout.
pub fn log_factory(uri: &str) -> Result<Arc<dyn LogFactory>> {
    let uris: Vec<&str> = uri
        .split(',')
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .collect();

    match uris.as_slice() {
        [] => Ok(Arc::new(StdoutLogger::new())),
        [single] => single_factory(single),
        many => {
            let factories = many
                .iter()
                .map(|u| single_factory(u))
                .collect::<Result<Vec<_>>>()?;
            Ok(Arc::new(MultiLogger::new(factories)))
        }
    }
}

fn single_factory(uri: &str) -> Result<Arc<dyn LogFactory>> {
    let url = Url::parse(uri)
        .map_err(|e| Error::InvalidInput(format!("invalid logger uri {:?}: {}", uri, e)))?;

    match url.scheme() {
        "stdout" => Ok(Arc::new(StdoutLogger::new())),
        "memory" => {
            let capacity = match url.query_pairs().find(|(k, _)| k == "builds") {
                Some((_, v)) => v.parse().map_err(|_| {
                    Error::InvalidInput(format!("invalid retained build count: {}", v))
                })?,
                None => memory::DEFAULT_RETAINED_BUILDS,
            };
            Ok(Arc::new(MemoryLogger::with_capacity(capacity)))
        }
        "file" => {
            let dir = url
                .to_file_path()
                .map_err(|_| Error::InvalidInput(format!("invalid log directory: {}", uri)))?;
            Ok(Arc::new(FileLogger::new(dir)))
        }
        other => Err(Error::InvalidInput(format!(
            "unsupported logger scheme: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_uri_defaults_to_stdout() {
        assert!(log_factory("").is_ok());
    }

    #[test]
    fn test_known_schemes() {
        assert!(log_factory("stdout://").is_ok());
        assert!(log_factory("memory://").is_ok());
        assert!(log_factory("file:///var/log/conveyor").is_ok());
        assert!(log_factory("stdout://, file:///var/log/conveyor").is_ok());
    }

    #[test]
    fn test_memory_retention() {
        assert!(log_factory("memory://?builds=10").is_ok());
        let err = log_factory("memory://?builds=lots").err().unwrap();
        assert!(matches!(err, Error::InvalidInput(msg) if msg.contains("lots")));
    }

    #[test]
    fn test_unsupported_scheme() {
        let err = log_factory("s3://conveyor-logs").err().unwrap();
        assert!(matches!(err, Error::InvalidInput(msg) if msg.contains("s3")));
    }

    #[test]
    fn test_one_bad_uri_fails_the_list() {
        assert!(log_factory("stdout://,s3://conveyor-logs").is_err());
    }
}
