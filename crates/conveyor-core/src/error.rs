//! Error types for Conveyor.

use std::any::Any;

use thiserror::Error;

use crate::build::BuildOutcome;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("queue error: {0}")]
    Queue(String),

    #[error("queue is closed")]
    QueueClosed,

    #[error("queue already has a subscriber")]
    AlreadySubscribed,

    /// The build toolchain could not be reached or driven.
    #[error("toolchain error: {0}")]
    Toolchain(String),

    /// The toolchain ran and reported an unsuccessful build.
    #[error("build failed (exit code {exit_code:?}): {message}")]
    BuildFailed {
        exit_code: Option<i64>,
        message: String,
    },

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("cancelled")]
    Cancelled,

    #[error("log sink error: {0}")]
    LogSink(String),

    #[error("commit status error: {0}")]
    Status(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Classify a build error into the outcome it represents.
    ///
    /// Toolchain failures, cancellations and timeouts are build failures;
    /// everything else is an infrastructure error.
    pub fn outcome(&self) -> BuildOutcome {
        match self {
            Error::BuildFailed { .. } | Error::Cancelled | Error::Timeout(_) => BuildOutcome::Failed,
            _ => BuildOutcome::Errored,
        }
    }

    /// Convert a caught panic payload into an infrastructure error.
    pub fn from_panic(payload: &(dyn Any + Send), what: &str) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic".to_string()
        };
        Error::Internal(format!("{} panicked: {}", what, message))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_failures_are_failed_outcomes() {
        let err = Error::BuildFailed {
            exit_code: Some(1),
            message: "step 3 failed".to_string(),
        };
        assert_eq!(err.outcome(), BuildOutcome::Failed);
        assert_eq!(Error::Cancelled.outcome(), BuildOutcome::Failed);
        assert_eq!(
            Error::Timeout("deadline exceeded".to_string()).outcome(),
            BuildOutcome::Failed
        );
    }

    #[test]
    fn test_infrastructure_errors_are_errored_outcomes() {
        assert_eq!(
            Error::Toolchain("connection refused".to_string()).outcome(),
            BuildOutcome::Errored
        );
        assert_eq!(
            Error::LogSink("disk full".to_string()).outcome(),
            BuildOutcome::Errored
        );
    }

    #[test]
    fn test_from_panic_payloads() {
        let err = Error::from_panic(&"boom", "build");
        assert_eq!(err.to_string(), "internal error: build panicked: boom");

        let err = Error::from_panic(&String::from("index out of range"), "log sink");
        assert_eq!(
            err.to_string(),
            "internal error: log sink panicked: index out of range"
        );

        let err = Error::from_panic(&42u32, "build");
        assert_eq!(err.to_string(), "internal error: build panicked: unknown panic");
        assert_eq!(err.outcome(), BuildOutcome::Errored);
    }

    #[test]
    fn test_build_failed_display() {
        let err = Error::BuildFailed {
            exit_code: Some(2),
            message: "docker build exited".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "build failed (exit code Some(2)): docker build exited"
        );
    }
}
