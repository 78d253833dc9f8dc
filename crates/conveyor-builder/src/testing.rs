//! Test doubles shared by the decorator tests.

use async_trait::async_trait;
use conveyor_core::{
    BuildContext, BuildOptions, Builder, CommitStatus, Error, Image, LogSink, Result,
    StatusClient,
};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone, Copy)]
pub enum Outcome {
    Succeed,
    Fail,
    Error,
    Panic,
}

/// Builder that counts invocations and returns a fixed outcome.
pub struct CountingBuilder {
    outcome: Outcome,
    calls: AtomicUsize,
}

impl CountingBuilder {
    pub fn new(outcome: Outcome) -> Self {
        Self {
            outcome,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Builder for CountingBuilder {
    fn name(&self) -> &'static str {
        "counting"
    }

    async fn build(
        &self,
        _ctx: &BuildContext,
        options: &BuildOptions,
        logs: &dyn LogSink,
    ) -> Result<Image> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        logs.write(b"building\n").await?;
        match self.outcome {
            Outcome::Succeed => Ok(Image::new(format!("{}:{}", options.repository, options.sha))),
            Outcome::Fail => Err(Error::BuildFailed {
                exit_code: Some(1),
                message: "docker build failed".to_string(),
            }),
            Outcome::Error => Err(Error::Toolchain("cannot reach docker daemon".to_string())),
            Outcome::Panic => panic!("builder exploded"),
        }
    }
}

type StatusCall = (String, String, CommitStatus);

/// Status client that records every call.
pub struct RecordingStatusClient {
    calls: Mutex<Vec<StatusCall>>,
    fail: bool,
}

impl RecordingStatusClient {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    /// A client whose every call fails after being recorded.
    pub fn failing() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn calls(&self) -> Vec<StatusCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl StatusClient for RecordingStatusClient {
    async fn set_status(&self, repository: &str, sha: &str, status: &CommitStatus) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push((repository.to_string(), sha.to_string(), status.clone()));
        if self.fail {
            Err(Error::Status("github unreachable".to_string()))
        } else {
            Ok(())
        }
    }
}
