//! Error reporting collaborators.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::error;

use crate::{BuildOptions, Error};

/// Contextual fields attached to a reported error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportContext {
    fields: BTreeMap<String, String>,
}

impl ReportContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.fields.insert(key.into(), value.to_string());
        self
    }

    /// Context describing a build.
    pub fn for_build(options: &BuildOptions) -> Self {
        Self::new()
            .with("build_id", options.id)
            .with("repository", &options.repository)
            .with("branch", &options.branch)
            .with("sha", &options.sha)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Receives errors that would otherwise be lost inside background work.
///
/// Reporting is fire-and-forget: implementations must not block or fail.
pub trait Reporter: Send + Sync {
    fn report(&self, err: &Error, ctx: &ReportContext);
}

/// Reporter that emits errors as tracing events.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn report(&self, err: &Error, ctx: &ReportContext) {
        let fields = ctx
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(" ");
        error!(error = %err, outcome = %err.outcome(), context = %fields, "Reported error");
    }
}

/// Reporter that fans out to several reporters.
#[derive(Clone, Default)]
pub struct MultiReporter {
    reporters: Vec<Arc<dyn Reporter>>,
}

impl MultiReporter {
    pub fn new(reporters: Vec<Arc<dyn Reporter>>) -> Self {
        Self { reporters }
    }

    pub fn push(&mut self, reporter: Arc<dyn Reporter>) {
        self.reporters.push(reporter);
    }

    pub fn is_empty(&self) -> bool {
        self.reporters.is_empty()
    }
}

impl Reporter for MultiReporter {
    fn report(&self, err: &Error, ctx: &ReportContext) {
        for reporter in &self.reporters {
            reporter.report(err, ctx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BuildId;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(String, ReportContext)>>,
    }

    impl Reporter for Recorder {
        fn report(&self, err: &Error, ctx: &ReportContext) {
            self.seen.lock().unwrap().push((err.to_string(), ctx.clone()));
        }
    }

    #[test]
    fn test_build_context_fields() {
        let options = BuildOptions::new(BuildId::new(), "remind101/acme-inc", "master", "abcd");
        let ctx = ReportContext::for_build(&options);

        assert_eq!(ctx.get("repository"), Some("remind101/acme-inc"));
        assert_eq!(ctx.get("sha"), Some("abcd"));
        assert_eq!(ctx.get("build_id"), Some(options.id.to_string().as_str()));
    }

    #[test]
    fn test_multi_reporter_fans_out() {
        let a = Arc::new(Recorder::default());
        let b = Arc::new(Recorder::default());
        let multi = MultiReporter::new(vec![a.clone(), b.clone()]);

        multi.report(&Error::Cancelled, &ReportContext::new().with("worker", 3));

        for recorder in [a, b] {
            let seen = recorder.seen.lock().unwrap();
            assert_eq!(seen.len(), 1);
            assert_eq!(seen[0].0, "cancelled");
            assert_eq!(seen[0].1.get("worker"), Some("3"));
        }
    }
}
