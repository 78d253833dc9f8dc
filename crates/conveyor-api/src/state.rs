//! Application state.

use conveyor_core::{BuildId, BuildQueue};
use std::sync::Arc;
use std::time::Duration;

/// Produces the identifier for each accepted build.
pub type IdGenerator = Arc<dyn Fn() -> BuildId + Send + Sync>;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Queue accepted builds are pushed to. Only push events need one.
    pub queue: Option<Arc<dyn BuildQueue>>,
    /// Shared secret used to verify `X-Hub-Signature-256`.
    pub secret: Option<String>,
    /// Deadline applied to every build, counted from ingestion.
    pub timeout: Option<Duration>,
    pub new_id: IdGenerator,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            queue: None,
            secret: None,
            timeout: None,
            new_id: Arc::new(BuildId::new),
        }
    }

    pub fn with_queue(mut self, queue: Arc<dyn BuildQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Require signed requests. An empty secret disables verification.
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        let secret = secret.into();
        self.secret = (!secret.is_empty()).then_some(secret);
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_id_generator(mut self, new_id: impl Fn() -> BuildId + Send + Sync + 'static) -> Self {
        self.new_id = Arc::new(new_id);
        self
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
